//! The consumer-side event loop.
//!
//! A [`Session`] owns everything downstream of the transport: the consumer and
//! its series, the display window, both analysis pipelines and the logger.
//! All of it runs on one task. Work is split into short steps queued on a
//! [`Scheduler`]:
//!
//! - `Ingest` polls the subscriber once, appends the batch to the series and
//!   to every enabled pipeline buffer, rewrites the log, then requeues itself
//!   after `0.95 × time_between_reads` (immediately after a poll timeout).
//! - `Allan { generation }` and `Psd { generation }` compute over a snapshot of
//!   their buffer and requeue themselves after the update interval, as long as
//!   their generation is still current.
//!
//! Steps never overlap, so buffers are never read while being appended to.
//!
//! The session is driven through [`SessionCommand`]s on an `mpsc` channel and
//! reports through [`SessionEvent`]s on a `broadcast` channel:
//!
//! ```text
//!  SessionCommand ──mpsc──▶ Session::run ──broadcast──▶ SessionEvent
//!                               │
//!                      Scheduler<SessionTask>
//!                 Ingest │ Allan{gen} │ Psd{gen}
//! ```

use chrono::Local;
use std::fmt;
use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::config::CounterConfig;
use crate::consumer::{Consumer, IngestOutcome};
use crate::error::{AppResult, DaqError, ErrorClass};
use crate::measurement::{MeasurementMode, Series};
use crate::pipeline::{AllanPipeline, AllanResult, PsdPipeline, PsdResult};
use crate::scheduler::Scheduler;
use crate::storage::SeriesLogger;
use crate::transport::FrameSubscriber;
use crate::window::{TimeSeriesWindow, WindowView};

/// Ingestion runs slightly faster than the producer to keep lag low.
pub const INGEST_CADENCE_FACTOR: f64 = 0.95;

/// Capacity of the event channel.
pub const EVENT_CAPACITY: usize = 256;

/// A unit of work on the session scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTask {
    /// Poll the transport and ingest one frame.
    Ingest,
    /// One Allan cycle armed under `generation`.
    Allan {
        /// Pipeline generation at arming time.
        generation: u64,
    },
    /// One PSD cycle armed under `generation`.
    Psd {
        /// Pipeline generation at arming time.
        generation: u64,
    },
}

/// Control requests accepted by [`Session::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Clear the Allan buffer and start its cycles.
    EnableAllan,
    /// Stop Allan collection; the last result stays.
    DisableAllan,
    /// Clear the PSD buffer and start its cycles.
    EnablePsd,
    /// Stop PSD collection; the last result stays.
    DisablePsd,
    /// Open a new log at the current series length.
    EnableLogging,
    /// Close the current log.
    DisableLogging,
    /// Toggle linear detrending before analysis.
    SetDetrend(bool),
    /// Change the Allan reference frequency.
    SetF0(f64),
    /// Change the Welch segment length.
    SetPsdAveraging(usize),
    /// Leave the run loop.
    Shutdown,
}

/// Which analysis pipeline an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    /// Allan deviation.
    Allan,
    /// Power spectral density.
    Psd,
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineKind::Allan => f.write_str("allan"),
            PipelineKind::Psd => f.write_str("psd"),
        }
    }
}

/// Everything the session reports to observers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A batch was appended to the series.
    SeriesExtended {
        /// Samples appended.
        appended: usize,
        /// Series length after the append.
        total: usize,
        /// Newest `(t, f)` sample.
        latest: Option<(f64, f64)>,
        /// Mean frequency over the display window.
        window_mean: Option<f64>,
    },
    /// Fresh Allan curve.
    AllanUpdated(AllanResult),
    /// Fresh PSD.
    PsdUpdated(PsdResult),
    /// A cycle produced no result.
    AnalysisSkipped {
        /// Pipeline that skipped.
        pipeline: PipelineKind,
        /// Why.
        reason: String,
    },
    /// A log file was opened.
    LoggingStarted {
        /// Time-series file.
        path: PathBuf,
    },
    /// The log was closed.
    LoggingStopped {
        /// File left on disk, if logging was on.
        path: Option<PathBuf>,
    },
    /// Lifecycle message.
    Status(String),
    /// A recovered fault.
    Error(String),
}

/// Session parameters, usually taken from [`CounterConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Measurement mode recorded in log file names.
    pub mode: MeasurementMode,
    /// Sample spacing in seconds.
    pub gate_time: f64,
    /// Delay between successful ingestion steps.
    pub ingest_interval: Duration,
    /// Delay between analysis cycles.
    pub update_interval: Duration,
    /// Detrend before analysis.
    pub detrend: bool,
    /// Allan reference frequency.
    pub f0: f64,
    /// Welch segment length.
    pub psd_averaging: usize,
    /// Display window length.
    pub record_length: usize,
}

impl SessionSettings {
    /// Settings for the instrument and analysis sections of `config`.
    pub fn from_config(config: &CounterConfig) -> Self {
        Self {
            mode: config.instrument.mode,
            gate_time: config.instrument.gate_time,
            ingest_interval: config.instrument.read_interval().mul_f64(INGEST_CADENCE_FACTOR),
            update_interval: config.analysis.update_interval(),
            detrend: config.analysis.detrend,
            f0: config.analysis.f0,
            psd_averaging: config.analysis.psd_averaging,
            record_length: config.analysis.time_series_record_length,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&CounterConfig::default())
    }
}

/// The single cooperative event loop of the consumer side.
pub struct Session<S> {
    consumer: Consumer<S>,
    window: TimeSeriesWindow,
    allan: AllanPipeline,
    psd: PsdPipeline,
    logger: SeriesLogger,
    scheduler: Scheduler<SessionTask>,
    events: broadcast::Sender<SessionEvent>,
    settings: SessionSettings,
}

impl<S: FrameSubscriber> Session<S> {
    /// New session; nothing is scheduled until [`Session::start`].
    ///
    /// The consumer reconstructs timestamps with `settings.gate_time`, the
    /// same spacing the analysis pipelines use.
    pub fn new(
        mut consumer: Consumer<S>,
        logger: SeriesLogger,
        settings: SessionSettings,
    ) -> Self {
        if consumer.gate_time() != settings.gate_time {
            debug!(
                consumer = consumer.gate_time(),
                session = settings.gate_time,
                "consumer gate time overridden"
            );
            consumer.set_gate_time(settings.gate_time);
        }
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            window: TimeSeriesWindow::new(settings.record_length),
            allan: AllanPipeline::new(settings.f0),
            psd: PsdPipeline::new(settings.psd_averaging),
            consumer,
            logger,
            scheduler: Scheduler::new(),
            events,
            settings,
        }
    }

    /// Receive future events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Queue the first ingestion step.
    pub fn start(&mut self) {
        self.scheduler.schedule_at(Instant::now(), SessionTask::Ingest);
        info!(endpoint = %self.consumer.endpoint(), "session started");
    }

    /// Process commands and scheduled work until `Shutdown` arrives or every
    /// command sender is dropped.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<SessionCommand>) -> AppResult<()> {
        self.start();
        loop {
            let next_due = self.scheduler.next_due();
            tokio::select! {
                biased;
                command = commands.recv() => {
                    let Some(command) = command else {
                        debug!("command channel closed");
                        break;
                    };
                    match self.handle_command(command) {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => {
                            warn!(error = %e, "command rejected");
                            self.emit(SessionEvent::Error(e.to_string()));
                        }
                    }
                }
                _ = wait_until(next_due) => {
                    self.run_due().await;
                }
            }
        }
        self.shutdown();
        Ok(())
    }

    /// Run the tasks that are due at the time of the call. Returns how many
    /// ran.
    ///
    /// Tasks requeued while these run wait for the next wake-up, even with a
    /// zero delay, so commands are looked at between two polls.
    pub async fn run_due(&mut self) -> usize {
        let now = Instant::now();
        let mut due = Vec::new();
        while let Some(task) = self.scheduler.pop_due(now) {
            due.push(task);
        }
        for task in &due {
            self.run_task(*task).await;
        }
        due.len()
    }

    /// Apply one command. `Ok(false)` asks the loop to stop.
    ///
    /// A rejected value leaves the session unchanged.
    pub fn handle_command(&mut self, command: SessionCommand) -> AppResult<bool> {
        let now = Instant::now();
        match command {
            SessionCommand::EnableAllan => {
                let generation = self.allan.enable();
                self.scheduler.schedule_after(
                    now,
                    self.settings.update_interval,
                    SessionTask::Allan { generation },
                );
                info!(generation, "Allan pipeline enabled");
                self.emit(SessionEvent::Status("allan enabled".to_string()));
            }
            SessionCommand::DisableAllan => {
                self.allan.disable();
                info!("Allan pipeline disabled");
                self.emit(SessionEvent::Status("allan disabled".to_string()));
            }
            SessionCommand::EnablePsd => {
                let generation = self.psd.enable();
                self.scheduler.schedule_after(
                    now,
                    self.settings.update_interval,
                    SessionTask::Psd { generation },
                );
                info!(generation, "PSD pipeline enabled");
                self.emit(SessionEvent::Status("psd enabled".to_string()));
            }
            SessionCommand::DisablePsd => {
                self.psd.disable();
                info!("PSD pipeline disabled");
                self.emit(SessionEvent::Status("psd disabled".to_string()));
            }
            SessionCommand::EnableLogging => {
                let path = self
                    .logger
                    .enable(
                        self.consumer.series().len(),
                        self.settings.mode,
                        self.settings.gate_time,
                        &Local::now(),
                    )?
                    .to_path_buf();
                self.emit(SessionEvent::LoggingStarted { path });
            }
            SessionCommand::DisableLogging => {
                let path = self.logger.disable();
                self.emit(SessionEvent::LoggingStopped { path });
            }
            SessionCommand::SetDetrend(enabled) => {
                self.settings.detrend = enabled;
                debug!(enabled, "detrend toggled");
            }
            SessionCommand::SetF0(f0) => {
                if self.allan.set_f0(f0)? {
                    self.compute_allan();
                }
                info!(f0, "reference frequency changed");
            }
            SessionCommand::SetPsdAveraging(n) => {
                self.psd.set_averaging(n)?;
                info!(averaging = n, "PSD averaging changed");
            }
            SessionCommand::Shutdown => return Ok(false),
        }
        Ok(true)
    }

    /// Execute one scheduled task and requeue its successor.
    pub async fn run_task(&mut self, task: SessionTask) {
        match task {
            SessionTask::Ingest => {
                let delay = self.ingest().await;
                self.scheduler
                    .schedule_after(Instant::now(), delay, SessionTask::Ingest);
            }
            SessionTask::Allan { generation } => {
                if !self.allan.buffer().is_current(generation) {
                    debug!(generation, "stale allan cycle dropped");
                    return;
                }
                self.compute_allan();
                self.scheduler.schedule_after(
                    Instant::now(),
                    self.settings.update_interval,
                    SessionTask::Allan { generation },
                );
            }
            SessionTask::Psd { generation } => {
                if !self.psd.buffer().is_current(generation) {
                    debug!(generation, "stale psd cycle dropped");
                    return;
                }
                self.compute_psd();
                self.scheduler.schedule_after(
                    Instant::now(),
                    self.settings.update_interval,
                    SessionTask::Psd { generation },
                );
            }
        }
    }

    /// One poll-and-ingest step. Returns the delay until the next one.
    async fn ingest(&mut self) -> Duration {
        match self.consumer.poll().await {
            Ok(IngestOutcome::Timeout) => Duration::ZERO,
            Ok(IngestOutcome::NoData) => self.settings.ingest_interval,
            Ok(IngestOutcome::Appended(range)) => {
                self.fan_out(range);
                self.settings.ingest_interval
            }
            Err(e) => {
                match e.class() {
                    ErrorClass::Setup => error!(error = %e, "transport failed, retrying"),
                    _ => warn!(error = %e, "ingestion step failed"),
                }
                self.emit(SessionEvent::Error(e.to_string()));
                self.settings.ingest_interval
            }
        }
    }

    /// Hand a freshly appended batch to every enabled consumer of it.
    fn fan_out(&mut self, range: Range<usize>) {
        let series = self.consumer.series();
        let batch = &series.frequencies()[range.clone()];
        self.allan.append(batch);
        self.psd.append(batch);

        if let Err(e) = self.logger.write(series) {
            warn!(error = %e, "log write failed");
            let _ = self.events.send(SessionEvent::Error(e.to_string()));
        }

        let view = self.window.view(series);
        let event = SessionEvent::SeriesExtended {
            appended: range.len(),
            total: series.len(),
            latest: view.latest(),
            window_mean: view.mean(),
        };
        self.emit(event);
    }

    fn compute_allan(&mut self) {
        match self
            .allan
            .compute(self.settings.detrend, self.settings.gate_time)
        {
            Ok(Some(result)) => {
                if let Err(e) = self.logger.write_allan(&result.points) {
                    warn!(error = %e, "allan log write failed");
                    self.emit(SessionEvent::Error(e.to_string()));
                }
                if let Some(trend) = result.trend_per_second {
                    debug!(trend_hz_per_s = trend, "allan trend");
                }
                self.emit(SessionEvent::AllanUpdated(result));
            }
            Ok(None) => self.skip(PipelineKind::Allan, "not enough samples".to_string()),
            Err(e) => self.analysis_failed(PipelineKind::Allan, e),
        }
    }

    fn compute_psd(&mut self) {
        match self
            .psd
            .compute(self.settings.detrend, self.settings.gate_time)
        {
            Ok(Some(result)) => self.emit(SessionEvent::PsdUpdated(result)),
            Ok(None) => self.skip(PipelineKind::Psd, "not enough samples".to_string()),
            Err(e) => self.analysis_failed(PipelineKind::Psd, e),
        }
    }

    /// Degenerate input only withholds this cycle's result. Anything else is
    /// reported as a fault as well.
    fn analysis_failed(&self, pipeline: PipelineKind, e: DaqError) {
        if e.class() != ErrorClass::NumericDegeneracy {
            warn!(%pipeline, error = %e, "analysis cycle failed");
            self.emit(SessionEvent::Error(e.to_string()));
        }
        self.skip(pipeline, e.to_string());
    }

    fn skip(&self, pipeline: PipelineKind, reason: String) {
        debug!(%pipeline, %reason, "analysis skipped");
        self.emit(SessionEvent::AnalysisSkipped { pipeline, reason });
    }

    /// Stop scheduling and close the log.
    pub fn shutdown(&mut self) {
        self.scheduler.clear();
        if let Some(path) = self.logger.disable() {
            self.emit(SessionEvent::LoggingStopped { path: Some(path) });
        }
        info!(
            samples = self.consumer.series().len(),
            frames = self.consumer.frames_ingested(),
            "session stopped"
        );
        self.emit(SessionEvent::Status("session stopped".to_string()));
    }

    fn emit(&self, event: SessionEvent) {
        // No receiver is fine.
        let _ = self.events.send(event);
    }

    /// The accumulated series.
    pub fn series(&self) -> &Series {
        self.consumer.series()
    }

    /// Tail of the series shown by the display window.
    pub fn window_view(&self) -> WindowView<'_> {
        self.window.view(self.consumer.series())
    }

    /// The Allan pipeline.
    pub fn allan(&self) -> &AllanPipeline {
        &self.allan
    }

    /// The PSD pipeline.
    pub fn psd(&self) -> &PsdPipeline {
        &self.psd
    }

    /// The logger.
    pub fn logger(&self) -> &SeriesLogger {
        &self.logger
    }

    /// Current settings, including runtime changes.
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Tasks waiting on the scheduler.
    pub fn pending_tasks(&self) -> usize {
        self.scheduler.len()
    }

    /// When the next task is due.
    pub fn next_due(&self) -> Option<Instant> {
        self.scheduler.next_due()
    }
}

async fn wait_until(due: Option<Instant>) {
    match due {
        Some(due) => sleep_until(due).await,
        None => std::future::pending().await,
    }
}

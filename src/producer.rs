//! Acquisition loop.
//!
//! The producer owns one [`BatchSource`] and one [`FramePublisher`] and runs on
//! its own task:
//!
//! ```text
//! Disconnected --connect()--> Connected --spawn()--> Streaming --stop()--> Stopped
//! ```
//!
//! Each cycle acquires a batch, encodes it and publishes it, then idles for the
//! configured time between reads. The first cycle arms the source first. Stop
//! requests are honoured at the top of a cycle and during the idle wait; an
//! instrument call or publish already in flight always completes.
//!
//! Per-cycle failures never end the loop. An empty read, a failed query or a
//! failed publish only costs that cycle and shows up in [`ProducerStats`].

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{AppResult, DaqError};
use crate::instrument::BatchSource;
use crate::transport::frame::encode_values;
use crate::transport::FramePublisher;

/// Lifecycle of the acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    /// Source not configured yet.
    Disconnected,
    /// Source configured, loop not started.
    Connected,
    /// Loop running.
    Streaming,
    /// Loop exited after a stop request.
    Stopped,
}

/// What one acquisition cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A frame with this many samples went out.
    Published(usize),
    /// The source had nothing this cycle.
    NoData,
    /// The read or the publish failed; the next cycle tries again.
    Failed,
}

/// Counters accumulated over a streaming run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerStats {
    /// Cycles attempted.
    pub cycles: u64,
    /// Frames published.
    pub frames_published: u64,
    /// Samples across all published frames.
    pub samples_published: u64,
    /// Cycles where the source returned nothing.
    pub empty_cycles: u64,
    /// Cycles lost to a source or publish error.
    pub failed_cycles: u64,
}

/// Acquisition loop over a sample source and a frame publisher.
pub struct Producer<S, P> {
    source: S,
    publisher: P,
    interval: Duration,
    state: ProducerState,
}

impl<S, P> Producer<S, P>
where
    S: BatchSource,
    P: FramePublisher,
{
    /// New producer idling `interval` between cycles.
    pub fn new(source: S, publisher: P, interval: Duration) -> Self {
        Self {
            source,
            publisher,
            interval,
            state: ProducerState::Disconnected,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProducerState {
        self.state
    }

    /// Configure the source. On failure the producer stays `Disconnected` and
    /// the error goes back to the caller unretried.
    pub async fn connect(&mut self) -> AppResult<()> {
        if self.state != ProducerState::Disconnected {
            return Err(DaqError::InvalidState(format!(
                "connect() from {:?}",
                self.state
            )));
        }
        self.source.connect().await?;
        self.state = ProducerState::Connected;
        info!(source = %self.source.describe(), endpoint = %self.publisher.endpoint(), "producer connected");
        Ok(())
    }

    /// Run one acquire/encode/publish step.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let values = match self.source.acquire_batch().await {
            Ok(Some(values)) if !values.is_empty() => values,
            Ok(_) => {
                debug!("no data this cycle");
                return CycleOutcome::NoData;
            }
            Err(e) => {
                warn!(error = %e, "acquisition failed, skipping cycle");
                return CycleOutcome::Failed;
            }
        };

        let payload = encode_values(&values);
        match self.publisher.publish(&payload).await {
            Ok(()) => {
                debug!(samples = values.len(), "frame published");
                CycleOutcome::Published(values.len())
            }
            Err(e) => {
                warn!(error = %e, "publish failed, skipping cycle");
                CycleOutcome::Failed
            }
        }
    }

    /// Stream until `cancel` fires. Consumes the producer.
    pub async fn stream(mut self, cancel: CancellationToken) -> ProducerStats {
        self.state = ProducerState::Streaming;
        let mut stats = ProducerStats::default();
        let mut armed = false;
        info!(interval_s = self.interval.as_secs_f64(), "producer streaming");

        while !cancel.is_cancelled() {
            stats.cycles += 1;

            if !armed {
                match self.source.start_acquisition().await {
                    Ok(()) => armed = true,
                    Err(e) => warn!(error = %e, "start acquisition failed, retrying next cycle"),
                }
            }

            if armed {
                match self.run_cycle().await {
                    CycleOutcome::Published(n) => {
                        stats.frames_published += 1;
                        stats.samples_published += n as u64;
                    }
                    CycleOutcome::NoData => stats.empty_cycles += 1,
                    CycleOutcome::Failed => stats.failed_cycles += 1,
                }
            } else {
                stats.failed_cycles += 1;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep(self.interval) => {}
            }
        }

        self.state = ProducerState::Stopped;
        info!(
            cycles = stats.cycles,
            frames = stats.frames_published,
            samples = stats.samples_published,
            empty = stats.empty_cycles,
            failed = stats.failed_cycles,
            "producer stopped"
        );
        stats
    }
}

impl<S, P> Producer<S, P>
where
    S: BatchSource + 'static,
    P: FramePublisher + 'static,
{
    /// Start streaming on a dedicated task. Only valid from `Connected`.
    pub fn spawn(self) -> AppResult<ProducerHandle> {
        if self.state != ProducerState::Connected {
            return Err(DaqError::InvalidState(format!(
                "spawn() from {:?}",
                self.state
            )));
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.stream(cancel.clone()));
        Ok(ProducerHandle { cancel, task })
    }
}

/// Handle to a running producer task.
pub struct ProducerHandle {
    cancel: CancellationToken,
    task: JoinHandle<ProducerStats>,
}

impl ProducerHandle {
    /// Ask the loop to exit. Idempotent.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!("producer stop requested");
            self.cancel.cancel();
        }
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Lifecycle state of the spawned loop.
    pub fn state(&self) -> ProducerState {
        if self.task.is_finished() {
            ProducerState::Stopped
        } else {
            ProducerState::Streaming
        }
    }

    /// Wait for the loop to exit and collect its statistics.
    pub async fn join(self) -> AppResult<ProducerStats> {
        self.task
            .await
            .map_err(|e| DaqError::InvalidState(format!("producer task failed: {e}")))
    }

    /// Stop and wait in one call.
    pub async fn shutdown(self) -> AppResult<ProducerStats> {
        self.stop();
        self.join().await
    }
}

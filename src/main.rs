//! CLI Entry Point for counter-daq
//!
//! Provides command-line interface for:
//! - Running the acquisition producer on its own (`produce`)
//! - Running producer and analysis session together (`run`)
//! - Printing the effective configuration (`config`)
//!
//! # Usage
//!
//! Stream synthetic data and compute Allan deviation for a minute:
//! ```bash
//! counter-daq run --virtual --allan --duration 60
//! ```
//!
//! Serve frames from a real counter for an external consumer:
//! ```bash
//! counter-daq --config config/counter.toml produce --port 5555
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use counter_daq::config::CounterConfig;
use counter_daq::consumer::Consumer;
use counter_daq::instrument::{BatchSource, ScpiCounter, VirtualCounter};
use counter_daq::measurement::MeasurementMode;
use counter_daq::producer::{Producer, ProducerHandle};
use counter_daq::session::{Session, SessionCommand, SessionEvent, SessionSettings};
use counter_daq::storage::SeriesLogger;
use counter_daq::tracing_config;
use counter_daq::transport::{ZmqPublisher, ZmqSubscriber};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "counter-daq")]
#[command(about = "Frequency counter acquisition with live Allan deviation and PSD", long_about = None)]
struct Cli {
    /// Configuration file (defaults to config/counter.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire and publish frames until Ctrl+C
    Produce(AcquisitionArgs),

    /// Acquire, ingest and analyse in one process
    Run(RunArgs),

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args)]
struct AcquisitionArgs {
    /// Use the synthetic counter instead of hardware
    #[arg(long = "virtual")]
    virtual_mode: bool,

    /// Publish port
    #[arg(long)]
    port: Option<u16>,

    /// Gate time in seconds
    #[arg(long)]
    gate_time: Option<f64>,

    /// Seconds between reads
    #[arg(long)]
    time_between_reads: Option<f64>,

    /// Measurement mode (RCON or CONT)
    #[arg(long)]
    mode: Option<String>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    acquisition: AcquisitionArgs,

    /// Enable the Allan deviation pipeline
    #[arg(long)]
    allan: bool,

    /// Enable the PSD pipeline
    #[arg(long)]
    psd: bool,

    /// Log the time series to disk
    #[arg(long)]
    log: bool,

    /// Detrend before analysis
    #[arg(long)]
    detrend: bool,

    /// Allan reference frequency in Hz
    #[arg(long)]
    f0: Option<f64>,

    /// Welch segment length
    #[arg(long)]
    averaging: Option<usize>,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    duration: Option<u64>,
}

impl AcquisitionArgs {
    fn apply(&self, config: &mut CounterConfig) -> Result<()> {
        if self.virtual_mode {
            config.instrument.virtual_mode = true;
        }
        if let Some(port) = self.port {
            config.transport.port = port;
        }
        if let Some(gate) = self.gate_time {
            config.instrument.gate_time = gate;
        }
        if let Some(tbr) = self.time_between_reads {
            config.instrument.time_between_reads = tbr;
        }
        if let Some(mode) = &self.mode {
            config.instrument.mode = mode.parse::<MeasurementMode>()?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => CounterConfig::load_from(path),
        None => CounterConfig::load(),
    }
    .context("failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        config.application.log_level = level.clone();
    }

    match cli.command {
        Commands::Produce(args) => {
            args.apply(&mut config)?;
            config.validate()?;
            tracing_config::init_from_config(&config)?;
            produce(config).await
        }
        Commands::Run(args) => {
            args.acquisition.apply(&mut config)?;
            if let Some(f0) = args.f0 {
                config.analysis.f0 = f0;
            }
            if let Some(n) = args.averaging {
                config.analysis.psd_averaging = n;
            }
            if args.detrend {
                config.analysis.detrend = true;
            }
            config.validate()?;
            tracing_config::init_from_config(&config)?;
            run(config, args).await
        }
        Commands::Config => {
            config.validate()?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn produce(config: CounterConfig) -> Result<()> {
    let producer = launch_producer(&config).await?;
    info!("Producer running - press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    let stats = producer.shutdown().await?;
    info!(
        frames = stats.frames_published,
        samples = stats.samples_published,
        "Producer finished"
    );
    Ok(())
}

async fn run(config: CounterConfig, args: RunArgs) -> Result<()> {
    let producer = launch_producer(&config).await?;

    let subscriber = ZmqSubscriber::connect(&config.transport.host, config.transport.port)
        .await
        .context("failed to connect subscriber")?;
    let consumer = Consumer::new(
        subscriber,
        config.instrument.gate_time,
        config.transport.poll_timeout(),
    );
    let mut session = Session::new(
        consumer,
        SeriesLogger::from_config(&config.storage),
        SessionSettings::from_config(&config),
    );

    let mut initial = Vec::new();
    if args.allan {
        initial.push(SessionCommand::EnableAllan);
    }
    if args.psd {
        initial.push(SessionCommand::EnablePsd);
    }
    if args.log {
        initial.push(SessionCommand::EnableLogging);
    }
    for command in initial {
        session.handle_command(command)?;
    }

    let reporter = tokio::spawn(report_events(session.subscribe_events()));

    let (commands, rx) = mpsc::channel(16);
    let duration = args.duration.map(Duration::from_secs);
    tokio::spawn(async move {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Ctrl+C handler failed");
                }
            }
        }
        let _ = commands.send(SessionCommand::Shutdown).await;
    });

    info!("Session running - press Ctrl+C to stop");
    let outcome = session.run(rx).await;

    let stats = producer.shutdown().await?;
    reporter.abort();
    outcome?;
    info!(
        frames_published = stats.frames_published,
        samples_ingested = session.series().len(),
        "Run finished"
    );
    Ok(())
}

async fn launch_producer(config: &CounterConfig) -> Result<ProducerHandle> {
    let publisher = ZmqPublisher::bind(config.transport.port)
        .await
        .with_context(|| format!("failed to bind port {}", config.transport.port))?;
    let interval = config.instrument.read_interval();

    if config.instrument.virtual_mode {
        let source = VirtualCounter::new(
            config.instrument.gate_time,
            config.instrument.time_between_reads,
        );
        start_producer(source, publisher, interval).await
    } else {
        let source = ScpiCounter::open(&config.instrument)
            .await
            .with_context(|| format!("failed to reach counter at {}", config.instrument.ip))?;
        start_producer(source, publisher, interval).await
    }
}

async fn start_producer<S>(
    source: S,
    publisher: ZmqPublisher,
    interval: Duration,
) -> Result<ProducerHandle>
where
    S: BatchSource + 'static,
{
    let mut producer = Producer::new(source, publisher, interval);
    producer.connect().await.context("instrument setup failed")?;
    Ok(producer.spawn()?)
}

async fn report_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::SeriesExtended {
                total, latest, window_mean, ..
            }) => {
                if let Some((t, f)) = latest {
                    info!(total, t, f, mean = ?window_mean, "samples");
                }
            }
            Ok(SessionEvent::AllanUpdated(result)) => {
                for p in &result.points {
                    info!(tau = p.tau, adev = p.deviation, err = p.deviation_error, n = p.count, "allan");
                }
                if let Some(trend) = result.trend_per_second {
                    info!(trend_hz_per_s = trend, "allan trend");
                }
            }
            Ok(SessionEvent::PsdUpdated(result)) => {
                info!(
                    bins = result.frequencies.len(),
                    segments = result.segments,
                    trend_hz_per_s = ?result.trend_per_second,
                    "psd updated"
                );
            }
            Ok(SessionEvent::AnalysisSkipped { pipeline, reason }) => {
                info!(%pipeline, %reason, "analysis skipped");
            }
            Ok(SessionEvent::LoggingStarted { path }) => {
                info!(path = %path.display(), "logging to file");
            }
            Ok(SessionEvent::LoggingStopped { path }) => {
                info!(path = ?path, "logging stopped");
            }
            Ok(SessionEvent::Status(msg)) => info!("{msg}"),
            Ok(SessionEvent::Error(msg)) => warn!("{msg}"),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "event reporter lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

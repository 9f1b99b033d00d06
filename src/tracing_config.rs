//! Subscriber setup for structured logging.
//!
//! Producer cycles, ingestion steps and analysis cycles log through `tracing`
//! with structured fields (`samples`, `total`, `elapsed_ms`, ...). This module
//! installs the global subscriber once per process:
//!
//! - the level comes from `[application].log_level` unless `RUST_LOG` is set;
//! - the ZeroMQ stack is capped at `warn` so socket chatter does not drown
//!   the per-cycle events;
//! - output is pretty, compact or JSON per `[application].log_format`.
//!
//! # Example
//! ```no_run
//! use counter_daq::{config::CounterConfig, tracing_config};
//! use tracing::info;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CounterConfig::load()?;
//! tracing_config::init_from_config(&config)?;
//! info!("Application started");
//! # Ok(())
//! # }
//! ```

use crate::config::{CounterConfig, LogFormat};
use crate::error::{AppResult, DaqError};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Targets that are always capped, whatever the configured level.
pub const QUIET_TARGETS: &[(&str, Level)] = &[("zeromq", Level::WARN)];

/// How the global subscriber is built.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for this crate and anything not listed in the directives
    pub level: Level,
    /// Output layout
    pub format: LogFormat,
    /// Extra `target=level` filter directives
    pub directives: Vec<String>,
    /// Emit span open/close events
    pub with_span_events: bool,
    /// ANSI colors (pretty output only)
    pub with_ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl TracingConfig {
    /// Level and format from the `[application]` section
    pub fn from_config(config: &CounterConfig) -> AppResult<Self> {
        let level = parse_log_level(&config.application.log_level)?;
        Ok(Self::new(level).with_format(config.application.log_format))
    }

    /// Pretty output at `level` with the transport crates capped
    pub fn new(level: Level) -> Self {
        Self {
            level,
            format: LogFormat::Pretty,
            directives: QUIET_TARGETS
                .iter()
                .map(|(target, cap)| format!("{target}={}", level_name(*cap)))
                .collect(),
            with_span_events: false,
            with_ansi: true,
        }
    }

    /// Set output format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Add a `target=level` directive
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Enable or disable span events
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    /// Enable or disable ANSI colors
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }

    /// The filter used when `RUST_LOG` is unset, e.g. `info,zeromq=warn`.
    pub fn filter_directives(&self) -> String {
        std::iter::once(level_name(self.level).to_string())
            .chain(self.directives.iter().cloned())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Initialize tracing from the application configuration
pub fn init_from_config(config: &CounterConfig) -> AppResult<()> {
    init(TracingConfig::from_config(config)?)
}

/// Install the global subscriber.
///
/// Returns `Ok(())` without doing anything if one is already installed, so
/// tests and the binary can both call it.
pub fn init(config: TracingConfig) -> AppResult<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.filter_directives())
            .map_err(|e| DaqError::Validation(format!("Invalid log filter: {e}")))?,
    };
    let span_events = if config.with_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = match config.format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_span_events(span_events)
            .with_ansi(config.with_ansi)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_span_events(span_events)
            .with_target(false)
            .with_ansi(false)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_current_span(false)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| DaqError::InvalidState(format!("Failed to initialize tracing: {e}")))
}

/// Parse log level string into tracing Level
pub fn parse_log_level(level: &str) -> AppResult<Level> {
    level.trim().parse::<Level>().map_err(|_| {
        DaqError::Validation(format!(
            "Invalid log level '{level}'. Must be one of: trace, debug, info, warn, error"
        ))
    })
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

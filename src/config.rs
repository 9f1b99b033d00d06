//! Configuration System using Figment
//!
//! This module provides strongly-typed configuration loading for the acquisition
//! system. Configuration is layered from:
//! 1. Built-in defaults (the values the counter is normally operated with)
//! 2. A TOML file (`config/counter.toml` or a path given on the command line)
//! 3. Environment variables (prefixed with `COUNTER_DAQ_`, sections split by `__`)
//!
//! # Example
//! ```no_run
//! use counter_daq::config::CounterConfig;
//!
//! let config = CounterConfig::load()?;
//! config.validate()?;
//! println!("Counter at {}:{}", config.instrument.ip, config.instrument.scpi_port);
//! # Ok::<(), counter_daq::error::DaqError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppResult, DaqError};
use crate::measurement::MeasurementMode;
use crate::validation::{is_in_range, is_positive, is_valid_ipv4, is_valid_port};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/counter.toml";

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "COUNTER_DAQ_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Frequency counter connection and acquisition settings
    pub instrument: InstrumentConfig,
    /// Publish/subscribe endpoint settings
    pub transport: TransportConfig,
    /// Allan deviation, PSD and display settings
    pub analysis: AnalysisConfig,
    /// Log file settings
    pub storage: StorageConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human readable output
    #[default]
    Pretty,
    /// Single-line output without colors
    Compact,
    /// One JSON object per event
    Json,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "counter-daq".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Frequency counter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Dotted-quad address of the counter
    pub ip: String,
    /// Raw-socket SCPI port (LXI default 5025)
    pub scpi_port: u16,
    /// Frequency measurement mode
    pub mode: MeasurementMode,
    /// Gate time in seconds; also the sample spacing
    pub gate_time: f64,
    /// Idle time between acquisition cycles in seconds
    pub time_between_reads: f64,
    /// Synthesize samples instead of talking to hardware
    pub virtual_mode: bool,
    /// Bound on a single SCPI command/response exchange
    pub io_timeout_ms: u64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            ip: "192.168.19.80".to_string(),
            scpi_port: 5025,
            mode: MeasurementMode::Reciprocal,
            gate_time: 1.0,
            time_between_reads: 3.0,
            virtual_mode: false,
            io_timeout_ms: default_io_timeout(),
        }
    }
}

impl InstrumentConfig {
    /// Producer cadence as a duration.
    pub fn read_interval(&self) -> Duration {
        Duration::from_secs_f64(self.time_between_reads)
    }

    /// SCPI I/O bound as a duration.
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

/// Publish/subscribe settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Port the publisher binds on all interfaces
    pub port: u16,
    /// Host the subscriber connects to
    pub host: String,
    /// Bound on one subscriber poll
    pub poll_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 5555,
            host: "localhost".to_string(),
            poll_timeout_ms: 1000,
        }
    }
}

impl TransportConfig {
    /// Poll bound as a duration.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Analysis pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Reference frequency used to normalize Allan input (Hz)
    pub f0: f64,
    /// Welch segment length
    pub psd_averaging: usize,
    /// Delay between analysis cycles in seconds
    pub update_interval_secs: u64,
    /// Number of samples shown by the time-series window
    pub time_series_record_length: usize,
    /// Subtract a fitted line before analysis
    pub detrend: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            f0: 193e12,
            psd_averaging: 10,
            update_interval_secs: 10,
            time_series_record_length: 250,
            detrend: false,
        }
    }
}

impl AnalysisConfig {
    /// Analysis cadence as a duration.
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }
}

/// Log file configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Output directory for data files
    pub output_dir: PathBuf,
    /// File name prefix
    pub file_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./data"),
            file_prefix: "ks".to_string(),
        }
    }
}

// Default value functions
fn default_io_timeout() -> u64 {
    5000
}

impl CounterConfig {
    /// Load configuration from `config/counter.toml` and environment variables
    ///
    /// Environment variables override file values with prefix `COUNTER_DAQ_`.
    /// Example: `COUNTER_DAQ_INSTRUMENT__GATE_TIME=0.1`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path. A missing file is not an
    /// error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config = Self::figment(path.as_ref()).extract()?;
        Ok(config)
    }

    /// The layered provider stack used by [`load_from`](Self::load_from).
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(CounterConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DaqError::Validation(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        self.instrument.validate()?;

        is_valid_port(self.transport.port)
            .map_err(|e| DaqError::Validation(format!("transport.port: {e}")))?;
        if self.transport.host.trim().is_empty() {
            return Err(DaqError::Validation(
                "transport.host must not be empty".to_string(),
            ));
        }
        if self.transport.poll_timeout_ms == 0 {
            return Err(DaqError::Validation(
                "transport.poll_timeout_ms must be positive".to_string(),
            ));
        }

        self.analysis.validate()
    }
}

impl InstrumentConfig {
    /// Validate the counter settings on their own, as the connect dialog does.
    pub fn validate(&self) -> AppResult<()> {
        is_valid_ipv4(&self.ip)
            .map_err(|e| DaqError::Validation(format!("instrument.ip '{}': {e}", self.ip)))?;
        is_valid_port(self.scpi_port)
            .map_err(|e| DaqError::Validation(format!("instrument.scpi_port: {e}")))?;
        is_positive(self.gate_time)
            .map_err(|e| DaqError::Validation(format!("instrument.gate_time: {e}")))?;
        is_in_range(self.time_between_reads, 1.0..=10.0).map_err(|_| {
            DaqError::Validation(format!(
                "instrument.time_between_reads {} must be between 1 and 10 seconds",
                self.time_between_reads
            ))
        })?;
        if self.io_timeout_ms == 0 {
            return Err(DaqError::Validation(
                "instrument.io_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl AnalysisConfig {
    /// Validate the analysis settings.
    pub fn validate(&self) -> AppResult<()> {
        validate_f0(self.f0)?;
        validate_psd_averaging(self.psd_averaging)?;
        if self.update_interval_secs == 0 {
            return Err(DaqError::Validation(
                "analysis.update_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.time_series_record_length == 0 {
            return Err(DaqError::Validation(
                "analysis.time_series_record_length must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reject a non-positive or non-finite reference frequency.
pub fn validate_f0(f0: f64) -> AppResult<()> {
    is_positive(f0).map_err(|e| DaqError::Validation(format!("f0 {f0}: {e}")))
}

/// Reject a Welch segment length below two.
pub fn validate_psd_averaging(n: usize) -> AppResult<()> {
    if n < 2 {
        return Err(DaqError::Validation(format!(
            "Averaging must be at least 2, got {n}"
        )));
    }
    Ok(())
}

//! # Counter DAQ Core Library
//!
//! Acquisition and live analysis for a frequency counter. A producer reads
//! batches of frequency samples from the counter (or a synthetic source) and
//! publishes them as text frames; a consumer session ingests the frames into a
//! time series and feeds two independently toggled analysis pipelines
//! (overlapping Allan deviation and Welch PSD) and a plain-text logger.
//!
//! ## Crate Structure
//!
//! - **`config`**: figment-backed [`config::CounterConfig`] (defaults, TOML,
//!   `COUNTER_DAQ_*` environment) and its validation.
//! - **`error`**: the [`error::DaqError`] enum and its recovery classes.
//! - **`tracing_config`**: subscriber setup for structured logging.
//! - **`measurement`**: measurement modes and the `(t, f)` [`measurement::Series`].
//! - **`transport`**: the frame codec and publish/subscribe transports
//!   (ZeroMQ and in-process).
//! - **`instrument`**: the [`instrument::BatchSource`] capability with SCPI and
//!   virtual counters.
//! - **`producer`**: the acquisition worker.
//! - **`scheduler`**: the delayed-task queue behind the session loop.
//! - **`consumer`**: frame ingestion and timestamp reconstruction.
//! - **`window`**: the display window over the newest samples.
//! - **`analysis`**: detrending, Allan deviation and Welch PSD.
//! - **`pipeline`**: per-pipeline buffers, generations and last results.
//! - **`storage`**: the series logger.
//! - **`session`**: the single-task consumer event loop.
//! - **`validation`**: small validation helpers used by the config layer.

pub mod analysis;
pub mod config;
pub mod consumer;
pub mod error;
pub mod instrument;
pub mod measurement;
pub mod pipeline;
pub mod producer;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod tracing_config;
pub mod transport;
pub mod validation;
pub mod window;

pub use error::{AppResult, DaqError};

//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the kinds of failure that can occur between the counter, the transport and the
//! analysis pipelines.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically file parsing or type mismatches
//!   in the configuration sources.
//! - **`Validation`**: A configuration value that parsed but is not acceptable (an IP
//!   octet above 255, a non-positive gate time, ...). Raised before any state change.
//! - **`Io`**: Wraps `std::io::Error`, covering log file writes.
//! - **`Storage`**: A log table could not be encoded or parsed.
//! - **`Transport`**: Binding or connecting a publish/subscribe endpoint failed.
//! - **`TransportClosed`**: The in-process bus has no publisher left.
//! - **`Connect`**: The counter could not be reset and configured during connect.
//! - **`Instrument`**: Communication with the frequency counter failed mid-stream.
//! - **`Frame`**: A received frame could not be decoded into numbers.
//! - **`NumericDegeneracy`**: An analysis cycle's input does not support the requested
//!   computation (too few samples, no valid averaging interval, non-finite values).
//! - **`InvalidState`**: An operation was requested from the wrong lifecycle state.
//!
//! [`DaqError::class`] folds these variants onto the four recovery classes the
//! session loop branches on.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Every failure the acquisition system reports.
#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Transport closed: no publisher is attached")]
    TransportClosed,

    #[error("Instrument connect failed: {0}")]
    Connect(String),

    #[error("Instrument error: {0}")]
    Instrument(String),

    #[error("Frame decode error: {0}")]
    Frame(String),

    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Recovery class of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Fatal to starting a session; reported immediately, never retried.
    Setup,
    /// Absorbed by rescheduling; the next cycle tries again.
    Transient,
    /// Rejected input; previous state untouched.
    Validation,
    /// Analysis result withheld for this cycle only.
    NumericDegeneracy,
}

impl DaqError {
    /// Classify the error for the caller's retry policy.
    pub fn class(&self) -> ErrorClass {
        match self {
            DaqError::Config(_) | DaqError::Validation(_) => ErrorClass::Validation,
            DaqError::Transport(_) | DaqError::Connect(_) | DaqError::InvalidState(_) => {
                ErrorClass::Setup
            }
            DaqError::Io(_)
            | DaqError::Storage(_)
            | DaqError::TransportClosed
            | DaqError::Instrument(_)
            | DaqError::Frame(_) => ErrorClass::Transient,
            DaqError::NumericDegeneracy(_) => ErrorClass::NumericDegeneracy,
        }
    }
}

impl From<figment::Error> for DaqError {
    fn from(value: figment::Error) -> Self {
        DaqError::Config(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_setup_errors() {
        let err = DaqError::Transport("address in use".into());
        assert_eq!(err.class(), ErrorClass::Setup);
    }

    #[test]
    fn degenerate_analysis_has_its_own_class() {
        let err = DaqError::NumericDegeneracy("no valid tau".into());
        assert_eq!(err.class(), ErrorClass::NumericDegeneracy);
    }

    #[test]
    fn frame_and_instrument_errors_are_transient() {
        assert_eq!(
            DaqError::Frame("bad float".into()).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            DaqError::Instrument("query timed out".into()).class(),
            ErrorClass::Transient
        );
    }

    #[test]
    fn display_includes_context() {
        let err = DaqError::Validation("Port must be between 1 and 65535".into());
        assert!(err.to_string().contains("65535"));
    }
}

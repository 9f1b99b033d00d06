//! Numerical procedures behind the analysis pipelines.
//!
//! Everything here is a pure function over a slice of samples taken at a
//! constant rate; scheduling and buffering live in [`crate::pipeline`].
//!
//! - [`detrend`]: least-squares line removal.
//! - [`allan`]: overlapping Allan deviation of fractional-frequency data.
//! - [`welch`]: Welch power spectral density.

pub mod allan;
pub mod detrend;
pub mod welch;

pub use allan::{oadev_frequency, AllanPoint};
pub use detrend::{linear_detrend, maybe_detrend, DetrendResult};
pub use welch::{welch_psd, Spectrum};

use crate::error::{AppResult, DaqError};

/// Reject input containing NaN or infinities.
pub(crate) fn ensure_finite(data: &[f64], what: &str) -> AppResult<()> {
    match data.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(DaqError::NumericDegeneracy(format!(
            "{what}: non-finite value at index {i}"
        ))),
        None => Ok(()),
    }
}

//! Linear detrending.
//!
//! The fit uses the sample index as abscissa. Values are centred before the
//! fit so that a 80 MHz carrier with millihertz drift keeps its precision.

use super::ensure_finite;
use crate::error::{AppResult, DaqError};

/// Detrended samples plus the slope that was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct DetrendResult {
    /// Input minus the fitted line (or the input itself when not detrended).
    pub values: Vec<f64>,
    /// Fitted slope in units per sample; `None` when no fit was made.
    pub slope: Option<f64>,
}

/// Subtract the least-squares line `a + b·i` from `data`.
pub fn linear_detrend(data: &[f64]) -> AppResult<DetrendResult> {
    let n = data.len();
    if n < 2 {
        return Err(DaqError::NumericDegeneracy(format!(
            "linear fit needs at least 2 samples, got {n}"
        )));
    }
    ensure_finite(data, "detrend")?;

    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = data.iter().sum::<f64>() / n as f64;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, &y) in data.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;

    let values = data
        .iter()
        .enumerate()
        .map(|(i, &y)| (y - y_mean) - slope * (i as f64 - x_mean))
        .collect();

    Ok(DetrendResult {
        values,
        slope: Some(slope),
    })
}

/// Detrend when `enabled` and there are at least two samples; otherwise hand
/// the data back unchanged with no slope.
pub fn maybe_detrend(data: &[f64], enabled: bool) -> AppResult<DetrendResult> {
    if !enabled || data.len() < 2 {
        return Ok(DetrendResult {
            values: data.to_vec(),
            slope: None,
        });
    }
    linear_detrend(data)
}

//! Welch power spectral density.
//!
//! Defaults follow the usual convention for a one-sided density estimate:
//! periodic Hann window of `nperseg` points, 50 % overlap, per-segment mean
//! removal, `nfft = nperseg`, scaling `1 / (fs · Σw²)`, and periodograms
//! averaged with the arithmetic mean.

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f64::consts::PI;

use super::ensure_finite;
use crate::error::{AppResult, DaqError};

/// One-sided power spectral density.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// Bin frequencies in Hz, `k · fs / nperseg` for `k = 0..=nperseg/2`.
    pub frequencies: Vec<f64>,
    /// Power density per bin in units²/Hz.
    pub power: Vec<f64>,
    /// Number of averaged segments.
    pub segments: usize,
}

/// Periodic Hann window of length `n`.
pub fn hann_periodic(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}

/// Estimate the PSD of `x` sampled at `fs` Hz using segments of `nperseg`.
///
/// A segment length longer than the input is shortened to the input length.
pub fn welch_psd(x: &[f64], fs: f64, nperseg: usize) -> AppResult<Spectrum> {
    if !(fs.is_finite() && fs > 0.0) {
        return Err(DaqError::NumericDegeneracy(format!(
            "sampling frequency must be positive, got {fs}"
        )));
    }
    if x.is_empty() {
        return Err(DaqError::NumericDegeneracy("empty input".to_string()));
    }
    if nperseg == 0 {
        return Err(DaqError::NumericDegeneracy(
            "segment length must be positive".to_string(),
        ));
    }
    ensure_finite(x, "welch")?;

    let nperseg = nperseg.min(x.len());
    let step = nperseg - nperseg / 2;
    let segments = (x.len() - nperseg) / step + 1;
    let nbins = nperseg / 2 + 1;

    let window = hann_periodic(nperseg);
    let window_power: f64 = window.iter().map(|w| w * w).sum();
    if window_power == 0.0 {
        return Err(DaqError::NumericDegeneracy(format!(
            "segment length {nperseg} leaves an all-zero window"
        )));
    }
    let scale = 1.0 / (fs * window_power);

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(nperseg);
    let mut buffer = vec![Complex::new(0.0, 0.0); nperseg];
    let mut power = vec![0.0; nbins];

    for seg in 0..segments {
        let chunk = &x[seg * step..seg * step + nperseg];
        let mean = chunk.iter().sum::<f64>() / nperseg as f64;
        for ((slot, &v), &w) in buffer.iter_mut().zip(chunk).zip(&window) {
            *slot = Complex::new((v - mean) * w, 0.0);
        }
        fft.process(&mut buffer);
        for (acc, c) in power.iter_mut().zip(&buffer) {
            *acc += c.norm_sqr() * scale;
        }
    }

    // Fold negative frequencies; DC and (for even lengths) Nyquist appear once.
    let last_doubled = if nperseg % 2 == 0 { nbins - 1 } else { nbins };
    for p in power.iter_mut().take(last_doubled).skip(1) {
        *p *= 2.0;
    }
    for p in &mut power {
        *p /= segments as f64;
    }

    let frequencies = (0..nbins)
        .map(|k| k as f64 * fs / nperseg as f64)
        .collect();

    Ok(Spectrum {
        frequencies,
        power,
        segments,
    })
}

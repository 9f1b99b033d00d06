//! Overlapping Allan deviation for fractional-frequency data.
//!
//! The frequency series `y` sampled every `τ0 = 1/rate` is integrated to phase,
//! `x[0] = 0`, `x[i+1] = x[i] + (y[i] - ȳ)·τ0`, and for every averaging factor
//! `m` the fully overlapped estimator is
//!
//! ```text
//! σ²(mτ0) = Σ (x[i+2m] - 2x[i+m] + x[i])² / (2 (mτ0)² n),   n = len(x) - 2m
//! ```
//!
//! Averaging factors are octave spaced (`m = 1, 2, 4, …`). A point is kept only
//! when at least two second differences contributed to it.

use super::ensure_finite;
use crate::error::{AppResult, DaqError};

/// One point of an Allan deviation curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllanPoint {
    /// Averaging time in seconds.
    pub tau: f64,
    /// Overlapping Allan deviation.
    pub deviation: f64,
    /// Simple `σ / √n` confidence estimate.
    pub deviation_error: f64,
    /// Number of second differences averaged.
    pub count: usize,
}

/// Octave-spaced averaging factors with at least one term for a phase record
/// of `phase_len` points.
fn octave_factors(phase_len: usize) -> Vec<usize> {
    let mut factors = Vec::new();
    let mut m = 1usize;
    while m < phase_len && 2 * m < phase_len {
        factors.push(m);
        m *= 2;
    }
    factors
}

/// Overlapping Allan deviation of fractional-frequency samples `y` taken at
/// `rate` samples per second.
pub fn oadev_frequency(y: &[f64], rate: f64) -> AppResult<Vec<AllanPoint>> {
    if !(rate.is_finite() && rate > 0.0) {
        return Err(DaqError::NumericDegeneracy(format!(
            "sample rate must be positive, got {rate}"
        )));
    }
    ensure_finite(y, "allan deviation")?;
    let tau0 = 1.0 / rate;

    // Removing the mean leaves every second difference unchanged but keeps
    // the integrated phase small.
    let mean = if y.is_empty() {
        0.0
    } else {
        y.iter().sum::<f64>() / y.len() as f64
    };
    let mut phase = Vec::with_capacity(y.len() + 1);
    phase.push(0.0);
    let mut acc = 0.0;
    for &v in y {
        acc += (v - mean) * tau0;
        phase.push(acc);
    }

    let points: Vec<AllanPoint> = octave_factors(phase.len())
        .into_iter()
        .filter_map(|m| {
            let n = phase.len() - 2 * m;
            if n <= 1 {
                return None;
            }
            let s: f64 = (0..n)
                .map(|i| {
                    let d = phase[i + 2 * m] - 2.0 * phase[i + m] + phase[i];
                    d * d
                })
                .sum();
            let tau = m as f64 * tau0;
            let deviation = (s / (2.0 * n as f64)).sqrt() / tau;
            Some(AllanPoint {
                tau,
                deviation,
                deviation_error: deviation / (n as f64).sqrt(),
                count: n,
            })
        })
        .collect();

    if points.is_empty() {
        return Err(DaqError::NumericDegeneracy(format!(
            "no averaging time resolvable from {} samples",
            y.len()
        )));
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::rng::SourceRng;

    #[test]
    fn factors_stop_before_half_record() {
        assert_eq!(octave_factors(4), vec![1]);
        assert_eq!(octave_factors(9), vec![1, 2, 4]);
        assert_eq!(octave_factors(2), Vec::<usize>::new());
    }

    #[test]
    fn constant_frequency_has_zero_deviation() {
        let y = vec![1e-9; 64];
        let points = oadev_frequency(&y, 1.0).unwrap();
        assert!(points.iter().all(|p| p.deviation.abs() < 1e-20));
    }

    #[test]
    fn taus_and_counts_follow_octaves() {
        let y: Vec<f64> = (0..16).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let points = oadev_frequency(&y, 2.0).unwrap();
        let taus: Vec<f64> = points.iter().map(|p| p.tau).collect();
        // m = 8 leaves a single difference and is dropped
        assert_eq!(taus, vec![0.5, 1.0, 2.0]);
        let counts: Vec<usize> = points.iter().map(|p| p.count).collect();
        assert_eq!(counts, vec![15, 13, 9]);
    }

    #[test]
    fn alternating_series_matches_hand_calculation() {
        // y = +1, -1, +1, -1 ...: at m = 1 every second difference is ±2·τ0
        let y: Vec<f64> = (0..8).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let points = oadev_frequency(&y, 1.0).unwrap();
        let first = points[0];
        assert_eq!(first.count, 7);
        // sqrt(4 / 2) / 1
        assert!((first.deviation - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn white_fm_slopes_down_as_inverse_sqrt_tau() {
        let mut rng = SourceRng::new(Some(5));
        let y: Vec<f64> = (0..4096).map(|_| rng.normal(0.0, 1e-11)).collect();
        let points = oadev_frequency(&y, 1.0).unwrap();
        let at1 = points[0].deviation;
        let at16 = points.iter().find(|p| p.tau == 16.0).unwrap().deviation;
        let ratio = at1 / at16;
        // ideal ratio is 4
        assert!(ratio > 3.0 && ratio < 5.3, "ratio {ratio}");
    }

    #[test]
    fn too_short_is_degenerate() {
        assert!(matches!(
            oadev_frequency(&[1.0, 2.0], 1.0),
            Err(DaqError::NumericDegeneracy(_))
        ));
        assert!(oadev_frequency(&[], 1.0).is_err());
    }

    #[test]
    fn bad_rate_or_nan_is_degenerate() {
        assert!(oadev_frequency(&[1.0; 10], 0.0).is_err());
        assert!(oadev_frequency(&[1.0, f64::INFINITY, 1.0, 1.0], 1.0).is_err());
    }
}

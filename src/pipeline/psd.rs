//! Power spectral density pipeline.
//!
//! The Welch estimate of the frequency record is divided by `f²` bin by bin,
//! turning a frequency-fluctuation density into a phase density. The DC bin
//! has no finite rescaled value and is dropped before the division.

use std::time::Instant;
use tracing::debug;

use super::AnalysisBuffer;
use crate::analysis::{maybe_detrend, welch_psd};
use crate::config::validate_psd_averaging;
use crate::error::AppResult;

/// Output of one PSD cycle, DC bin excluded.
#[derive(Debug, Clone, PartialEq)]
pub struct PsdResult {
    /// Bin frequencies in Hz, all positive.
    pub frequencies: Vec<f64>,
    /// Welch density divided by `f²`.
    pub power: Vec<f64>,
    /// Segments averaged.
    pub segments: usize,
    /// Segment length used.
    pub averaging: usize,
    /// Removed drift in Hz per second, when detrending was on.
    pub trend_per_second: Option<f64>,
}

/// Buffer, segment length and last result of the PSD pipeline.
#[derive(Debug, Clone)]
pub struct PsdPipeline {
    buffer: AnalysisBuffer,
    averaging: usize,
    last: Option<PsdResult>,
}

impl PsdPipeline {
    /// Disabled pipeline with Welch segments of `averaging` samples.
    pub fn new(averaging: usize) -> Self {
        Self {
            buffer: AnalysisBuffer::new(),
            averaging,
            last: None,
        }
    }

    /// Start collecting from an empty buffer; returns the cycle generation.
    pub fn enable(&mut self) -> u64 {
        self.buffer.enable()
    }

    /// Stop collecting. The last result stays available.
    pub fn disable(&mut self) {
        self.buffer.disable();
    }

    /// The pipeline's buffer.
    pub fn buffer(&self) -> &AnalysisBuffer {
        &self.buffer
    }

    /// Feed one ingested batch.
    pub fn append(&mut self, batch: &[f64]) {
        self.buffer.append(batch);
    }

    /// Welch segment length.
    pub fn averaging(&self) -> usize {
        self.averaging
    }

    /// Change the segment length; values below 2 are rejected unchanged.
    pub fn set_averaging(&mut self, n: usize) -> AppResult<()> {
        validate_psd_averaging(n)?;
        self.averaging = n;
        Ok(())
    }

    /// Run one cycle over a snapshot of the buffer.
    ///
    /// Computes only once the buffer holds more samples than the segment
    /// length; `Ok(None)` until then.
    pub fn compute(&mut self, detrend: bool, gate_time: f64) -> AppResult<Option<PsdResult>> {
        let data = self.buffer.snapshot();
        if data.len() <= self.averaging {
            return Ok(None);
        }
        let started = Instant::now();

        let detrended = maybe_detrend(&data, detrend)?;
        let spectrum = welch_psd(&detrended.values, 1.0 / gate_time, self.averaging)?;

        let (frequencies, power): (Vec<f64>, Vec<f64>) = spectrum
            .frequencies
            .iter()
            .zip(&spectrum.power)
            .skip(1)
            .map(|(&f, &p)| (f, p / (f * f)))
            .unzip();

        let result = PsdResult {
            frequencies,
            power,
            segments: spectrum.segments,
            averaging: self.averaging,
            trend_per_second: detrended.slope.map(|s| s / gate_time),
        };
        debug!(
            samples = data.len(),
            bins = result.frequencies.len(),
            segments = result.segments,
            elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
            "psd cycle"
        );
        self.last = Some(result.clone());
        Ok(Some(result))
    }

    /// Most recent successful result.
    pub fn last_result(&self) -> Option<&PsdResult> {
        self.last.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DaqError;

    #[test]
    fn waits_until_buffer_exceeds_segment() {
        let mut p = PsdPipeline::new(10);
        p.enable();
        p.append(&[79.86e6; 10]);
        assert_eq!(p.compute(false, 1.0).unwrap(), None);
    }

    #[test]
    fn constant_record_gives_finite_non_dc_bins() {
        let mut p = PsdPipeline::new(10);
        p.enable();
        p.append(&[79.86e6; 11]);
        let result = p.compute(false, 1.0).unwrap().unwrap();
        assert_eq!(result.frequencies.len(), 5);
        assert!(result.frequencies.iter().all(|f| *f > 0.0));
        assert!(result.power.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn rescales_by_frequency_squared() {
        let data: Vec<f64> = (0..64).map(|i| ((i * 7919) % 13) as f64).collect();
        let spectrum = welch_psd(&data, 2.0, 16).unwrap();

        let mut p = PsdPipeline::new(16);
        p.enable();
        p.append(&data);
        let result = p.compute(false, 0.5).unwrap().unwrap();

        for (k, (f, pw)) in result.frequencies.iter().zip(&result.power).enumerate() {
            let expected = spectrum.power[k + 1] / (f * f);
            assert!((pw - expected).abs() <= 1e-12 * expected.abs().max(1.0));
        }
    }

    #[test]
    fn averaging_below_two_is_rejected() {
        let mut p = PsdPipeline::new(10);
        assert!(matches!(p.set_averaging(1), Err(DaqError::Validation(_))));
        assert_eq!(p.averaging(), 10);
        p.set_averaging(4).unwrap();
        assert_eq!(p.averaging(), 4);
    }

    #[test]
    fn detrend_reports_trend() {
        let mut p = PsdPipeline::new(4);
        p.enable();
        let data: Vec<f64> = (0..12).map(|i| 2.0 * i as f64).collect();
        p.append(&data);
        let result = p.compute(true, 2.0).unwrap().unwrap();
        assert!((result.trend_per_second.unwrap() - 1.0).abs() < 1e-9);
    }
}

//! Allan deviation pipeline.

use std::time::Instant;
use tracing::debug;

use super::AnalysisBuffer;
use crate::analysis::{maybe_detrend, oadev_frequency, AllanPoint};
use crate::config::validate_f0;
use crate::error::AppResult;

/// Fewest buffered samples a cycle will analyse is one more than this.
pub const MIN_SAMPLES_EXCLUSIVE: usize = 2;

/// Output of one Allan cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct AllanResult {
    /// Deviation curve of the fractional frequency.
    pub points: Vec<AllanPoint>,
    /// Removed drift in Hz per second, when detrending was on.
    pub trend_per_second: Option<f64>,
    /// Buffered samples the curve was computed from.
    pub samples: usize,
    /// Reference frequency used for normalization.
    pub f0: f64,
}

/// Buffer, reference frequency and last result of the Allan pipeline.
#[derive(Debug, Clone)]
pub struct AllanPipeline {
    buffer: AnalysisBuffer,
    f0: f64,
    last: Option<AllanResult>,
}

impl AllanPipeline {
    /// Disabled pipeline normalizing by `f0`.
    pub fn new(f0: f64) -> Self {
        Self {
            buffer: AnalysisBuffer::new(),
            f0,
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

    /// Reference frequency in Hz.
    pub fn f0(&self) -> f64 {
        self.f0
    }

    /// Replace the reference frequency.
    ///
    /// Returns whether an immediate recompute is due, i.e. the pipeline is
    /// enabled and holds enough samples. An invalid value changes nothing.
    pub fn set_f0(&mut self, f0: f64) -> AppResult<bool> {
        validate_f0(f0)?;
        self.f0 = f0;
        Ok(self.buffer.is_enabled() && self.buffer.len() > MIN_SAMPLES_EXCLUSIVE)
    }

    /// Run one cycle over a snapshot of the buffer.
    ///
    /// `Ok(None)` means there is not enough data yet. A degenerate input is an
    /// error and leaves the previous result in place.
    pub fn compute(&mut self, detrend: bool, gate_time: f64) -> AppResult<Option<AllanResult>> {
        let data = self.buffer.snapshot();
        if data.len() <= MIN_SAMPLES_EXCLUSIVE {
            return Ok(None);
        }
        let started = Instant::now();

        let detrended = maybe_detrend(&data, detrend)?;
        let fractional: Vec<f64> = detrended.values.iter().map(|v| v / self.f0).collect();
        let points = oadev_frequency(&fractional, 1.0 / gate_time)?;

        let result = AllanResult {
            points,
            trend_per_second: detrended.slope.map(|s| s / gate_time),
            samples: data.len(),
            f0: self.f0,
        };
        debug!(
            samples = result.samples,
            taus = result.points.len(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
            "allan cycle"
        );
        self.last = Some(result.clone());
        Ok(Some(result))
    }

    /// Most recent successful result.
    pub fn last_result(&self) -> Option<&AllanResult> {
        self.last.as_ref()
    }
}

//! Independently toggled analysis pipelines.
//!
//! Each pipeline keeps its own [`AnalysisBuffer`]: a copy of the raw frequency
//! values ingested since the pipeline was last enabled. Enabling always starts
//! from an empty buffer. Disabling only stops collection and rescheduling; the
//! buffer and the last result stay as they were.
//!
//! Every enable also bumps a generation counter. Compute cycles are scheduled
//! with the generation they were armed under, and a cycle whose generation is
//! no longer current is dropped. Without that, toggling off and on faster than
//! the update interval would leave two timer chains running.

pub mod allan;
pub mod psd;

pub use allan::{AllanPipeline, AllanResult};
pub use psd::{PsdPipeline, PsdResult};

/// Whether a pipeline is collecting, and under which generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Not collecting; no cycles scheduled.
    Disabled,
    /// Collecting; cycles armed under `generation` are live.
    Enabled {
        /// Incremented on every enable.
        generation: u64,
    },
}

/// Raw values collected for one pipeline.
#[derive(Debug, Clone)]
pub struct AnalysisBuffer {
    values: Vec<f64>,
    state: PipelineState,
    generations: u64,
}

impl Default for AnalysisBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisBuffer {
    /// Disabled, empty buffer.
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            state: PipelineState::Disabled,
            generations: 0,
        }
    }

    /// Clear and start collecting. Returns the new generation.
    pub fn enable(&mut self) -> u64 {
        self.values.clear();
        self.generations += 1;
        self.state = PipelineState::Enabled {
            generation: self.generations,
        };
        self.generations
    }

    /// Stop collecting. Content is kept.
    pub fn disable(&mut self) {
        self.state = PipelineState::Disabled;
    }

    /// Current state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// True while collecting.
    pub fn is_enabled(&self) -> bool {
        matches!(self.state, PipelineState::Enabled { .. })
    }

    /// Whether a cycle armed under `generation` should still run.
    pub fn is_current(&self, generation: u64) -> bool {
        self.state == PipelineState::Enabled { generation }
    }

    /// Append a batch; ignored while disabled.
    pub fn append(&mut self, batch: &[f64]) {
        if self.is_enabled() {
            self.values.extend_from_slice(batch);
        }
    }

    /// Copy of the collected values for one compute cycle.
    pub fn snapshot(&self) -> Vec<f64> {
        self.values.clone()
    }

    /// Collected values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of collected values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when nothing has been collected.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enable_clears_and_bumps_generation() {
        let mut buf = AnalysisBuffer::new();
        assert_eq!(buf.enable(), 1);
        buf.append(&[1.0, 2.0, 3.0]);
        buf.disable();
        assert_eq!(buf.len(), 3, "disable keeps content");

        assert_eq!(buf.enable(), 2);
        assert!(buf.is_empty());
        buf.append(&[4.0]);
        assert_eq!(buf.values(), &[4.0]);
    }

    #[test]
    fn disabled_buffer_ignores_appends() {
        let mut buf = AnalysisBuffer::new();
        buf.append(&[1.0]);
        assert!(buf.is_empty());
    }

    #[test]
    fn stale_generation_is_not_current() {
        let mut buf = AnalysisBuffer::new();
        let first = buf.enable();
        buf.disable();
        assert!(!buf.is_current(first));
        let second = buf.enable();
        assert!(!buf.is_current(first));
        assert!(buf.is_current(second));
    }
}

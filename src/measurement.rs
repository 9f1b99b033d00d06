//! Measurement data types shared by the producer, the consumer and the analysis
//! pipelines.
//!
//! - [`MeasurementMode`] is the counter's frequency measurement mode, carried on the
//!   wire to the instrument as its SCPI token and encoded in log file names.
//! - [`Series`] is the growing `(t, f)` record of one connected session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DaqError;

/// Frequency measurement mode of the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MeasurementMode {
    /// Reciprocal counting (`RCON`), gap-free per gate.
    #[default]
    Reciprocal,
    /// Continuous (`CONT`) time-stamped counting.
    Continuous,
}

impl MeasurementMode {
    /// SCPI token sent with `SENS:FREQ:MODE`.
    pub fn token(self) -> &'static str {
        match self {
            MeasurementMode::Reciprocal => "RCON",
            MeasurementMode::Continuous => "CONT",
        }
    }
}

impl fmt::Display for MeasurementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for MeasurementMode {
    type Err = DaqError;

    /// Accepts the bare token or a labelled form such as `"RCON (Pi)"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.split_whitespace().next().unwrap_or_default();
        match token.to_ascii_uppercase().as_str() {
            "RCON" => Ok(MeasurementMode::Reciprocal),
            "CONT" => Ok(MeasurementMode::Continuous),
            _ => Err(DaqError::Validation(format!(
                "Unknown measurement mode '{s}'. Must be RCON or CONT"
            ))),
        }
    }
}

impl TryFrom<String> for MeasurementMode {
    type Error = DaqError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MeasurementMode> for String {
    fn from(value: MeasurementMode) -> Self {
        value.token().to_string()
    }
}

/// Append-only `(t, f)` record, strictly increasing in `t`.
///
/// Owned by the consumer; everything downstream only borrows slices of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    t: Vec<f64>,
    f: Vec<f64>,
}

impl Series {
    /// Create an empty series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.t.len()
    }

    /// Whether no sample has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    /// Timestamp of the newest sample.
    pub fn last_time(&self) -> Option<f64> {
        self.t.last().copied()
    }

    /// All timestamps in seconds.
    pub fn times(&self) -> &[f64] {
        &self.t
    }

    /// All frequencies in Hz.
    pub fn frequencies(&self) -> &[f64] {
        &self.f
    }

    /// Append one batch sampled every `gate_time` seconds.
    ///
    /// The first sample of an empty series lands on `t = 0`; otherwise the batch
    /// continues from `last_t + gate_time`. Returns the index range that was added.
    pub fn append_batch(&mut self, values: &[f64], gate_time: f64) -> std::ops::Range<usize> {
        let start = self.len();
        let (origin, offset) = match self.last_time() {
            Some(last) => (last, 1.0),
            None => (0.0, 0.0),
        };
        self.t.reserve(values.len());
        self.f.reserve(values.len());
        for (k, &value) in values.iter().enumerate() {
            self.t.push(origin + (k as f64 + offset) * gate_time);
            self.f.push(value);
        }
        start..self.len()
    }

    /// The last `n` samples, or everything if the series is shorter.
    pub fn tail(&self, n: usize) -> (&[f64], &[f64]) {
        let start = self.len().saturating_sub(n);
        (&self.t[start..], &self.f[start..])
    }

    /// Samples from index `start` onward; empty if `start` is past the end.
    pub fn slice_from(&self, start: usize) -> (&[f64], &[f64]) {
        let start = start.min(self.len());
        (&self.t[start..], &self.f[start..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_tokens_round_trip() {
        assert_eq!("RCON".parse::<MeasurementMode>().unwrap(), MeasurementMode::Reciprocal);
        assert_eq!("cont".parse::<MeasurementMode>().unwrap(), MeasurementMode::Continuous);
        assert_eq!(
            "CONT (Lambda)".parse::<MeasurementMode>().unwrap(),
            MeasurementMode::Continuous
        );
        assert_eq!(MeasurementMode::Reciprocal.to_string(), "RCON");
        assert!("FAST".parse::<MeasurementMode>().is_err());
        assert!("".parse::<MeasurementMode>().is_err());
    }

    #[test]
    fn first_batch_starts_at_zero() {
        let mut series = Series::new();
        let range = series.append_batch(&[1.0, 2.0, 3.0], 0.5);
        assert_eq!(range, 0..3);
        assert_eq!(series.times(), &[0.0, 0.5, 1.0]);
    }

    #[test]
    fn later_batches_continue_from_last_time() {
        let mut series = Series::new();
        series.append_batch(&[1.0, 2.0], 1.0);
        let range = series.append_batch(&[3.0, 4.0], 1.0);
        assert_eq!(range, 2..4);
        assert_eq!(series.times(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(series.frequencies(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn tail_and_slice_clamp() {
        let mut series = Series::new();
        series.append_batch(&[1.0, 2.0, 3.0, 4.0], 1.0);
        assert_eq!(series.tail(2).1, &[3.0, 4.0]);
        assert_eq!(series.tail(10).1.len(), 4);
        assert_eq!(series.slice_from(3).0, &[3.0]);
        assert!(series.slice_from(9).0.is_empty());
    }
}

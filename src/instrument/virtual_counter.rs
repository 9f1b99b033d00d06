//! Synthetic frequency counter.
//!
//! Produces what a free-running oscillator looks like through the counter:
//! - White frequency noise around a fixed centre (79.860 MHz, σ = 100 Hz)
//! - A batch size of `time_between_reads / gate_time` with -2..=+1 samples of
//!   jitter, since real reads never line up exactly with the gate boundaries
//!
//! # Example
//!
//! ```
//! use counter_daq::instrument::{BatchSource, VirtualCounter};
//!
//! # tokio_test::block_on(async {
//! let mut counter = VirtualCounter::builder()
//!     .gate_time(1.0)
//!     .time_between_reads(3.0)
//!     .seed(42)
//!     .build();
//! let batch = counter.acquire_batch().await.unwrap().unwrap();
//! assert!((1..=4).contains(&batch.len()));
//! # })
//! ```

use async_trait::async_trait;

use super::rng::SourceRng;
use super::BatchSource;
use crate::error::AppResult;

/// Default centre frequency in Hz.
pub const DEFAULT_CENTER_HZ: f64 = 79.860e6;

/// Default white-noise standard deviation in Hz.
pub const DEFAULT_SIGMA_HZ: f64 = 100.0;

/// Synthetic counter
#[derive(Debug)]
pub struct VirtualCounter {
    center: f64,
    sigma: f64,
    gate_time: f64,
    time_between_reads: f64,
    rng: SourceRng,
}

impl VirtualCounter {
    /// Counter with default noise parameters and a clock-seeded generator.
    pub fn new(gate_time: f64, time_between_reads: f64) -> Self {
        Self::builder()
            .gate_time(gate_time)
            .time_between_reads(time_between_reads)
            .build()
    }

    /// Start building a counter
    pub fn builder() -> VirtualCounterBuilder {
        VirtualCounterBuilder::default()
    }

    /// Samples drawn for a given jitter offset; never fewer than one.
    fn batch_len(&self, jitter: i64) -> usize {
        let nominal = self.time_between_reads / self.gate_time + jitter as f64;
        nominal.floor().max(1.0) as usize
    }
}

#[async_trait]
impl BatchSource for VirtualCounter {
    async fn connect(&mut self) -> AppResult<()> {
        Ok(())
    }

    async fn start_acquisition(&mut self) -> AppResult<()> {
        Ok(())
    }

    async fn acquire_batch(&mut self) -> AppResult<Option<Vec<f64>>> {
        let jitter = self.rng.gen_range(-2..=1);
        let n = self.batch_len(jitter);
        let values = (0..n)
            .map(|_| self.rng.normal(self.center, self.sigma))
            .collect();
        Ok(Some(values))
    }

    fn describe(&self) -> String {
        format!(
            "virtual counter ({:.3} MHz, sigma {} Hz, seed {})",
            self.center / 1e6,
            self.sigma,
            self.rng.seed()
        )
    }
}

/// Builder for [`VirtualCounter`]
#[derive(Debug, Clone)]
pub struct VirtualCounterBuilder {
    center: f64,
    sigma: f64,
    gate_time: f64,
    time_between_reads: f64,
    seed: Option<u64>,
}

impl Default for VirtualCounterBuilder {
    fn default() -> Self {
        Self {
            center: DEFAULT_CENTER_HZ,
            sigma: DEFAULT_SIGMA_HZ,
            gate_time: 1.0,
            time_between_reads: 3.0,
            seed: None,
        }
    }
}

impl VirtualCounterBuilder {
    /// Centre frequency in Hz
    pub fn center(mut self, hz: f64) -> Self {
        self.center = hz;
        self
    }

    /// Noise standard deviation in Hz
    pub fn sigma(mut self, hz: f64) -> Self {
        self.sigma = hz;
        self
    }

    /// Gate time in seconds
    pub fn gate_time(mut self, seconds: f64) -> Self {
        self.gate_time = seconds;
        self
    }

    /// Cadence of reads in seconds
    pub fn time_between_reads(mut self, seconds: f64) -> Self {
        self.time_between_reads = seconds;
        self
    }

    /// Fixed seed for reproducible batches
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the counter
    pub fn build(self) -> VirtualCounter {
        VirtualCounter {
            center: self.center,
            sigma: self.sigma,
            gate_time: self.gate_time,
            time_between_reads: self.time_between_reads,
            rng: SourceRng::new(self.seed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_len_applies_jitter_and_floor() {
        let counter = VirtualCounter::new(1.0, 3.0);
        assert_eq!(counter.batch_len(-2), 1);
        assert_eq!(counter.batch_len(-1), 2);
        assert_eq!(counter.batch_len(0), 3);
        assert_eq!(counter.batch_len(1), 4);

        let fast = VirtualCounter::new(0.4, 3.0);
        assert_eq!(fast.batch_len(0), 7);
    }

    #[test]
    fn batch_len_never_drops_to_zero() {
        let counter = VirtualCounter::new(1.0, 1.0);
        assert_eq!(counter.batch_len(-2), 1);
        assert_eq!(counter.batch_len(-1), 1);
    }

    #[tokio::test]
    async fn seeded_counters_agree() {
        let mut a = VirtualCounter::builder().seed(9).build();
        let mut b = VirtualCounter::builder().seed(9).build();
        for _ in 0..5 {
            assert_eq!(
                a.acquire_batch().await.unwrap(),
                b.acquire_batch().await.unwrap()
            );
        }
    }

    #[tokio::test]
    async fn samples_cluster_around_center() {
        let mut counter = VirtualCounter::builder()
            .gate_time(0.01)
            .time_between_reads(10.0)
            .seed(3)
            .build();
        let batch = counter.acquire_batch().await.unwrap().unwrap();
        assert!(batch.len() >= 997);
        let mean = batch.iter().sum::<f64>() / batch.len() as f64;
        assert!((mean - DEFAULT_CENTER_HZ).abs() < 20.0);
        // six sigma
        assert!(batch.iter().all(|f| (f - DEFAULT_CENTER_HZ).abs() < 600.0));
    }
}

//! Sample sources for the acquisition loop.
//!
//! The producer only needs one capability from the hardware: "give me the next
//! batch of readings". [`BatchSource`] captures that, and two implementations
//! are selected at construction:
//!
//! - [`scpi::ScpiCounter`] drives a real frequency counter over SCPI.
//! - [`virtual_counter::VirtualCounter`] synthesizes normally distributed readings.
//!
//! [`mock::MockScpiTransport`] stands in for the instrument socket in tests.

pub mod mock;
pub mod rng;
pub mod scpi;
pub mod virtual_counter;

use async_trait::async_trait;

use crate::error::AppResult;

pub use mock::MockScpiTransport;
pub use scpi::{ScpiCounter, ScpiTransport, TcpScpiTransport};
pub use virtual_counter::VirtualCounter;

/// A source of sample batches.
#[async_trait]
pub trait BatchSource: Send {
    /// Bring the source into a state where it can stream.
    ///
    /// Any failure is a setup error; the caller does not retry.
    async fn connect(&mut self) -> AppResult<()>;

    /// Arm acquisition before the first read.
    async fn start_acquisition(&mut self) -> AppResult<()>;

    /// Next batch of readings in Hz, or `None` when the source had nothing.
    async fn acquire_batch(&mut self) -> AppResult<Option<Vec<f64>>>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

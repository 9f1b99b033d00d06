//! Publish/subscribe transport between the producer and the consumer.
//!
//! Frames travel as text, one message per acquisition batch, with at-most-once
//! delivery: a subscriber attached after a publish never sees that frame, and
//! there is no acknowledgement or replay. Two implementations exist:
//!
//! - [`zmq`]: ZeroMQ PUB/SUB over TCP, used between processes.
//! - [`local`]: a `tokio::sync::broadcast` bus for single-process runs and tests.
//!
//! The subscriber side never blocks indefinitely; [`FrameSubscriber::recv_timeout`]
//! returns [`PollOutcome::Timeout`] when nothing arrived within the bound.

pub mod frame;
pub mod local;
pub mod zmq;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::AppResult;

pub use local::{LocalBus, LocalPublisher, LocalSubscriber};
pub use zmq::{ZmqPublisher, ZmqSubscriber};

/// Result of one bounded receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A message arrived; the raw text payload.
    Frame(String),
    /// Nothing arrived within the bound.
    Timeout,
}

/// Sending half of the transport.
#[async_trait]
pub trait FramePublisher: Send {
    /// Publish one encoded frame. Fire-and-forget.
    async fn publish(&mut self, payload: &str) -> AppResult<()>;

    /// Human-readable endpoint for logs.
    fn endpoint(&self) -> String;
}

/// Receiving half of the transport.
#[async_trait]
pub trait FrameSubscriber: Send {
    /// Wait at most `timeout` for the next message.
    async fn recv_timeout(&mut self, timeout: Duration) -> AppResult<PollOutcome>;

    /// Human-readable endpoint for logs.
    fn endpoint(&self) -> String;
}

//! In-process transport over `tokio::sync::broadcast`.
//!
//! Same delivery contract as the ZeroMQ transport: subscribers only see frames
//! published after they subscribed, and a subscriber that falls more than the
//! channel capacity behind skips the frames it missed.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::warn;

use super::{FramePublisher, FrameSubscriber, PollOutcome};
use crate::error::{AppResult, DaqError};

/// Default number of frames buffered per subscriber.
pub const DEFAULT_CAPACITY: usize = 64;

/// Factory for connected publisher/subscriber pairs.
#[derive(Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<String>,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LocalBus {
    /// Create a bus buffering up to `capacity` frames per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// A publishing handle.
    pub fn publisher(&self) -> LocalPublisher {
        LocalPublisher {
            sender: self.sender.clone(),
        }
    }

    /// A new subscriber; receives only frames published from now on.
    pub fn subscribe(&self) -> LocalSubscriber {
        LocalSubscriber {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Publishing handle of a [`LocalBus`].
pub struct LocalPublisher {
    sender: broadcast::Sender<String>,
}

#[async_trait]
impl FramePublisher for LocalPublisher {
    async fn publish(&mut self, payload: &str) -> AppResult<()> {
        // No subscriber attached is not an error: the frame is simply dropped.
        let _ = self.sender.send(payload.to_string());
        Ok(())
    }

    fn endpoint(&self) -> String {
        "local".to_string()
    }
}

/// Subscribing handle of a [`LocalBus`].
pub struct LocalSubscriber {
    receiver: broadcast::Receiver<String>,
}

#[async_trait]
impl FrameSubscriber for LocalSubscriber {
    async fn recv_timeout(&mut self, timeout: Duration) -> AppResult<PollOutcome> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.receiver.recv()).await {
                Err(_) => return Ok(PollOutcome::Timeout),
                Ok(Ok(text)) => return Ok(PollOutcome::Frame(text)),
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    warn!(skipped, "local subscriber lagged, frames dropped");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(DaqError::TransportClosed)
                }
            }
        }
    }

    fn endpoint(&self) -> String {
        "local".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_every_subscriber() {
        let bus = LocalBus::new(4);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        let mut publisher = bus.publisher();

        publisher.publish("+1.0e+00\n").await.unwrap();

        let timeout = Duration::from_millis(100);
        assert_eq!(
            a.recv_timeout(timeout).await.unwrap(),
            PollOutcome::Frame("+1.0e+00\n".to_string())
        );
        assert_eq!(
            b.recv_timeout(timeout).await.unwrap(),
            PollOutcome::Frame("+1.0e+00\n".to_string())
        );
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_frames() {
        let bus = LocalBus::new(4);
        let mut publisher = bus.publisher();
        publisher.publish("early").await.unwrap();

        let mut late = bus.subscribe();
        assert_eq!(
            late.recv_timeout(Duration::from_millis(20)).await.unwrap(),
            PollOutcome::Timeout
        );
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_to_retained_frames() {
        let bus = LocalBus::new(2);
        let mut sub = bus.subscribe();
        let mut publisher = bus.publisher();
        for i in 0..5 {
            publisher.publish(&i.to_string()).await.unwrap();
        }
        assert_eq!(
            sub.recv_timeout(Duration::from_millis(50)).await.unwrap(),
            PollOutcome::Frame("3".to_string())
        );
    }

    #[tokio::test]
    async fn closed_bus_is_reported() {
        let bus = LocalBus::new(2);
        let mut sub = bus.subscribe();
        drop(bus);
        assert!(matches!(
            sub.recv_timeout(Duration::from_millis(50)).await,
            Err(DaqError::TransportClosed)
        ));
    }
}

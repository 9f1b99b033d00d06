//! ZeroMQ PUB/SUB transport.
//!
//! Uses the pure Rust `zeromq` implementation (no libzmq). The publisher binds
//! on all interfaces; subscribers connect to a host and subscribe to every topic.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};
use zeromq::{PubSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use super::{FramePublisher, FrameSubscriber, PollOutcome};
use crate::error::{AppResult, DaqError};

/// Publishing end, bound to `tcp://0.0.0.0:<port>`.
pub struct ZmqPublisher {
    socket: PubSocket,
    endpoint: String,
}

impl ZmqPublisher {
    /// Bind a PUB socket on all interfaces.
    pub async fn bind(port: u16) -> AppResult<Self> {
        let endpoint = format!("tcp://0.0.0.0:{port}");
        let mut socket = PubSocket::new();
        socket
            .bind(&endpoint)
            .await
            .map_err(|e| DaqError::Transport(format!("ZMQ PUB bind to {endpoint} failed: {e}")))?;
        info!(%endpoint, "ZMQ PUB socket bound");
        Ok(Self { socket, endpoint })
    }
}

#[async_trait]
impl FramePublisher for ZmqPublisher {
    async fn publish(&mut self, payload: &str) -> AppResult<()> {
        self.socket
            .send(ZmqMessage::from(payload.to_string()))
            .await
            .map_err(|e| DaqError::Transport(format!("ZMQ publish failed: {e}")))
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

/// Subscribing end, connected to `tcp://<host>:<port>` with an empty topic filter.
pub struct ZmqSubscriber {
    socket: SubSocket,
    endpoint: String,
}

impl ZmqSubscriber {
    /// Connect and subscribe to all frames.
    pub async fn connect(host: &str, port: u16) -> AppResult<Self> {
        let endpoint = format!("tcp://{host}:{port}");
        let mut socket = SubSocket::new();
        socket
            .connect(&endpoint)
            .await
            .map_err(|e| DaqError::Transport(format!("ZMQ SUB connect to {endpoint} failed: {e}")))?;
        socket
            .subscribe("")
            .await
            .map_err(|e| DaqError::Transport(format!("ZMQ subscribe error: {e}")))?;
        info!(%endpoint, "ZMQ SUB socket connected");
        Ok(Self { socket, endpoint })
    }
}

#[async_trait]
impl FrameSubscriber for ZmqSubscriber {
    async fn recv_timeout(&mut self, timeout: Duration) -> AppResult<PollOutcome> {
        let msg = match tokio::time::timeout(timeout, self.socket.recv()).await {
            Err(_) => return Ok(PollOutcome::Timeout),
            Ok(Err(e)) => return Err(DaqError::Transport(format!("ZMQ receive error: {e}"))),
            Ok(Ok(msg)) => msg,
        };

        // ZMQ message is Vec<Bytes>; frames are single-part
        let parts = msg.into_vec();
        let Some(data) = parts.first() else {
            debug!("empty multipart message");
            return Ok(PollOutcome::Frame(String::new()));
        };
        let text = String::from_utf8(data.to_vec())
            .map_err(|e| DaqError::Frame(format!("frame is not UTF-8: {e}")))?;
        Ok(PollOutcome::Frame(text))
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

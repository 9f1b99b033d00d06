//! SCPI frequency counter driver.
//!
//! The counter is reached over a raw LXI socket (port 5025): every command is a
//! newline-terminated line, and queries answer with one line. Readings come back
//! from `R?` as an IEEE-488.2 block holding the comma-separated values that
//! accumulated since the previous read.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use super::BatchSource;
use crate::config::InstrumentConfig;
use crate::error::{AppResult, DaqError};
use crate::measurement::MeasurementMode;
use crate::transport::frame::{decode_values, is_no_data};

/// Trait for SCPI communication transports.
///
/// Abstracts the underlying communication mechanism so the counter logic can
/// be exercised against a scripted transport.
#[async_trait]
pub trait ScpiTransport: Send {
    /// Send a query command and return the response line.
    async fn query(&mut self, command: &str) -> AppResult<String>;

    /// Send a command without expecting a response.
    async fn command(&mut self, command: &str) -> AppResult<()>;
}

/// Raw-socket SCPI transport over TCP.
pub struct TcpScpiTransport {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    timeout: Duration,
    address: String,
}

impl TcpScpiTransport {
    /// Open the instrument socket.
    pub async fn connect(ip: &str, port: u16, io_timeout: Duration) -> AppResult<Self> {
        let address = format!("{ip}:{port}");
        let stream = timeout(io_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| DaqError::Connect(format!("connect to {address} timed out")))?
            .map_err(|e| DaqError::Connect(format!("connect to {address} failed: {e}")))?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        info!(%address, "SCPI socket open");
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            timeout: io_timeout,
            address,
        })
    }

    /// Socket address of the instrument.
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl ScpiTransport for TcpScpiTransport {
    async fn query(&mut self, command: &str) -> AppResult<String> {
        self.command(command).await?;
        let mut line = String::new();
        let read = timeout(self.timeout, self.reader.read_line(&mut line))
            .await
            .map_err(|_| DaqError::Instrument(format!("'{command}' timed out")))??;
        if read == 0 {
            return Err(DaqError::Instrument(format!(
                "connection to {} closed",
                self.address
            )));
        }
        Ok(line)
    }

    async fn command(&mut self, command: &str) -> AppResult<()> {
        let line = format!("{command}\n");
        timeout(self.timeout, self.writer.write_all(line.as_bytes()))
            .await
            .map_err(|_| DaqError::Instrument(format!("'{command}' write timed out")))??;
        Ok(())
    }
}

/// Frequency counter driven over SCPI.
pub struct ScpiCounter<T: ScpiTransport> {
    transport: T,
    mode: MeasurementMode,
    gate_time: f64,
}

impl ScpiCounter<TcpScpiTransport> {
    /// Open the socket described by the instrument configuration.
    pub async fn open(config: &InstrumentConfig) -> AppResult<Self> {
        let transport =
            TcpScpiTransport::connect(&config.ip, config.scpi_port, config.io_timeout()).await?;
        Ok(Self::new(transport, config.mode, config.gate_time))
    }
}

impl<T: ScpiTransport> ScpiCounter<T> {
    /// Wrap an already-open transport.
    pub fn new(transport: T, mode: MeasurementMode, gate_time: f64) -> Self {
        Self {
            transport,
            mode,
            gate_time,
        }
    }

    /// Commands sent by [`BatchSource::connect`], in order.
    pub fn setup_commands(&self) -> Vec<String> {
        vec![
            "*RST".to_string(),
            format!("SENS:FREQ:MODE {};", self.mode.token()),
            format!("SENS:FREQ:GATE:TIME {};", self.gate_time),
            "SAMP:COUN MAX".to_string(),
        ]
    }
}

#[async_trait]
impl<T: ScpiTransport> BatchSource for ScpiCounter<T> {
    async fn connect(&mut self) -> AppResult<()> {
        for command in self.setup_commands() {
            self.transport
                .command(&command)
                .await
                .map_err(|e| DaqError::Connect(format!("'{command}' failed: {e}")))?;
        }
        info!(mode = %self.mode, gate_time = self.gate_time, "counter configured");
        Ok(())
    }

    async fn start_acquisition(&mut self) -> AppResult<()> {
        self.transport.command("INIT").await?;
        // Let the sample buffer fill before the first read
        sleep(Duration::from_secs_f64(self.gate_time)).await;
        Ok(())
    }

    async fn acquire_batch(&mut self) -> AppResult<Option<Vec<f64>>> {
        let reply = self.transport.query("R?").await?;
        if is_no_data(&reply) {
            debug!("counter buffer empty");
            return Ok(None);
        }
        decode_values(&reply).map(Some)
    }

    fn describe(&self) -> String {
        format!("SCPI counter ({} mode, {} s gate)", self.mode, self.gate_time)
    }
}

//! Ingestion of published frames into the session's [`Series`].
//!
//! Counter frames carry values only. Timestamps are reconstructed from the
//! gate time: the first batch after a (re)connect starts at `t = 0`, every
//! later batch continues from the last timestamp in steps of `gate_time`.

use std::ops::Range;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::AppResult;
use crate::measurement::Series;
use crate::transport::frame::{decode_values, is_no_data};
use crate::transport::{FrameSubscriber, PollOutcome};

/// Result of one ingestion step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Nothing arrived within the poll bound.
    Timeout,
    /// The frame was the counter's "no data" reply; nothing changed.
    NoData,
    /// These indices of the series were appended.
    Appended(Range<usize>),
}

/// Owns the subscriber and the series it feeds.
pub struct Consumer<S> {
    subscriber: S,
    series: Series,
    gate_time: f64,
    poll_timeout: Duration,
    frames: u64,
}

impl<S: FrameSubscriber> Consumer<S> {
    /// New consumer with an empty series.
    pub fn new(subscriber: S, gate_time: f64, poll_timeout: Duration) -> Self {
        Self {
            subscriber,
            series: Series::new(),
            gate_time,
            poll_timeout,
            frames: 0,
        }
    }

    /// One bounded receive followed by ingestion of whatever arrived.
    pub async fn poll(&mut self) -> AppResult<IngestOutcome> {
        match self.subscriber.recv_timeout(self.poll_timeout).await? {
            PollOutcome::Timeout => {
                trace!("poll timed out");
                Ok(IngestOutcome::Timeout)
            }
            PollOutcome::Frame(text) => self.ingest_frame(&text),
        }
    }

    /// Decode `text` and append its samples with reconstructed timestamps.
    ///
    /// A frame that fails to decode leaves the series untouched.
    pub fn ingest_frame(&mut self, text: &str) -> AppResult<IngestOutcome> {
        if is_no_data(text) {
            debug!("no-data frame ignored");
            return Ok(IngestOutcome::NoData);
        }
        let values = decode_values(text)?;
        let range = self.series.append_batch(&values, self.gate_time);
        self.frames += 1;
        debug!(
            samples = values.len(),
            total = self.series.len(),
            last_t = ?self.series.last_time(),
            "frame ingested"
        );
        Ok(IngestOutcome::Appended(range))
    }

    /// The accumulated series.
    pub fn series(&self) -> &Series {
        &self.series
    }

    /// Gate time used for timestamp reconstruction.
    pub fn gate_time(&self) -> f64 {
        self.gate_time
    }

    /// Change the timestamp spacing for frames ingested from now on.
    pub fn set_gate_time(&mut self, gate_time: f64) {
        self.gate_time = gate_time;
    }

    /// Frames ingested so far.
    pub fn frames_ingested(&self) -> u64 {
        self.frames
    }

    /// Endpoint of the underlying subscriber.
    pub fn endpoint(&self) -> String {
        self.subscriber.endpoint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DaqError;
    use crate::transport::frame::encode_values;
    use crate::transport::{FramePublisher, LocalBus};

    fn consumer(gate_time: f64) -> (LocalBus, Consumer<crate::transport::LocalSubscriber>) {
        let bus = LocalBus::default();
        let consumer = Consumer::new(bus.subscribe(), gate_time, Duration::from_millis(20));
        (bus, consumer)
    }

    #[test]
    fn timestamps_continue_across_frames() {
        let (_bus, mut c) = consumer(0.5);
        let first = c.ingest_frame(&encode_values(&[1.0, 2.0])).unwrap();
        assert_eq!(first, IngestOutcome::Appended(0..2));
        let second = c.ingest_frame(&encode_values(&[3.0, 4.0, 5.0])).unwrap();
        assert_eq!(second, IngestOutcome::Appended(2..5));
        assert_eq!(c.series().times(), &[0.0, 0.5, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn no_data_twice_changes_nothing() {
        let (_bus, mut c) = consumer(1.0);
        c.ingest_frame("+1.0e+00\n").unwrap();
        let before = c.series().clone();
        assert_eq!(c.ingest_frame("#10").unwrap(), IngestOutcome::NoData);
        assert_eq!(c.ingest_frame("#10").unwrap(), IngestOutcome::NoData);
        assert_eq!(c.series(), &before);
        assert_eq!(c.frames_ingested(), 1);
    }

    #[test]
    fn bad_frame_leaves_series_untouched() {
        let (_bus, mut c) = consumer(1.0);
        c.ingest_frame("+1.0e+00,+2.0e+00\n").unwrap();
        assert!(matches!(
            c.ingest_frame("+3.0e+00,bogus\n"),
            Err(DaqError::Frame(_))
        ));
        assert_eq!(c.series().len(), 2);
    }

    #[test]
    fn gate_change_applies_to_later_frames() {
        let (_bus, mut c) = consumer(1.0);
        c.ingest_frame("+1.0e+00,+2.0e+00\n").unwrap();
        c.set_gate_time(0.5);
        c.ingest_frame("+3.0e+00,+4.0e+00\n").unwrap();
        assert_eq!(c.series().times(), &[0.0, 1.0, 1.5, 2.0]);
    }

    #[tokio::test]
    async fn poll_reports_timeout_then_frame() {
        let (bus, mut c) = consumer(1.0);
        assert_eq!(c.poll().await.unwrap(), IngestOutcome::Timeout);

        let mut publisher = bus.publisher();
        publisher.publish(&encode_values(&[7.0, 8.0, 9.0])).await.unwrap();
        assert_eq!(c.poll().await.unwrap(), IngestOutcome::Appended(0..3));
        assert_eq!(c.series().frequencies(), &[7.0, 8.0, 9.0]);
    }
}

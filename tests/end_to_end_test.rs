//! Producer and consumer session wired together in one process.

use counter_daq::consumer::Consumer;
use counter_daq::instrument::{MockScpiTransport, ScpiCounter, VirtualCounter};
use counter_daq::measurement::MeasurementMode;
use counter_daq::producer::{Producer, ProducerState};
use counter_daq::session::{Session, SessionCommand, SessionEvent, SessionSettings};
use counter_daq::storage::{read_table, SeriesLogger};
use counter_daq::transport::LocalBus;
use std::time::Duration;
use tokio::sync::mpsc;

fn settings(gate_time: f64, time_between_reads: f64) -> SessionSettings {
    SessionSettings {
        mode: MeasurementMode::Reciprocal,
        gate_time,
        ingest_interval: Duration::from_secs_f64(0.95 * time_between_reads),
        update_interval: Duration::from_secs(10),
        detrend: true,
        f0: 79.86e6,
        psd_averaging: 4,
        record_length: 5,
    }
}

#[tokio::test(start_paused = true)]
async fn test_virtual_counter_feeds_all_pipelines() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let bus = LocalBus::default();

    // Subscribe before the producer starts so no frame is missed.
    let consumer = Consumer::new(bus.subscribe(), 1.0, Duration::from_secs(1));
    let mut session = Session::new(
        consumer,
        SeriesLogger::new(dir.path(), "ks"),
        settings(1.0, 3.0),
    );
    let mut events = session.subscribe_events();

    let source = VirtualCounter::builder()
        .gate_time(1.0)
        .time_between_reads(3.0)
        .seed(42)
        .build();
    let mut producer = Producer::new(source, bus.publisher(), Duration::from_secs(3));
    producer.connect().await.expect("Virtual connect cannot fail");
    let handle = producer.spawn().expect("Producer spawns from Connected");
    assert_eq!(handle.state(), ProducerState::Streaming);

    let (tx, rx) = mpsc::channel(8);
    for command in [
        SessionCommand::EnableAllan,
        SessionCommand::EnablePsd,
        SessionCommand::EnableLogging,
    ] {
        tx.send(command).await.expect("Session is listening");
    }
    let task = tokio::spawn(async move {
        session.run(rx).await.expect("Session run failed");
        session
    });

    let mut allan_seen = false;
    let mut psd_seen = false;
    let mut log_path = None;
    while !(allan_seen && psd_seen && log_path.is_some()) {
        match events.recv().await.expect("Session alive") {
            SessionEvent::AllanUpdated(result) => {
                assert!(!result.points.is_empty());
                assert!(result.trend_per_second.is_some(), "detrend is on");
                allan_seen = true;
            }
            SessionEvent::PsdUpdated(result) => {
                assert_eq!(result.averaging, 4);
                assert!(result.power.iter().all(|p| p.is_finite()));
                psd_seen = true;
            }
            SessionEvent::LoggingStarted { path } => log_path = Some(path),
            _ => {}
        }
    }

    tx.send(SessionCommand::Shutdown)
        .await
        .expect("Session is listening");
    let session = task.await.expect("Session task panicked");
    let stats = handle.shutdown().await.expect("Producer joins");

    let series = session.series();
    assert!(series.len() >= 3);
    assert!(stats.samples_published >= series.len() as u64);
    for pair in series.times().windows(2) {
        assert_eq!(pair[1] - pair[0], 1.0);
    }
    assert_eq!(series.times()[0], 0.0);
    assert!(series
        .frequencies()
        .iter()
        .all(|f| (f - 79.86e6).abs() < 1_000.0));
    assert_eq!(session.window_view().len(), series.len().min(5));

    let (t, f) = read_table(&log_path.expect("logging started")).expect("log parses");
    assert_eq!(t.len(), f.len());
    assert!(!t.is_empty());
    assert!(t.len() <= series.len());
    assert!(!session.logger().is_enabled(), "shutdown closes the log");
}

#[tokio::test(start_paused = true)]
async fn test_scpi_counter_stream_with_no_data_replies() {
    let mock = MockScpiTransport::new()
        .with_response("#10\n")
        .with_response("#231+7.98600010E+07,+7.98599990E+07\n")
        .with_response("#10\n")
        .with_response("#215+7.98600020E+07\n");
    let bus = LocalBus::default();
    let consumer = Consumer::new(bus.subscribe(), 0.5, Duration::from_secs(1));
    let mut session = Session::new(
        consumer,
        SeriesLogger::new(std::env::temp_dir(), "unused"),
        settings(0.5, 1.0),
    );
    let mut events = session.subscribe_events();

    let mut producer = Producer::new(
        ScpiCounter::new(mock.clone(), MeasurementMode::Continuous, 0.5),
        bus.publisher(),
        Duration::from_secs(1),
    );
    producer.connect().await.expect("Mock connect succeeds");
    assert_eq!(
        &mock.call_log()[..4],
        &[
            "*RST".to_string(),
            "SENS:FREQ:MODE CONT;".to_string(),
            "SENS:FREQ:GATE:TIME 0.5;".to_string(),
            "SAMP:COUN MAX".to_string(),
        ]
    );
    let handle = producer.spawn().expect("Producer spawns from Connected");

    let (tx, rx) = mpsc::channel(4);
    let task = tokio::spawn(async move {
        session.run(rx).await.expect("Session run failed");
        session
    });

    loop {
        if let SessionEvent::SeriesExtended { total: 3, .. } =
            events.recv().await.expect("Session alive")
        {
            break;
        }
    }

    tx.send(SessionCommand::Shutdown)
        .await
        .expect("Session is listening");
    let session = task.await.expect("Session task panicked");
    handle.shutdown().await.expect("Producer joins");

    assert_eq!(session.series().times(), &[0.0, 0.5, 1.0]);
    assert_eq!(
        session.series().frequencies(),
        &[7.98600010e7, 7.98599990e7, 7.98600020e7]
    );
}

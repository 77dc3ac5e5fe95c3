use std::thread;
use std::time::{Duration, Instant};

use spectrum_link::{CaptureEvent, LinkError, StreamState, StreamingController};
pub mod common;
use common::*;

fn controller(
    journal: &Journal,
) -> (
    StreamingController<StubSink, StubCapture>,
    StubSink,
    StubCapture,
) {
    let sink = StubSink::new(journal);
    let capture = StubCapture::new(journal);
    let controller =
        StreamingController::new(test_config(), sink.clone(), capture.clone()).unwrap();
    (controller, sink, capture)
}

#[test]
fn test_start_opens_sink_before_capture() {
    let journal = Journal::default();
    let (mut controller, _sink, capture) = controller(&journal);
    assert_eq!(controller.state(), StreamState::Uninitialized);

    controller.start().unwrap();

    assert_eq!(controller.state(), StreamState::Streaming);
    assert_eq!(journal.entries(), vec!["sink opened", "capture opened"]);

    let params = capture.opened_with.lock().clone().unwrap();
    assert_eq!(params.sample_rate, 8000);
    assert_eq!(params.channels, 1);
    assert_eq!(params.block_size, 256);
}

#[test]
fn test_each_block_becomes_one_frame_of_band_count_bytes() {
    let journal = Journal::default();
    let (mut controller, sink, capture) = controller(&journal);
    controller.start().unwrap();

    assert!(capture.deliver(&sine_block(1000.0)));
    assert!(capture.deliver(&vec![0.0; 256]));

    let frames = sink.frames();
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|f| f.len() == 32));
    // 1 kHz lands in bin 32, the first bin of band 8
    assert!(frames[0][8] > 0);
    assert_eq!(frames[1], vec![0u8; 32]);
}

#[test]
fn test_write_failure_does_not_stop_stream() {
    let journal = Journal::default();
    let (mut controller, sink, capture) = controller(&journal);
    controller.start().unwrap();

    sink.fail_next_writes(1);
    capture.deliver(&sine_block(500.0));
    assert!(controller.poll(Duration::from_millis(5)));
    assert_eq!(controller.state(), StreamState::Streaming);

    capture.deliver(&sine_block(500.0));
    assert_eq!(sink.frames().len(), 1);

    let stats = controller.stats();
    assert_eq!(stats.blocks, 2);
    assert_eq!(stats.write_errors, 1);
    assert_eq!(stats.frames_sent, 1);

    controller.stop_handle().stop();
    assert!(controller.shutdown().is_ok());
}

#[test]
fn test_stop_closes_capture_before_sink() {
    let journal = Journal::default();
    let (mut controller, _sink, capture) = controller(&journal);
    controller.start().unwrap();
    capture.deliver(&sine_block(2000.0));

    controller.stop_handle().stop();
    assert!(!controller.poll(Duration::from_millis(5)));

    let summary = controller.shutdown().unwrap();
    assert_eq!(controller.state(), StreamState::Closed);
    assert_eq!(summary.stats.frames_sent, 1);
    assert_eq!(
        journal.entries(),
        vec!["sink opened", "capture opened", "capture closed", "sink closed"]
    );
    assert!(!capture.deliver(&sine_block(2000.0)));
}

#[test]
fn test_run_returns_cleanly_on_stop_signal() {
    let journal = Journal::default();
    let (mut controller, _sink, _capture) = controller(&journal);
    let stop = controller.stop_handle();

    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        stop.stop();
    });

    let summary = controller.run();
    stopper.join().unwrap();

    assert!(summary.is_ok());
    assert_eq!(controller.state(), StreamState::Closed);
    assert_eq!(
        journal.entries(),
        vec!["sink opened", "capture opened", "capture closed", "sink closed"]
    );
}

#[test]
fn test_sink_open_failure_never_opens_capture() {
    let journal = Journal::default();
    let mut sink = StubSink::new(&journal);
    sink.fail_open = true;
    let mut controller =
        StreamingController::new(test_config(), sink, StubCapture::new(&journal)).unwrap();

    let err = controller.run().unwrap_err();

    assert!(matches!(err, LinkError::Connection { .. }));
    assert_eq!(controller.state(), StreamState::Failed);
    assert!(journal.entries().is_empty());
}

#[test]
fn test_capture_open_failure_releases_connection() {
    let journal = Journal::default();
    let mut capture = StubCapture::new(&journal);
    capture.fail_open = true;
    let mut controller =
        StreamingController::new(test_config(), StubSink::new(&journal), capture).unwrap();

    let err = controller.start().unwrap_err();

    assert!(matches!(err, LinkError::Device(_)));
    assert_eq!(err.exit_code(), 3);
    assert_eq!(controller.state(), StreamState::Failed);
    assert_eq!(journal.entries(), vec!["sink opened", "sink closed"]);
}

#[test]
fn test_device_failure_mid_stream_shuts_down_in_order() {
    let journal = Journal::default();
    let (mut controller, _sink, capture) = controller(&journal);
    controller.start().unwrap();

    capture.emit(CaptureEvent::Fatal("input device no longer available".into()));
    assert!(!controller.poll(Duration::from_millis(100)));

    let err = controller.shutdown().unwrap_err();
    assert!(matches!(err, LinkError::Device(_)));
    assert_eq!(controller.state(), StreamState::Closed);
    assert_eq!(
        journal.entries(),
        vec!["sink opened", "capture opened", "capture closed", "sink closed"]
    );
}

#[test]
fn test_capture_warning_is_not_fatal() {
    let journal = Journal::default();
    let (mut controller, _sink, capture) = controller(&journal);
    controller.start().unwrap();

    capture.emit(CaptureEvent::Warning("input overflow".into()));
    assert!(controller.poll(Duration::from_millis(100)));
    assert_eq!(controller.state(), StreamState::Streaming);
    assert_eq!(controller.stats().capture_warnings, 1);

    controller.stop_handle().stop();
    assert!(controller.shutdown().is_ok());
}

#[test]
fn test_invalid_configuration_opens_nothing() {
    let journal = Journal::default();
    let mut config = test_config();
    config.block_size = 16;
    config.band_count = 9;

    let result = StreamingController::new(
        config,
        StubSink::new(&journal),
        StubCapture::new(&journal),
    );

    assert!(matches!(result, Err(LinkError::InvalidConfiguration(_))));
    assert!(journal.entries().is_empty());
}

#[test]
fn test_settle_delay_precedes_capture() {
    let journal = Journal::default();
    let mut sink = StubSink::new(&journal);
    sink.settle_delay = Duration::from_millis(40);
    let mut controller =
        StreamingController::new(test_config(), sink, StubCapture::new(&journal)).unwrap();

    let started = Instant::now();
    controller.start().unwrap();

    assert!(started.elapsed() >= Duration::from_millis(40));
    assert_eq!(controller.state(), StreamState::Streaming);
}

#[test]
fn test_stop_during_settle_never_opens_capture() {
    let journal = Journal::default();
    let mut sink = StubSink::new(&journal);
    sink.settle_delay = Duration::from_secs(5);
    let mut controller =
        StreamingController::new(test_config(), sink, StubCapture::new(&journal)).unwrap();
    let stop = controller.stop_handle();

    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        stop.stop();
    });

    let started = Instant::now();
    let summary = controller.run();
    stopper.join().unwrap();

    assert!(summary.is_ok());
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(controller.state(), StreamState::Closed);
    assert_eq!(journal.entries(), vec!["sink opened", "sink closed"]);
}

#[test]
fn test_dropping_a_live_controller_releases_everything() {
    let journal = Journal::default();
    {
        let (mut controller, _sink, _capture) = controller(&journal);
        controller.start().unwrap();
    }
    assert_eq!(
        journal.entries(),
        vec!["sink opened", "capture opened", "capture closed", "sink closed"]
    );
}

#[test]
fn test_start_twice_is_rejected() {
    let journal = Journal::default();
    let (mut controller, _sink, _capture) = controller(&journal);
    controller.start().unwrap();
    assert!(controller.start().is_err());
    assert_eq!(controller.state(), StreamState::Streaming);
}

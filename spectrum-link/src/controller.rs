//! Streaming controller.
//!
//! Owns the serial connection and the capture stream for one run and walks
//! them through `Uninitialized -> Connecting -> Streaming -> ShuttingDown ->
//! Closed`. Startup failures land in `Failed` after releasing whatever was
//! already acquired.
//!
//! The per-block work happens on the capture thread (see
//! [`crate::pipeline::block_handler`]). The main thread only waits for the
//! stop signal or a fatal capture event, and logs throughput.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::capture::{CaptureDevice, CaptureEvent, CaptureParams, CaptureStream};
use crate::config::StreamConfig;
use crate::error::{LinkError, Result};
use crate::pipeline::{block_handler, BlockPipeline};
use crate::sink::{Connection, OutputSink};
use crate::stats::{StatsSnapshot, StreamStats, ThroughputMeter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Uninitialized,
    Connecting,
    Streaming,
    ShuttingDown,
    Closed,
    Failed,
}

/// Cooperative stop flag shared with the capture thread and signal handlers.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What a finished run did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSummary {
    pub stats: StatsSnapshot,
    pub streamed_for: Duration,
}

pub struct StreamingController<S: OutputSink, D: CaptureDevice> {
    config: StreamConfig,
    sink: S,
    capture: D,
    state: StreamState,
    stop: StopHandle,
    stats: Arc<StreamStats>,
    pipeline: Option<BlockPipeline>,
    connection: Option<Arc<Mutex<S::Connection>>>,
    stream: Option<D::Stream>,
    events: Option<Receiver<CaptureEvent>>,
    fault: Option<String>,
    meter: ThroughputMeter,
    started_at: Option<Instant>,
}

impl<S: OutputSink, D: CaptureDevice> StreamingController<S, D> {
    /// Validate the configuration and prepare the pipeline.
    ///
    /// Nothing is opened yet, so an invalid shape never leaks a handle.
    pub fn new(config: StreamConfig, sink: S, capture: D) -> Result<Self> {
        let pipeline = BlockPipeline::new(&config)?;
        let meter = ThroughputMeter::new(config.stats_interval, config.band_count, Instant::now());

        Ok(Self {
            config,
            sink,
            capture,
            state: StreamState::Uninitialized,
            stop: StopHandle::new(),
            stats: Arc::new(StreamStats::new()),
            pipeline: Some(pipeline),
            connection: None,
            stream: None,
            events: None,
            fault: None,
            meter,
            started_at: None,
        })
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Open the connection, wait for the device to settle, then start capture.
    ///
    /// A stop during the settle wait closes the connection and leaves the
    /// controller `Closed` without touching the capture device.
    pub fn start(&mut self) -> Result<()> {
        if self.state != StreamState::Uninitialized {
            return Err(LinkError::InvalidConfiguration(format!(
                "cannot start a stream in state {:?}",
                self.state
            )));
        }
        let Some(pipeline) = self.pipeline.take() else {
            return Err(LinkError::InvalidConfiguration(
                "pipeline already consumed".to_string(),
            ));
        };

        self.state = StreamState::Connecting;
        info!(
            "Pipeline: {} samples @ {} Hz -> {} bands ({} bins each, {} dropped), {:?} per block",
            self.config.block_size,
            self.config.sample_rate,
            pipeline.band_count(),
            pipeline.bins_per_band(),
            pipeline.dropped_bins(),
            self.config.block_budget()
        );

        let connection = match self.sink.open(&self.config.port, self.config.baud_rate) {
            Ok(connection) => connection,
            Err(e) => {
                error!("Error connecting to {}: {}", self.config.port, e);
                self.state = StreamState::Failed;
                return Err(e);
            }
        };
        let connection = Arc::new(Mutex::new(connection));

        self.wait_for_settle();
        if self.stop.is_stopped() {
            info!("Stopped before streaming started.");
            close_connection(&connection);
            self.state = StreamState::Closed;
            return Ok(());
        }

        let (events_tx, events_rx) = mpsc::channel();
        let handler = block_handler(
            pipeline,
            connection.clone(),
            self.stats.clone(),
            self.stop.clone(),
        );
        let params = CaptureParams::from_config(&self.config);

        let stream = match self.capture.open(&params, handler, events_tx) {
            Ok(stream) => stream,
            Err(e) => {
                error!("Error starting audio stream: {}", e);
                close_connection(&connection);
                self.state = StreamState::Failed;
                return Err(e);
            }
        };

        self.connection = Some(connection);
        self.stream = Some(stream);
        self.events = Some(events_rx);
        self.started_at = Some(Instant::now());
        self.meter = ThroughputMeter::new(
            self.config.stats_interval,
            self.config.band_count,
            Instant::now(),
        );
        self.state = StreamState::Streaming;
        info!("Streaming audio... Press Ctrl+C to stop.");
        Ok(())
    }

    fn wait_for_settle(&self) {
        let delay = self.sink.settle_delay();
        if delay.is_zero() {
            return;
        }
        debug!("Waiting {:?} for the remote device to initialize", delay);

        let deadline = Instant::now() + delay;
        loop {
            let now = Instant::now();
            if now >= deadline || self.stop.is_stopped() {
                break;
            }
            thread::sleep((deadline - now).min(self.config.poll_interval));
        }
    }

    /// Wait up to `timeout` for capture events. Returns `false` once the
    /// stream should shut down.
    pub fn poll(&mut self, timeout: Duration) -> bool {
        if self.state != StreamState::Streaming || self.stop.is_stopped() {
            return false;
        }

        match self.events.as_ref().map(|rx| rx.recv_timeout(timeout)) {
            Some(Ok(CaptureEvent::Warning(msg))) => {
                self.stats.record_capture_warning();
                warn!("Capture status: {}", msg);
            }
            Some(Ok(CaptureEvent::Fatal(msg))) => {
                error!("Capture device failed: {}", msg);
                self.fault = Some(msg);
                return false;
            }
            Some(Err(RecvTimeoutError::Timeout)) => {}
            Some(Err(RecvTimeoutError::Disconnected)) | None => thread::sleep(timeout),
        }

        if let Some(report) = self.meter.tick(Instant::now(), self.stats.snapshot()) {
            info!(
                "Sent {} frames ({} bytes), {:.1} frames/s, {} write errors, {} dropped",
                report.window.frames_sent,
                report.bytes_sent,
                report.frames_per_sec,
                report.window.write_errors,
                report.window.dropped_frames
            );
        }

        !self.stop.is_stopped()
    }

    /// Stop capture, then release the connection.
    ///
    /// Close errors are logged, not returned. Returns the device error if the
    /// stream ended because the capture device failed.
    pub fn shutdown(&mut self) -> Result<StreamSummary> {
        if self.state == StreamState::Uninitialized {
            self.state = StreamState::Closed;
        }

        if matches!(
            self.state,
            StreamState::Streaming | StreamState::ShuttingDown
        ) {
            self.state = StreamState::ShuttingDown;
            self.stop.stop();

            if let Some(mut stream) = self.stream.take() {
                match stream.close() {
                    Ok(()) => info!("Audio stream stopped."),
                    Err(e) => warn!("Error closing audio stream: {}", e),
                }
            }
            if let Some(connection) = self.connection.take() {
                close_connection(&connection);
            }
            self.events = None;
            self.state = StreamState::Closed;
        }

        let summary = self.summary();
        info!(
            "Streamed {:.1}s: {} blocks, {} frames sent, {} write errors, {} dropped, {} capture warnings",
            summary.streamed_for.as_secs_f64(),
            summary.stats.blocks,
            summary.stats.frames_sent,
            summary.stats.write_errors,
            summary.stats.dropped_frames,
            summary.stats.capture_warnings
        );

        match self.fault.take() {
            Some(reason) => Err(LinkError::Device(reason)),
            None => Ok(summary),
        }
    }

    /// Start, stream until stopped or the device fails, then shut down.
    pub fn run(&mut self) -> Result<StreamSummary> {
        self.start()?;
        let poll_interval = self.config.poll_interval;
        while self.poll(poll_interval) {}
        self.shutdown()
    }

    fn summary(&self) -> StreamSummary {
        StreamSummary {
            stats: self.stats.snapshot(),
            streamed_for: self
                .started_at
                .map(|t| t.elapsed())
                .unwrap_or_default(),
        }
    }
}

impl<S: OutputSink, D: CaptureDevice> Drop for StreamingController<S, D> {
    fn drop(&mut self) {
        if matches!(
            self.state,
            StreamState::Streaming | StreamState::ShuttingDown
        ) {
            let _ = self.shutdown();
        }
    }
}

fn close_connection<C: Connection>(connection: &Mutex<C>) {
    let mut conn = connection.lock();
    if !conn.is_open() {
        return;
    }
    match conn.close() {
        Ok(()) => info!("Serial connection closed."),
        Err(e) => warn!("Error closing serial connection: {}", e),
    }
}

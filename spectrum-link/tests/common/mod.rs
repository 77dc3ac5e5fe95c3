use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use spectrum_link::{
    BlockHandler, CaptureDevice, CaptureEvent, CaptureParams, CaptureStream, Connection,
    LinkError, OutputSink, Result, StreamConfig,
};

/// Ordered record of lifecycle calls across all stubs.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<&'static str>>>);

impl Journal {
    pub fn record(&self, entry: &'static str) {
        self.0.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<&'static str> {
        self.0.lock().clone()
    }
}

pub fn test_config() -> StreamConfig {
    let mut config = StreamConfig::new("stub0");
    config.poll_interval = Duration::from_millis(10);
    config.stats_interval = Duration::ZERO;
    config
}

#[derive(Clone, Default)]
pub struct StubSink {
    pub journal: Journal,
    pub frames: Arc<Mutex<Vec<Vec<u8>>>>,
    pub failing_writes: Arc<AtomicUsize>,
    pub fail_open: bool,
    pub settle_delay: Duration,
}

impl StubSink {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            ..Default::default()
        }
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().clone()
    }
}

pub struct StubConnection {
    journal: Journal,
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    failing_writes: Arc<AtomicUsize>,
    open: bool,
}

impl Connection for StubConnection {
    fn write(&mut self, frame: &[u8]) -> Result<()> {
        if !self.open {
            return Err(LinkError::Write("closed".into()));
        }
        if self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(LinkError::Write("device unplugged".into()));
        }
        self.frames.lock().push(frame.to_vec());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.journal.record("sink closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl OutputSink for StubSink {
    type Connection = StubConnection;

    fn open(&self, port: &str, _baud_rate: u32) -> Result<StubConnection> {
        if self.fail_open {
            return Err(LinkError::connection(port, "no such port"));
        }
        self.journal.record("sink opened");
        Ok(StubConnection {
            journal: self.journal.clone(),
            frames: self.frames.clone(),
            failing_writes: self.failing_writes.clone(),
            open: true,
        })
    }

    fn settle_delay(&self) -> Duration {
        self.settle_delay
    }
}

/// Capture stub that lets the test play the backend's capture thread.
#[derive(Clone, Default)]
pub struct StubCapture {
    pub journal: Journal,
    pub handler: Arc<Mutex<Option<BlockHandler>>>,
    pub events: Arc<Mutex<Option<Sender<CaptureEvent>>>>,
    pub opened_with: Arc<Mutex<Option<CaptureParams>>>,
    pub fail_open: bool,
}

impl StubCapture {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            ..Default::default()
        }
    }

    /// Deliver one block as the capture thread would. Returns false once closed.
    pub fn deliver(&self, block: &[f32]) -> bool {
        match self.handler.lock().as_mut() {
            Some(handler) => {
                handler(block);
                true
            }
            None => false,
        }
    }

    pub fn emit(&self, event: CaptureEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            tx.send(event).unwrap();
        }
    }
}

pub struct StubStream {
    journal: Journal,
    handler: Arc<Mutex<Option<BlockHandler>>>,
    events: Arc<Mutex<Option<Sender<CaptureEvent>>>>,
}

impl CaptureStream for StubStream {
    fn close(&mut self) -> Result<()> {
        if self.handler.lock().take().is_some() {
            self.events.lock().take();
            self.journal.record("capture closed");
        }
        Ok(())
    }
}

impl CaptureDevice for StubCapture {
    type Stream = StubStream;

    fn open(
        &self,
        params: &CaptureParams,
        on_block: BlockHandler,
        events: Sender<CaptureEvent>,
    ) -> Result<StubStream> {
        if self.fail_open {
            return Err(LinkError::Device("no input device".into()));
        }
        self.journal.record("capture opened");
        *self.opened_with.lock() = Some(params.clone());
        *self.handler.lock() = Some(on_block);
        *self.events.lock() = Some(events);
        Ok(StubStream {
            journal: self.journal.clone(),
            handler: self.handler.clone(),
            events: self.events.clone(),
        })
    }
}

/// One block of a sine at `frequency` Hz for the default 8 kHz / 256 setup.
pub fn sine_block(frequency: f32) -> Vec<f32> {
    (0..256)
        .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / 8000.0).sin())
        .collect()
}

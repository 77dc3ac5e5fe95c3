use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters shared between the capture callback and the main thread.
#[derive(Debug, Default)]
pub struct StreamStats {
    blocks: AtomicU64,
    frames_sent: AtomicU64,
    write_errors: AtomicU64,
    dropped_frames: AtomicU64,
    capture_warnings: AtomicU64,
}

impl StreamStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_block(&self) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capture_warning(&self) {
        self.capture_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            blocks: self.blocks.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            capture_warnings: self.capture_warnings.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`StreamStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub blocks: u64,
    pub frames_sent: u64,
    pub write_errors: u64,
    pub dropped_frames: u64,
    pub capture_warnings: u64,
}

impl StatsSnapshot {
    /// Counter deltas between `earlier` and `self`.
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            blocks: self.blocks.saturating_sub(earlier.blocks),
            frames_sent: self.frames_sent.saturating_sub(earlier.frames_sent),
            write_errors: self.write_errors.saturating_sub(earlier.write_errors),
            dropped_frames: self.dropped_frames.saturating_sub(earlier.dropped_frames),
            capture_warnings: self.capture_warnings.saturating_sub(earlier.capture_warnings),
        }
    }
}

/// Frame throughput over one reporting window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub window: StatsSnapshot,
    pub frames_per_sec: f64,
    pub bytes_sent: u64,
}

/// Turns counter snapshots into periodic throughput reports.
#[derive(Debug)]
pub struct ThroughputMeter {
    interval: Duration,
    frame_len: usize,
    last: StatsSnapshot,
    last_at: Instant,
}

impl ThroughputMeter {
    pub fn new(interval: Duration, frame_len: usize, now: Instant) -> Self {
        Self {
            interval,
            frame_len,
            last: StatsSnapshot::default(),
            last_at: now,
        }
    }

    /// Returns a report once per interval, `None` in between or when disabled.
    pub fn tick(&mut self, now: Instant, current: StatsSnapshot) -> Option<Throughput> {
        if self.interval.is_zero() {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.last_at);
        if elapsed < self.interval {
            return None;
        }

        let window = current.since(&self.last);
        self.last = current;
        self.last_at = now;

        Some(Throughput {
            window,
            frames_per_sec: window.frames_sent as f64 / elapsed.as_secs_f64(),
            bytes_sent: window.frames_sent * self.frame_len as u64,
        })
    }
}

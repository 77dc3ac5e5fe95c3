use std::time::Duration;

use crate::error::{LinkError, Result};

// --- Audio Config ---
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 8_000;
pub const DEFAULT_BLOCK_SIZE: usize = 256; // Samples per FFT, one band frame per block
pub const DEFAULT_BAND_COUNT: usize = 32; // Bytes per frame on the wire

// --- Serial Config ---
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2); // Remote board resets on open
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(25);

// --- Task Timing ---
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Immutable parameters of one streaming run.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    pub band_count: usize,
    pub port: String,
    pub baud_rate: u32,
    /// Pause between opening the port and the first write.
    pub settle_delay: Duration,
    /// Upper bound for a single frame write.
    pub write_timeout: Duration,
    /// How often the main thread checks for stop and device events.
    pub poll_interval: Duration,
    /// How often throughput is logged. Zero disables periodic stats.
    pub stats_interval: Duration,
    /// Input device name, `None` for the host default.
    pub device: Option<String>,
}

impl StreamConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE_HZ,
            block_size: DEFAULT_BLOCK_SIZE,
            band_count: DEFAULT_BAND_COUNT,
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            settle_delay: DEFAULT_SETTLE_DELAY,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stats_interval: DEFAULT_STATS_INTERVAL,
            device: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Err(LinkError::InvalidConfiguration(reason.to_string()));

        if self.sample_rate == 0 {
            return invalid("sample rate must be positive");
        }
        if self.block_size == 0 {
            return invalid("block size must be positive");
        }
        if self.band_count == 0 {
            return invalid("band count must be positive");
        }
        if self.band_count > self.spectrum_len() {
            return invalid("band count exceeds spectrum resolution");
        }
        if self.baud_rate == 0 {
            return invalid("baud rate must be positive");
        }
        if self.port.trim().is_empty() {
            return invalid("serial port must be set");
        }
        if self.poll_interval.is_zero() {
            return invalid("poll interval must be positive");
        }
        Ok(())
    }

    /// Magnitude bins per block.
    pub fn spectrum_len(&self) -> usize {
        self.block_size / 2
    }

    /// Wall-clock time one block covers, the deadline for processing it.
    pub fn block_budget(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate.max(1) as f64)
    }
}

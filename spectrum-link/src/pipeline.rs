use std::sync::Arc;

use parking_lot::Mutex;
use spectrum_dsp::{BandMapper, DspError, SpectralTransform};
use tracing::{debug, info, warn};

use crate::capture::BlockHandler;
use crate::config::StreamConfig;
use crate::controller::StopHandle;
use crate::error::Result;
use crate::sink::Connection;
use crate::stats::StreamStats;

/// Log every Nth failure of a run of consecutive write failures.
const WRITE_FAILURE_LOG_EVERY: u64 = 100;

/// Transform and band mapping for one block, with all buffers preallocated.
pub struct BlockPipeline {
    transform: SpectralTransform,
    mapper: BandMapper,
    magnitude: Vec<f32>,
    bands: Vec<u8>,
}

impl BlockPipeline {
    pub fn new(config: &StreamConfig) -> Result<Self> {
        config.validate()?;
        let transform = SpectralTransform::new(config.block_size)?;
        let mapper = BandMapper::new(transform.spectrum_len(), config.band_count)?;

        Ok(Self {
            magnitude: vec![0.0; transform.spectrum_len()],
            bands: vec![0; mapper.band_count()],
            transform,
            mapper,
        })
    }

    /// Turn one sample block into the band frame to send.
    pub fn process(&mut self, block: &[f32]) -> std::result::Result<&[u8], DspError> {
        spectrum_dsp::process_block(
            &mut self.transform,
            &self.mapper,
            block,
            &mut self.magnitude,
            &mut self.bands,
        )?;
        Ok(&self.bands)
    }

    pub fn band_count(&self) -> usize {
        self.mapper.band_count()
    }

    pub fn bins_per_band(&self) -> usize {
        self.mapper.bins_per_band()
    }

    pub fn dropped_bins(&self) -> usize {
        self.mapper.dropped_bins()
    }
}

/// Build the per-block callback: transform, map, write, in that order.
///
/// A block that arrives after stop is abandoned. If the connection is busy
/// the frame is dropped rather than queued, so frames are never reordered.
/// Write failures are counted and logged but never end the stream.
pub fn block_handler<C: Connection>(
    mut pipeline: BlockPipeline,
    connection: Arc<Mutex<C>>,
    stats: Arc<StreamStats>,
    stop: StopHandle,
) -> BlockHandler {
    let mut consecutive_failures: u64 = 0;

    Box::new(move |block: &[f32]| {
        if stop.is_stopped() {
            return;
        }
        stats.record_block();

        let frame = match pipeline.process(block) {
            Ok(frame) => frame,
            Err(e) => {
                stats.record_dropped();
                debug!("Skipping block: {}", e);
                return;
            }
        };

        let Some(mut conn) = connection.try_lock() else {
            stats.record_dropped();
            return;
        };

        match conn.write(frame) {
            Ok(()) => {
                stats.record_sent();
                if consecutive_failures > 0 {
                    info!(
                        "Band frames flowing again after {} failed writes",
                        consecutive_failures
                    );
                    consecutive_failures = 0;
                }
            }
            Err(e) => {
                stats.record_write_error();
                consecutive_failures += 1;
                if consecutive_failures == 1
                    || consecutive_failures % WRITE_FAILURE_LOG_EVERY == 0
                {
                    warn!(
                        "Error sending band frame ({} in a row): {}",
                        consecutive_failures, e
                    );
                }
            }
        }
    })
}

//! Live audio spectrum to serial bridge.
//!
//! Captures mono audio in fixed blocks, turns each block into `band_count`
//! bytes with [`spectrum_dsp`], and writes them to a serial port for an LED
//! matrix controller to render.

pub mod capture;
pub mod config;
pub mod controller;
pub mod error;
pub mod pipeline;
pub mod sink;
pub mod stats;

pub use capture::{
    BlockHandler, CaptureDevice, CaptureEvent, CaptureParams, CaptureStream, CpalCapture,
};
pub use config::StreamConfig;
pub use controller::{StopHandle, StreamState, StreamSummary, StreamingController};
pub use error::{LinkError, Result};
pub use sink::{Connection, OutputSink, SerialConnection, SerialSink};
pub use stats::StatsSnapshot;

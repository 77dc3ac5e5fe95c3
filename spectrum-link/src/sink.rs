//! Byte-stream destination for band frames.
//!
//! The wire format is the bare band vector: `band_count` raw bytes per frame,
//! no header, no checksum. The receiver synchronizes on byte count alone, so
//! the bytes put on the wire always add up to whole frames.

use std::io::{self, Write};
use std::time::Duration;

use tracing::{debug, info};

use crate::config::StreamConfig;
use crate::error::{LinkError, Result};

/// An open byte-stream connection.
pub trait Connection: Send + 'static {
    /// Send one complete frame.
    fn write(&mut self, frame: &[u8]) -> Result<()>;

    /// Release the underlying handle. Later calls are no-ops.
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;
}

/// Opens connections to the remote device.
pub trait OutputSink {
    type Connection: Connection;

    fn open(&self, port: &str, baud_rate: u32) -> Result<Self::Connection>;

    /// Time the remote device needs after open before it can take frames.
    fn settle_delay(&self) -> Duration;
}

/// Serial port sink backed by `serialport`.
#[derive(Debug, Clone)]
pub struct SerialSink {
    write_timeout: Duration,
    settle_delay: Duration,
}

impl SerialSink {
    pub fn new(write_timeout: Duration, settle_delay: Duration) -> Self {
        Self {
            write_timeout,
            settle_delay,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(config.write_timeout, config.settle_delay)
    }

    fn describe_open_error(e: &serialport::Error) -> &'static str {
        match e.kind() {
            serialport::ErrorKind::NoDevice => "port not found or busy",
            serialport::ErrorKind::InvalidInput => "invalid port settings",
            serialport::ErrorKind::Io(_) => "i/o error",
            _ => "serial error",
        }
    }
}

impl OutputSink for SerialSink {
    type Connection = SerialConnection;

    fn open(&self, port: &str, baud_rate: u32) -> Result<SerialConnection> {
        let handle = serialport::new(port, baud_rate)
            .timeout(self.write_timeout)
            .open()
            .map_err(|e| {
                LinkError::connection(port, format!("{} ({})", Self::describe_open_error(&e), e))
            })?;

        info!("Connected to {} @ {} baud", port, baud_rate);
        Ok(SerialConnection {
            port_name: port.to_string(),
            port: Some(handle),
            pending: Vec::new(),
        })
    }

    fn settle_delay(&self) -> Duration {
        self.settle_delay
    }
}

/// Exclusive handle on an open serial port.
pub struct SerialConnection {
    port_name: String,
    port: Option<Box<dyn serialport::SerialPort>>,
    /// Unsent tail of a frame cut short by a write timeout.
    pending: Vec<u8>,
}

/// Write as much of `buf` as the port takes. Returns the byte count written
/// and the error that stopped it, if any.
fn write_partial<W: Write + ?Sized>(port: &mut W, buf: &[u8]) -> (usize, io::Result<()>) {
    let mut written = 0;
    while written < buf.len() {
        match port.write(&buf[written..]) {
            Ok(0) => return (written, Err(io::ErrorKind::WriteZero.into())),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return (written, Err(e)),
        }
    }
    (written, Ok(()))
}

/// Write one frame without ever leaving the wire between frames.
///
/// A frame cut short keeps its tail in `pending`. The tail goes out ahead of
/// the next frame, and that frame is dropped whole while the tail is stuck.
fn write_frame<W: Write + ?Sized>(
    port: &mut W,
    pending: &mut Vec<u8>,
    frame: &[u8],
) -> io::Result<()> {
    if !pending.is_empty() {
        let (written, result) = write_partial(port, pending);
        pending.drain(..written);
        if let Err(e) = result {
            return Err(io::Error::new(
                e.kind(),
                format!(
                    "frame dropped, {} bytes of the previous frame still pending: {}",
                    pending.len(),
                    e
                ),
            ));
        }
    }

    let (written, result) = write_partial(port, frame);
    if written > 0 && written < frame.len() {
        pending.extend_from_slice(&frame[written..]);
    }
    result
}

impl Connection for SerialConnection {
    fn write(&mut self, frame: &[u8]) -> Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| LinkError::Write(format!("{} is closed", self.port_name)))?;

        write_frame(port.as_mut(), &mut self.pending, frame)
            .map_err(|e| LinkError::Write(format!("{}: {}", self.port_name, e)))
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            if !self.pending.is_empty() {
                let (written, _) = write_partial(port.as_mut(), &self.pending);
                if written < self.pending.len() {
                    debug!(
                        "Discarding {} bytes of a partial frame on {}",
                        self.pending.len() - written,
                        self.port_name
                    );
                }
                self.pending.clear();
            }
            // Dropping the handle closes the descriptor
            drop(port);
            debug!("Serial port {} released", self.port_name);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

impl Drop for SerialConnection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

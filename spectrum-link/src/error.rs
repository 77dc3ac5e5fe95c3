use spectrum_dsp::DspError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LinkError>;

/// Everything that can go wrong between the microphone and the serial port.
#[derive(Error, Debug)]
pub enum LinkError {
    /// The serial port could not be acquired at startup.
    #[error("connection error on {port}: {reason}")]
    Connection { port: String, reason: String },

    /// The capture device is unavailable or failed while streaming.
    #[error("capture device error: {0}")]
    Device(String),

    /// A band frame could not be delivered. Recoverable while streaming.
    #[error("write error: {0}")]
    Write(String),

    /// The stream shape cannot work. Detected before any resource is opened.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl LinkError {
    pub fn connection(port: &str, reason: impl std::fmt::Display) -> Self {
        LinkError::Connection {
            port: port.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Process exit code for this failure. Clean shutdown exits with 0.
    pub fn exit_code(&self) -> u8 {
        match self {
            LinkError::Connection { .. } => 2,
            LinkError::Device(_) => 3,
            LinkError::InvalidConfiguration(_) => 4,
            LinkError::Write(_) => 5,
        }
    }
}

impl From<DspError> for LinkError {
    fn from(e: DspError) -> Self {
        match e {
            DspError::InvalidConfiguration(reason) => {
                LinkError::InvalidConfiguration(reason.to_string())
            }
            DspError::InvalidInput { expected, actual } => LinkError::Device(format!(
                "capture delivered {} samples, expected {}",
                actual, expected
            )),
        }
    }
}

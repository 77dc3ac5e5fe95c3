use thiserror::Error;

/// Errors raised by the transform and band mapping stages.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DspError {
    /// A buffer handed to a per-block operation has the wrong length.
    #[error("invalid input: expected {expected} values, got {actual}")]
    InvalidInput { expected: usize, actual: usize },

    /// The pipeline shape cannot work. Only raised at setup time.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),
}

impl DspError {
    pub(crate) fn length(expected: usize, actual: usize) -> Self {
        DspError::InvalidInput { expected, actual }
    }
}

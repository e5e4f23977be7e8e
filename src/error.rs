//! Error taxonomy for the capture pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// Device enumeration failed, the requested device is missing, or the
    /// stream could not be opened.
    #[error("audio device unavailable: {message}")]
    DeviceUnavailable { message: String },

    /// The native stream reported an error after it was opened.
    #[error("audio stream interrupted: {message}")]
    StreamInterrupted { message: String },

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("unsupported audio format: {message}")]
    UnsupportedFormat { message: String },

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CaptureError>;

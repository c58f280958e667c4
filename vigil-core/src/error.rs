//! Core error types.
//!
//! Parsing is tolerant of malformed content, so the only failure the codec
//! can report is an unreadable underlying stream.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while decoding a playlist.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The underlying stream could not be read.
    #[error("failed to read playlist: {message}")]
    Read {
        /// Error message.
        message: String,
    },
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Read {
            message: err.to_string(),
        }
    }
}

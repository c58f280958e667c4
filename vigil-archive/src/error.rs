//! Archive error types.
//!
//! This module defines the error types used throughout the vigil-archive
//! crate for source fetches and archive writes.

use thiserror::Error;

/// Result type for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors that can occur during archive operations.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Object not found at the source or in the archive.
    #[error("object not found: {key}")]
    NotFound {
        /// The key or file name that was not found.
        key: String,
    },

    /// Fetching from the source failed.
    #[error("fetch failed for {key}: {message}")]
    FetchFailed {
        /// The key or file name.
        key: String,
        /// Error message.
        message: String,
    },

    /// Writing to the archive failed.
    #[error("write failed for {key}: {message}")]
    WriteFailed {
        /// The key or file name.
        key: String,
        /// Error message.
        message: String,
    },

    /// An HTTP request returned an unexpected status.
    #[error("HTTP {status} for {url}")]
    Http {
        /// Requested URL.
        url: String,
        /// Response status code.
        status: u16,
    },

    /// The source playlist could not be obtained. Aborts the run.
    #[error("source playlist unavailable: {source_error}")]
    SourceUnavailable {
        /// The underlying fetch error.
        #[source]
        source_error: Box<ArchiveError>,
    },

    /// I/O error.
    #[error("I/O error: {operation}: {message}")]
    Io {
        /// What operation was being performed.
        operation: &'static str,
        /// Error message.
        message: String,
    },
}

impl ArchiveError {
    /// Wraps a source playlist fetch failure as a fatal run error.
    #[must_use]
    pub fn source_unavailable(err: Self) -> Self {
        Self::SourceUnavailable {
            source_error: Box::new(err),
        }
    }

    /// Returns true if this error aborts a whole run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. })
    }
}

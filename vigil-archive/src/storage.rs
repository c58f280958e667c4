//! Source and archive abstractions.
//!
//! The engine only ever talks to these two narrow traits, which keeps it
//! independent of where the live window is served from (local directory,
//! HTTP) and where the archive lives (local directory, S3, memory).

use async_trait::async_trait;
use bytes::Bytes;
use vigil_core::limits::PLAYLIST_FILE_NAME;
use vigil_core::{BucketKey, Playlist};

use crate::error::{ArchiveError, ArchiveResult};

// -----------------------------------------------------------------------------
// SegmentSource Trait
// -----------------------------------------------------------------------------

/// The live rolling window being archived.
///
/// Implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait SegmentSource: Send + Sync {
    /// Fetches and parses the live playlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the playlist cannot be fetched or read.
    async fn fetch_playlist(&self) -> ArchiveResult<Playlist>;

    /// Fetches the raw content of a segment by its file name in the live
    /// playlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment doesn't exist or the fetch fails.
    async fn fetch_segment(&self, filename: &str) -> ArchiveResult<Bytes>;
}

// -----------------------------------------------------------------------------
// ArchiveSink Trait
// -----------------------------------------------------------------------------

/// Permanent, hour-partitioned archive.
///
/// Each bucket holds one playlist plus the segment files it lists.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// Reads a bucket's playlist. Returns `None` if the bucket has none yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the playlist exists but cannot be read.
    async fn read_playlist(&self, bucket: &BucketKey) -> ArchiveResult<Option<Playlist>>;

    /// Replaces a bucket's playlist.
    ///
    /// # Errors
    ///
    /// Returns an error if the playlist cannot be persisted.
    async fn write_playlist(&self, bucket: &BucketKey, playlist: &Playlist) -> ArchiveResult<()>;

    /// Stores segment content in a bucket under `filename`.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be persisted.
    async fn write_segment(&self, bucket: &BucketKey, filename: &str, data: Bytes)
        -> ArchiveResult<()>;
}

// -----------------------------------------------------------------------------
// ArchiveKey
// -----------------------------------------------------------------------------

/// Relative location of an object in the archive.
///
/// Keys follow the format: `{YYYY}/{MM}/{DD}/{HH}/{filename}`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchiveKey(String);

impl ArchiveKey {
    /// Creates a new archive key from a string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key of the playlist of a bucket.
    #[must_use]
    pub fn playlist(bucket: &BucketKey) -> Self {
        Self::segment(bucket, PLAYLIST_FILE_NAME)
    }

    /// Key of a file inside a bucket.
    #[must_use]
    pub fn segment(bucket: &BucketKey, filename: &str) -> Self {
        Self(format!("{bucket}/{filename}"))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rejects file names that would escape their directory.
///
/// File names come from a remote playlist, so they are never trusted as
/// paths.
///
/// # Errors
///
/// Returns `FetchFailed` if the name is empty, contains a path separator or
/// is a relative path component.
pub fn validate_filename(filename: &str) -> ArchiveResult<()> {
    let is_plain = !filename.is_empty()
        && filename != "."
        && filename != ".."
        && !filename.contains(['/', '\\']);

    if is_plain {
        Ok(())
    } else {
        Err(ArchiveError::FetchFailed {
            key: filename.to_string(),
            message: "segment file name is not a plain file name".to_string(),
        })
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

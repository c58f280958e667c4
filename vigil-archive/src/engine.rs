//! Archive engine.
//!
//! One run copies every not-yet-archived segment of the live window into the
//! hour bucket its timestamp falls in, renaming it after the bucket's
//! current record count. Runs are idempotent: a segment whose timestamp is
//! already listed in its bucket is skipped.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use tracing::{debug, info, warn};
use vigil_core::limits::{SEGMENT_INDEX_WIDTH_DEFAULT, SEGMENT_INDEX_WIDTH_MAX};
use vigil_core::{BucketKey, Playlist, SegmentRecord};

use crate::error::{ArchiveError, ArchiveResult};
use crate::storage::{ArchiveSink, SegmentSource};

// -----------------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------------

/// Configuration for the archive engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Number of digits the segment index is zero-padded to.
    ///
    /// Default: 3 (`segment_000.ts`).
    pub index_width: usize,
    /// Extension of archived segment files, without the dot.
    ///
    /// Default: `ts`.
    pub segment_extension: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_width: SEGMENT_INDEX_WIDTH_DEFAULT,
            segment_extension: "ts".to_string(),
        }
    }
}

impl EngineConfig {
    /// Creates a config with default naming.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a config for testing.
    #[must_use]
    pub fn for_testing() -> Self {
        Self::default()
    }

    /// Sets the index width.
    ///
    /// # Panics
    ///
    /// Panics if `width` is zero or larger than
    /// [`SEGMENT_INDEX_WIDTH_MAX`].
    #[must_use]
    pub fn with_index_width(mut self, width: usize) -> Self {
        assert!(
            (1..=SEGMENT_INDEX_WIDTH_MAX).contains(&width),
            "index width must be in 1..={SEGMENT_INDEX_WIDTH_MAX}"
        );
        self.index_width = width;
        self
    }

    /// Sets the segment file extension.
    ///
    /// # Panics
    ///
    /// Panics if `extension` is empty or contains a path separator.
    #[must_use]
    pub fn with_segment_extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        assert!(!extension.is_empty(), "segment extension must not be empty");
        assert!(
            !extension.contains(['/', '\\']),
            "segment extension must not contain a path separator"
        );
        self.segment_extension = extension;
        self
    }

    /// Returns the archived file name for the segment at `index` in its
    /// bucket.
    #[must_use]
    pub fn segment_filename(&self, index: usize) -> String {
        format!(
            "segment_{index:0width$}.{ext}",
            width = self.index_width,
            ext = self.segment_extension
        )
    }
}

// -----------------------------------------------------------------------------
// Report
// -----------------------------------------------------------------------------

/// Step at which a segment failed to archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureStage {
    /// Reading the bucket playlist.
    ReadPlaylist,
    /// Fetching segment content from the source.
    FetchSegment,
    /// The generated file name is already listed in the bucket.
    AssignName,
    /// Storing segment content in the archive.
    WriteSegment,
    /// Persisting the updated bucket playlist.
    WritePlaylist,
}

impl FailureStage {
    /// Returns a short name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadPlaylist => "read_playlist",
            Self::FetchSegment => "fetch_segment",
            Self::AssignName => "assign_name",
            Self::WriteSegment => "write_segment",
            Self::WritePlaylist => "write_playlist",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A segment that could not be archived during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFailure {
    /// File name of the segment in the live playlist.
    pub filename: String,
    /// Bucket the segment belongs to.
    pub bucket: BucketKey,
    /// Step that failed.
    pub stage: FailureStage,
    /// Error description.
    pub error: String,
}

impl SegmentFailure {
    fn new(
        record: &SegmentRecord,
        bucket: &BucketKey,
        stage: FailureStage,
        error: impl fmt::Display,
    ) -> Self {
        Self {
            filename: record.filename.clone(),
            bucket: bucket.clone(),
            stage,
            error: error.to_string(),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    /// Segments stored and listed in their bucket playlist.
    pub archived: usize,
    /// Segments whose timestamp was already listed in their bucket.
    pub skipped_duplicates: usize,
    /// Segments without a timestamp.
    pub skipped_untimed: usize,
    /// Segments that failed, in live playlist order.
    pub failures: Vec<SegmentFailure>,
}

impl ArchiveReport {
    /// Returns true if no segment failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

enum SegmentOutcome {
    Archived { bucket: BucketKey, filename: String },
    Duplicate,
    Untimed,
}

// -----------------------------------------------------------------------------
// ArchiveEngine
// -----------------------------------------------------------------------------

/// Copies the live window into the hour-partitioned archive.
///
/// # Design
///
/// A run is a single sequential pass over the live playlist in order. Only a
/// failure to obtain the live playlist aborts it; every per-segment failure is
/// recorded in the report and the pass continues with the next segment.
/// Nothing is retried within a run. The next run picks up whatever is still
/// missing.
pub struct ArchiveEngine<S: SegmentSource, A: ArchiveSink> {
    /// Live window.
    source: Arc<S>,
    /// Permanent archive.
    sink: Arc<A>,
    /// Configuration.
    config: EngineConfig,
}

impl<S: SegmentSource, A: ArchiveSink> ArchiveEngine<S, A> {
    /// Creates a new archive engine.
    #[must_use]
    pub const fn new(source: Arc<S>, sink: Arc<A>, config: EngineConfig) -> Self {
        Self {
            source,
            sink,
            config,
        }
    }

    /// Returns the source.
    #[must_use]
    pub const fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Returns the sink.
    #[must_use]
    pub const fn sink(&self) -> &Arc<A> {
        &self.sink
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Archives every segment of the live window that is not archived yet.
    ///
    /// # Errors
    ///
    /// Returns `SourceUnavailable` if the live playlist cannot be fetched. No
    /// segment is processed in that case.
    pub async fn run(&self) -> ArchiveResult<ArchiveReport> {
        let live = self.source.fetch_playlist().await.map_err(|e| {
            warn!(error = %e, "Failed to fetch live playlist");
            ArchiveError::source_unavailable(e)
        })?;

        debug!(segments = live.len(), "Fetched live playlist");

        let mut report = ArchiveReport::default();
        for record in &live.segments {
            match self.archive_segment(&live, record).await {
                Ok(SegmentOutcome::Archived { bucket, filename }) => {
                    debug!(
                        source = %record.filename,
                        bucket = %bucket,
                        archived_as = %filename,
                        "Segment archived"
                    );
                    report.archived += 1;
                }
                Ok(SegmentOutcome::Duplicate) => {
                    debug!(source = %record.filename, "Segment already archived");
                    report.skipped_duplicates += 1;
                }
                Ok(SegmentOutcome::Untimed) => {
                    debug!(source = %record.filename, "Segment has no timestamp, skipping");
                    report.skipped_untimed += 1;
                }
                Err(failure) => {
                    warn!(
                        source = %failure.filename,
                        bucket = %failure.bucket,
                        stage = %failure.stage,
                        error = %failure.error,
                        "Failed to archive segment"
                    );
                    report.failures.push(failure);
                }
            }
        }

        // Postcondition: every live segment is accounted for exactly once.
        debug_assert_eq!(
            report.archived
                + report.skipped_duplicates
                + report.skipped_untimed
                + report.failures.len(),
            live.len()
        );

        info!(
            archived = report.archived,
            duplicates = report.skipped_duplicates,
            untimed = report.skipped_untimed,
            failed = report.failures.len(),
            "Archive run complete"
        );

        Ok(report)
    }

    async fn archive_segment(
        &self,
        live: &Playlist,
        record: &SegmentRecord,
    ) -> Result<SegmentOutcome, SegmentFailure> {
        let Some(timestamp) = record.timestamp else {
            return Ok(SegmentOutcome::Untimed);
        };
        let bucket = BucketKey::from_timestamp(&timestamp);

        let mut archived = self
            .sink
            .read_playlist(&bucket)
            .await
            .map_err(|e| SegmentFailure::new(record, &bucket, FailureStage::ReadPlaylist, e))?
            .unwrap_or_else(|| Playlist::seeded_from(live));

        if archived.contains_timestamp(&timestamp) {
            return Ok(SegmentOutcome::Duplicate);
        }

        let data = self
            .source
            .fetch_segment(&record.filename)
            .await
            .map_err(|e| SegmentFailure::new(record, &bucket, FailureStage::FetchSegment, e))?;

        let filename = self.next_filename(&archived, record, &bucket, &timestamp)?;

        self.sink
            .write_segment(&bucket, &filename, data)
            .await
            .map_err(|e| SegmentFailure::new(record, &bucket, FailureStage::WriteSegment, e))?;

        archived.push(record.renamed(filename.as_str()));

        self.sink
            .write_playlist(&bucket, &archived)
            .await
            .map_err(|e| SegmentFailure::new(record, &bucket, FailureStage::WritePlaylist, e))?;

        Ok(SegmentOutcome::Archived { bucket, filename })
    }

    /// Names the next segment of a bucket after its record count.
    fn next_filename(
        &self,
        archived: &Playlist,
        record: &SegmentRecord,
        bucket: &BucketKey,
        timestamp: &DateTime<FixedOffset>,
    ) -> Result<String, SegmentFailure> {
        let filename = self.config.segment_filename(archived.len());
        if archived.contains_filename(&filename) {
            return Err(SegmentFailure::new(
                record,
                bucket,
                FailureStage::AssignName,
                format!("{filename} is already listed, cannot archive segment at {timestamp}"),
            ));
        }
        Ok(filename)
    }
}

impl<S: SegmentSource, A: ArchiveSink> fmt::Debug for ArchiveEngine<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

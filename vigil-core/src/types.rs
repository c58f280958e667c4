//! Playlist and segment record value types.

use chrono::{DateTime, FixedOffset};

use crate::codec;
use crate::limits;

// -----------------------------------------------------------------------------
// SegmentRecord
// -----------------------------------------------------------------------------

/// One media segment listed in a playlist.
///
/// The timestamp is the dedup identity of a segment across archive runs. The
/// original `#EXT-X-PROGRAM-DATE-TIME` text is kept verbatim so that a
/// re-serialized playlist carries the recorder's own formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRecord {
    /// Segment file name, unique within a playlist.
    pub filename: String,
    /// Duration in seconds. Records with a non-positive duration are dropped.
    pub duration: f64,
    /// Point in time the segment starts at.
    ///
    /// The codec never produces `None`; other sources may.
    pub timestamp: Option<DateTime<FixedOffset>>,
    /// Timestamp text as it appeared in the playlist. Empty if absent.
    pub program_date_time: String,
}

impl SegmentRecord {
    /// Creates a record from a file name, a duration and the raw
    /// `#EXT-X-PROGRAM-DATE-TIME` text.
    ///
    /// The timestamp is parsed from `program_date_time`; it is left unset if
    /// the text is in neither accepted form.
    #[must_use]
    pub fn new(
        filename: impl Into<String>,
        duration: f64,
        program_date_time: impl Into<String>,
    ) -> Self {
        let program_date_time = program_date_time.into();
        Self {
            filename: filename.into(),
            duration,
            timestamp: codec::parse_timestamp(&program_date_time),
            program_date_time,
        }
    }

    /// Returns a copy of this record under a different file name.
    ///
    /// Duration, timestamp and timestamp text are carried over unchanged.
    #[must_use]
    pub fn renamed(&self, filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..self.clone()
        }
    }

    /// Returns true if the record has everything needed to be kept.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.timestamp.is_some() && self.duration.is_finite() && self.duration > 0.0
    }
}

// -----------------------------------------------------------------------------
// Playlist
// -----------------------------------------------------------------------------

/// An HLS media playlist.
///
/// Segments are kept in insertion order, which is chronological and
/// append-only for archive playlists.
#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    /// `#EXT-X-VERSION`.
    pub version: u32,
    /// `#EXT-X-TARGETDURATION`, advisory.
    pub target_duration: u32,
    /// `#EXT-X-MEDIA-SEQUENCE`.
    pub media_sequence: u64,
    /// Segment records in playlist order.
    pub segments: Vec<SegmentRecord>,
}

impl Default for Playlist {
    fn default() -> Self {
        Self::new(
            limits::VERSION_DEFAULT,
            limits::TARGET_DURATION_DEFAULT,
            limits::MEDIA_SEQUENCE_DEFAULT,
        )
    }
}

impl Playlist {
    /// Creates an empty playlist with the given header values.
    #[must_use]
    pub const fn new(version: u32, target_duration: u32, media_sequence: u64) -> Self {
        Self {
            version,
            target_duration,
            media_sequence,
            segments: Vec::new(),
        }
    }

    /// Creates an empty playlist carrying the header values of `other`.
    #[must_use]
    pub const fn seeded_from(other: &Self) -> Self {
        Self::new(other.version, other.target_duration, other.media_sequence)
    }

    /// Returns the number of segment records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true if the playlist lists no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns true if a record starts at exactly the same instant.
    ///
    /// Instants are compared regardless of the UTC offset they were written in.
    #[must_use]
    pub fn contains_timestamp(&self, timestamp: &DateTime<FixedOffset>) -> bool {
        self.segments
            .iter()
            .any(|s| s.timestamp.as_ref() == Some(timestamp))
    }

    /// Returns true if a record uses the given file name.
    #[must_use]
    pub fn contains_filename(&self, filename: &str) -> bool {
        self.segments.iter().any(|s| s.filename == filename)
    }

    /// Appends a record to the end of the playlist.
    ///
    /// # Panics
    ///
    /// Panics if the record's file name is already listed.
    pub fn push(&mut self, record: SegmentRecord) {
        // Precondition: file names are unique within a playlist.
        assert!(
            !self.contains_filename(&record.filename),
            "segment file name already listed"
        );

        let len_before = self.segments.len();
        self.segments.push(record);

        // Postcondition: exactly one record was added at the end.
        assert_eq!(self.segments.len(), len_before + 1);
    }

    /// Returns a new playlist with `record` appended, leaving `self` unchanged.
    ///
    /// # Panics
    ///
    /// Panics if the record's file name is already listed.
    #[must_use]
    pub fn appended(&self, record: SegmentRecord) -> Self {
        let mut next = self.clone();
        next.push(record);
        next
    }
}

impl std::fmt::Display for Playlist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        codec::write_playlist(f, self)
    }
}

impl std::str::FromStr for Playlist {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(codec::parse(s))
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

//! Vigil Core - playlist model and manifest codec for the Vigil archiver.
//!
//! This crate holds the pieces of the archiver that have no I/O of their own:
//! the in-memory playlist model, the text codec for HLS media playlists, and
//! the hour-granularity bucket key used to partition the archive.
//!
//! # Design Principles (`TigerStyle`)
//!
//! - **Value objects**: a [`Playlist`] is rebuilt from text on every read
//! - **Tolerant parsing**: malformed lines are dropped, never raised
//! - **Explicit limits**: defaults and widths live in [`limits`]
//! - **No unsafe code**: Safety > Performance
//!
//! # Example
//!
//! ```
//! use vigil_core::{BucketKey, Playlist};
//!
//! let text = "#EXTM3U\n\
//!             #EXT-X-VERSION:3\n\
//!             #EXTINF:10.000000,\n\
//!             #EXT-X-PROGRAM-DATE-TIME:2024-04-10T23:58:00Z\n\
//!             segment_1.ts\n";
//!
//! let playlist: Playlist = text.parse().unwrap();
//! let record = &playlist.segments[0];
//! let key = BucketKey::from_timestamp(&record.timestamp.unwrap());
//! assert_eq!(key.as_str(), "2024/04/10/23");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod bucket;
mod codec;
mod error;
mod types;

pub use bucket::BucketKey;
pub use codec::{parse, parse_reader, parse_timestamp, serialize};
pub use error::{CoreError, CoreResult};
pub use types::{Playlist, SegmentRecord};

/// Playlist defaults and naming limits.
pub mod limits {
    /// Protocol version assumed when a playlist carries no `#EXT-X-VERSION`.
    pub const VERSION_DEFAULT: u32 = 3;

    /// Target duration assumed when a playlist carries no `#EXT-X-TARGETDURATION`.
    pub const TARGET_DURATION_DEFAULT: u32 = 10;

    /// Media sequence assumed when a playlist carries no `#EXT-X-MEDIA-SEQUENCE`.
    pub const MEDIA_SEQUENCE_DEFAULT: u64 = 0;

    /// File name of the playlist at the source root and in every bucket.
    pub const PLAYLIST_FILE_NAME: &str = "playlist.m3u8";

    /// Suffix that marks a playlist line as a segment file name.
    pub const SEGMENT_SUFFIX: &str = ".ts";

    /// Default zero-padding width of archived segment indexes.
    pub const SEGMENT_INDEX_WIDTH_DEFAULT: usize = 3;

    /// Upper bound on the index width accepted by configuration.
    pub const SEGMENT_INDEX_WIDTH_MAX: usize = 12;

    /// Default seconds between two archive runs.
    pub const ARCHIVE_INTERVAL_SECS_DEFAULT: u64 = 60;
}

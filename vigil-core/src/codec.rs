//! Text codec for HLS media playlists.
//!
//! Only the subset of the format the recorder emits is understood:
//!
//! ```text
//! #EXTM3U
//! #EXT-X-VERSION:<int>
//! #EXT-X-TARGETDURATION:<int>
//! #EXT-X-MEDIA-SEQUENCE:<int>
//! #EXTINF:<seconds>,
//! #EXT-X-PROGRAM-DATE-TIME:<timestamp>
//! <filename>.ts
//! ```
//!
//! Decoding never fails on content. Unknown tags are ignored, and a segment
//! line missing a usable duration or timestamp is dropped from the result.

use std::fmt;
use std::io::BufRead;

use chrono::{DateTime, FixedOffset};
use tracing::{debug, trace};

use crate::error::CoreResult;
use crate::limits::SEGMENT_SUFFIX;
use crate::types::{Playlist, SegmentRecord};

const MAGIC: &str = "#EXTM3U";
const VERSION_PREFIX: &str = "#EXT-X-VERSION:";
const TARGET_DURATION_PREFIX: &str = "#EXT-X-TARGETDURATION:";
const MEDIA_SEQUENCE_PREFIX: &str = "#EXT-X-MEDIA-SEQUENCE:";
const DURATION_PREFIX: &str = "#EXTINF:";
const PROGRAM_DATE_TIME_PREFIX: &str = "#EXT-X-PROGRAM-DATE-TIME:";

/// Offset without a colon and optional fractional seconds, as ffmpeg writes
/// it: `2025-04-11T00:27:48.996+0000`.
const OFFSET_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

// -----------------------------------------------------------------------------
// Decoding
// -----------------------------------------------------------------------------

/// Parses playlist text.
///
/// Malformed lines are skipped; this function cannot fail.
#[must_use]
pub fn parse(text: &str) -> Playlist {
    let mut builder = PlaylistBuilder::new();
    for line in text.lines() {
        builder.feed(line);
    }
    builder.finish()
}

/// Parses a playlist from a buffered reader.
///
/// # Errors
///
/// Returns [`CoreError::Read`](crate::CoreError::Read) if the stream cannot be
/// read. Malformed content, including bytes that are not UTF-8, is never an
/// error.
pub fn parse_reader<R: BufRead>(mut reader: R) -> CoreResult<Playlist> {
    let mut builder = PlaylistBuilder::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        // Invalid UTF-8 is a malformed line, not an unreadable stream.
        builder.feed(&String::from_utf8_lossy(&line));
    }
    Ok(builder.finish())
}

/// Parses `#EXT-X-PROGRAM-DATE-TIME` text.
///
/// RFC 3339 is tried first, then the offset form with an optional fraction
/// (`2025-04-11T00:27:48.996+0000`). Returns `None` if neither matches.
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .or_else(|_| DateTime::parse_from_str(text, OFFSET_TIMESTAMP_FORMAT))
        .ok()
}

/// Parses the seconds field of an `#EXTINF` value (`10.000000,title`).
fn parse_duration(value: &str) -> Option<f64> {
    let seconds = value.split_once(',').map_or(value, |(seconds, _title)| seconds);
    seconds.trim().parse::<f64>().ok()
}

/// Metadata seen since the last segment line.
///
/// Each directive overwrites the previous one of its kind, so the nearest
/// preceding directive wins. Taken (and thereby reset) at every segment line.
#[derive(Debug, Default)]
struct PendingMetadata {
    duration: Option<f64>,
    program_date_time: Option<String>,
}

/// Line-at-a-time playlist decoder.
#[derive(Debug)]
struct PlaylistBuilder {
    playlist: Playlist,
    pending: PendingMetadata,
    dropped: u32,
}

impl PlaylistBuilder {
    fn new() -> Self {
        Self {
            playlist: Playlist::default(),
            pending: PendingMetadata::default(),
            dropped: 0,
        }
    }

    fn feed(&mut self, raw: &str) {
        let line = raw.trim();
        if line.is_empty() {
            return;
        }

        if let Some(value) = line.strip_prefix(VERSION_PREFIX) {
            if let Ok(version) = value.trim().parse() {
                self.playlist.version = version;
            }
        } else if let Some(value) = line.strip_prefix(TARGET_DURATION_PREFIX) {
            if let Ok(target) = value.trim().parse() {
                self.playlist.target_duration = target;
            }
        } else if let Some(value) = line.strip_prefix(MEDIA_SEQUENCE_PREFIX) {
            if let Ok(sequence) = value.trim().parse() {
                self.playlist.media_sequence = sequence;
            }
        } else if let Some(value) = line.strip_prefix(DURATION_PREFIX) {
            self.pending.duration = parse_duration(value);
        } else if let Some(value) = line.strip_prefix(PROGRAM_DATE_TIME_PREFIX) {
            self.pending.program_date_time = Some(value.trim().to_string());
        } else if !line.starts_with('#') && line.ends_with(SEGMENT_SUFFIX) {
            self.segment_line(line);
        }
    }

    fn segment_line(&mut self, filename: &str) {
        let pending = std::mem::take(&mut self.pending);

        let (Some(duration), Some(program_date_time)) =
            (pending.duration, pending.program_date_time)
        else {
            trace!(filename, "Dropping segment without duration or timestamp");
            self.dropped += 1;
            return;
        };

        let record = SegmentRecord::new(filename, duration, program_date_time);
        if !record.is_complete() {
            trace!(
                filename,
                duration,
                program_date_time = %record.program_date_time,
                "Dropping segment with unusable metadata"
            );
            self.dropped += 1;
            return;
        }

        if self.playlist.contains_filename(filename) {
            trace!(filename, "Dropping repeated segment file name");
            self.dropped += 1;
            return;
        }

        self.playlist.segments.push(record);
    }

    fn finish(self) -> Playlist {
        debug!(
            segments = self.playlist.len(),
            dropped = self.dropped,
            "Parsed playlist"
        );
        self.playlist
    }
}

// -----------------------------------------------------------------------------
// Encoding
// -----------------------------------------------------------------------------

/// Serializes a playlist to text.
#[must_use]
pub fn serialize(playlist: &Playlist) -> String {
    playlist.to_string()
}

/// Writes the playlist text into `out`.
pub(crate) fn write_playlist<W: fmt::Write>(out: &mut W, playlist: &Playlist) -> fmt::Result {
    writeln!(out, "{MAGIC}")?;
    writeln!(out, "{VERSION_PREFIX}{}", playlist.version)?;
    writeln!(out, "{TARGET_DURATION_PREFIX}{}", playlist.target_duration)?;
    writeln!(out, "{MEDIA_SEQUENCE_PREFIX}{}", playlist.media_sequence)?;

    for segment in &playlist.segments {
        writeln!(out, "{DURATION_PREFIX}{:.6},", segment.duration)?;
        if !segment.program_date_time.is_empty() {
            writeln!(out, "{PROGRAM_DATE_TIME_PREFIX}{}", segment.program_date_time)?;
        }
        writeln!(out, "{}", segment.filename)?;
    }

    Ok(())
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::{BufReader, Read};

    use super::*;
    use crate::CoreError;

    const RECORDER_PLAYLIST: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:61
#EXT-X-MEDIA-SEQUENCE:0
#EXTINF:60.802000,
#EXT-X-PROGRAM-DATE-TIME:2025-04-11T00:27:48.996+0000
segment_000.ts
#EXTINF:59.202000,
#EXT-X-PROGRAM-DATE-TIME:2025-04-11T00:28:49.798+0000
segment_001.ts
#EXTINF:60.801000,
#EXT-X-PROGRAM-DATE-TIME:2025-04-11T00:29:48.999+0000
segment_002.ts
#EXTINF:59.202000,
#EXT-X-PROGRAM-DATE-TIME:2025-04-11T00:30:49.801+0000
segment_003.ts
";

    #[test]
    fn test_parse_header_and_segments() {
        let input = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:10
#EXT-X-MEDIA-SEQUENCE:7
#EXT-X-PROGRAM-DATE-TIME:2024-04-10T23:58:00Z
#EXTINF:10.0,
segment_1.ts
#EXT-X-PROGRAM-DATE-TIME:2024-04-10T23:58:10Z
#EXTINF:10.0,
segment_2.ts";

        let playlist = parse(input);

        assert_eq!(playlist.version, 3);
        assert_eq!(playlist.target_duration, 10);
        assert_eq!(playlist.media_sequence, 7);
        assert_eq!(playlist.len(), 2);

        let expected = ["2024-04-10T23:58:00Z", "2024-04-10T23:58:10Z"];
        for (segment, text) in playlist.segments.iter().zip(expected) {
            assert_eq!(segment.program_date_time, text);
            assert!((segment.duration - 10.0).abs() < f64::EPSILON);
            assert!(segment.timestamp.is_some());
        }
    }

    #[test]
    fn test_serialize_exact_text() {
        let mut playlist = Playlist::new(3, 10, 0);
        playlist.push(SegmentRecord::new("segment_1.ts", 10.0, "2024-04-10T23:58:00Z"));
        playlist.push(SegmentRecord::new("segment_2.ts", 10.0, "2024-04-10T23:58:10Z"));

        let expected = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:10
#EXT-X-MEDIA-SEQUENCE:0
#EXTINF:10.000000,
#EXT-X-PROGRAM-DATE-TIME:2024-04-10T23:58:00Z
segment_1.ts
#EXTINF:10.000000,
#EXT-X-PROGRAM-DATE-TIME:2024-04-10T23:58:10Z
segment_2.ts
";

        assert_eq!(serialize(&playlist), expected);
    }

    #[test]
    fn test_serialize_omits_empty_timestamp_text() {
        let mut playlist = Playlist::new(3, 10, 0);
        playlist.segments.push(SegmentRecord {
            filename: "segment_1.ts".to_string(),
            duration: 4.5,
            timestamp: None,
            program_date_time: String::new(),
        });

        let text = serialize(&playlist);
        assert!(text.ends_with("#EXTINF:4.500000,\nsegment_1.ts\n"));
        assert!(!text.contains(PROGRAM_DATE_TIME_PREFIX));
    }

    #[test]
    fn test_recorder_playlist_roundtrip_is_byte_identical() {
        let playlist = parse(RECORDER_PLAYLIST);
        assert_eq!(playlist.len(), 4);
        assert_eq!(serialize(&playlist), RECORDER_PLAYLIST);
    }

    #[test]
    fn test_roundtrip_preserves_triples_and_header() {
        let mut playlist = Playlist::new(4, 61, 982);
        playlist.push(SegmentRecord::new("segment_000.ts", 60.8, "2025-04-11T04:53:28.029+0000"));
        playlist.push(SegmentRecord::new("segment_001.ts", 59.201, "2025-04-11T04:54:28Z"));
        playlist.push(SegmentRecord::new("segment_002.ts", 0.5, "2025-04-11T06:55:28.030+02:00"));

        let reparsed = parse(&serialize(&playlist));

        assert_eq!(reparsed.version, 4);
        assert_eq!(reparsed.target_duration, 61);
        assert_eq!(reparsed.media_sequence, 982);
        assert_eq!(reparsed.len(), playlist.len());
        for (a, b) in playlist.segments.iter().zip(&reparsed.segments) {
            assert_eq!(a.filename, b.filename);
            assert!((a.duration - b.duration).abs() < 1e-6);
            assert_eq!(a.timestamp, b.timestamp);
            assert_eq!(a.program_date_time, b.program_date_time);
        }
    }

    #[test]
    fn test_offset_timestamps_parse() {
        let playlist = parse(RECORDER_PLAYLIST);
        let first = playlist.segments[0].timestamp.expect("timestamp");
        let rfc = parse_timestamp("2025-04-11T00:27:48.996Z").expect("rfc3339");
        assert_eq!(first, rfc);
    }

    #[test]
    fn test_parse_timestamp_forms() {
        assert!(parse_timestamp("2024-04-10T23:58:00Z").is_some());
        assert!(parse_timestamp("2024-04-10T23:58:00+01:00").is_some());
        assert!(parse_timestamp("2025-04-11T00:27:48.996+0000").is_some());
        assert!(parse_timestamp("2025-04-11T00:27:48+0000").is_some());
        assert!(parse_timestamp("2025-04-11 00:27").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_segment_without_duration_is_dropped() {
        let input = "#EXTM3U
#EXT-X-PROGRAM-DATE-TIME:2024-04-10T23:58:00Z
orphan.ts
#EXTINF:10.0,
#EXT-X-PROGRAM-DATE-TIME:2024-04-10T23:58:10Z
kept.ts";

        let playlist = parse(input);
        assert_eq!(playlist.len(), 1);
        assert_eq!(playlist.segments[0].filename, "kept.ts");
    }

    #[test]
    fn test_segment_without_timestamp_is_dropped() {
        let input = "#EXTM3U
#EXTINF:10.0,
orphan.ts";

        assert!(parse(input).is_empty());
    }

    #[test]
    fn test_unparsable_timestamp_is_dropped() {
        let input = "#EXTM3U
#EXTINF:10.0,
#EXT-X-PROGRAM-DATE-TIME:yesterday
bad.ts
#EXTINF:10.0,
#EXT-X-PROGRAM-DATE-TIME:2024-04-10T23:58:10Z
good.ts";

        let playlist = parse(input);
        assert_eq!(playlist.len(), 1);
        assert_eq!(playlist.segments[0].filename, "good.ts");
    }

    #[test]
    fn test_non_positive_duration_is_dropped() {
        let input = "#EXTM3U
#EXTINF:0.0,
#EXT-X-PROGRAM-DATE-TIME:2024-04-10T23:58:00Z
zero.ts
#EXTINF:abc,
#EXT-X-PROGRAM-DATE-TIME:2024-04-10T23:58:10Z
garbage.ts";

        assert!(parse(input).is_empty());
    }

    #[test]
    fn test_metadata_is_not_reused_across_segments() {
        let input = "#EXTM3U
#EXTINF:10.0,
#EXT-X-PROGRAM-DATE-TIME:2024-04-10T23:58:00Z
first.ts
second.ts";

        let playlist = parse(input);
        assert_eq!(playlist.len(), 1);
        assert_eq!(playlist.segments[0].filename, "first.ts");
    }

    #[test]
    fn test_directives_need_not_be_adjacent() {
        let input = "#EXTM3U
#EXTINF:6.006,live
#EXT-X-DISCONTINUITY
#EXT-X-PROGRAM-DATE-TIME:2024-04-10T23:58:00Z
#EXT-X-UNKNOWN-TAG:1

segment_9.ts";

        let playlist = parse(input);
        assert_eq!(playlist.len(), 1);
        assert!((playlist.segments[0].duration - 6.006).abs() < f64::EPSILON);
    }

    #[test]
    fn test_nearest_preceding_directive_wins() {
        let input = "#EXTM3U
#EXTINF:1.0,
#EXT-X-PROGRAM-DATE-TIME:2024-04-10T23:00:00Z
#EXTINF:2.0,
#EXT-X-PROGRAM-DATE-TIME:2024-04-10T23:30:00Z
a.ts";

        let playlist = parse(input);
        assert_eq!(playlist.segments[0].program_date_time, "2024-04-10T23:30:00Z");
        assert!((playlist.segments[0].duration - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_repeated_header_last_wins_and_garbage_ignored() {
        let input = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-VERSION:7
#EXT-X-TARGETDURATION:x
#EXT-X-MEDIA-SEQUENCE:5
#EXT-X-MEDIA-SEQUENCE:9";

        let playlist = parse(input);
        assert_eq!(playlist.version, 7);
        assert_eq!(playlist.target_duration, 10);
        assert_eq!(playlist.media_sequence, 9);
    }

    #[test]
    fn test_crlf_line_endings() {
        let input = "#EXTM3U\r\n#EXT-X-VERSION:3\r\n#EXTINF:10.0,\r\n\
                     #EXT-X-PROGRAM-DATE-TIME:2024-04-10T23:58:00Z\r\nsegment_1.ts\r\n";

        let playlist = parse(input);
        assert_eq!(playlist.len(), 1);
        assert_eq!(playlist.segments[0].filename, "segment_1.ts");
        assert_eq!(playlist.segments[0].program_date_time, "2024-04-10T23:58:00Z");
    }

    #[test]
    fn test_repeated_filename_keeps_first() {
        let input = "#EXTM3U
#EXTINF:10.0,
#EXT-X-PROGRAM-DATE-TIME:2024-04-10T23:58:00Z
segment_1.ts
#EXTINF:10.0,
#EXT-X-PROGRAM-DATE-TIME:2024-04-10T23:58:10Z
segment_1.ts";

        let playlist = parse(input);
        assert_eq!(playlist.len(), 1);
        assert_eq!(playlist.segments[0].program_date_time, "2024-04-10T23:58:00Z");
    }

    #[test]
    fn test_parse_reader_matches_parse() {
        let from_reader = parse_reader(RECORDER_PLAYLIST.as_bytes()).expect("parse reader");
        assert_eq!(from_reader, parse(RECORDER_PLAYLIST));
    }

    #[test]
    fn test_parse_reader_tolerates_invalid_utf8() {
        let mut raw = b"#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-COMMENT:caf".to_vec();
        raw.extend_from_slice(b"\xe9\n#EXTINF:10.000000,caf\xe9\n");
        raw.extend_from_slice(b"#EXT-X-PROGRAM-DATE-TIME:2024-04-10T23:58:00Z\ngood.ts\n");

        let playlist = parse_reader(raw.as_slice()).expect("invalid UTF-8 is tolerated");

        assert_eq!(playlist.len(), 1);
        assert_eq!(playlist.segments[0].filename, "good.ts");
        assert!((playlist.segments[0].duration - 10.0).abs() < f64::EPSILON);
    }

    struct BrokenStream;

    impl Read for BrokenStream {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            ))
        }
    }

    #[test]
    fn test_parse_reader_surfaces_stream_errors() {
        let result = parse_reader(BufReader::new(BrokenStream));
        assert!(matches!(result, Err(CoreError::Read { .. })));
    }

    #[test]
    fn test_from_str_and_display() {
        let playlist: Playlist = RECORDER_PLAYLIST.parse().expect("infallible");
        assert_eq!(playlist.to_string(), RECORDER_PLAYLIST);
    }
}

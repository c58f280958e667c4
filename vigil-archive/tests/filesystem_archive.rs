//! End-to-end archive runs over the filesystem source and archive.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use vigil_archive::{
    ArchiveEngine, ArchiveError, EngineConfig, FailureStage, FilesystemArchiveSink,
    FilesystemConfig, FilesystemSegmentSource,
};

const LIVE_PLAYLIST: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:61
#EXT-X-MEDIA-SEQUENCE:17
#EXTINF:60.802000,
#EXT-X-PROGRAM-DATE-TIME:2025-04-11T00:27:48.996+0000
rec_17.ts
#EXTINF:60.801000,
#EXT-X-PROGRAM-DATE-TIME:2025-04-11T00:27:48.996+0000
rec_17b.ts
#EXTINF:60.800000,
#EXT-X-PROGRAM-DATE-TIME:2025-04-11T00:28:49.797+0000
rec_18.ts
#EXTINF:60.799000,
#EXT-X-PROGRAM-DATE-TIME:2025-04-11T01:00:10.000+0000
rec_19.ts
";

struct Fixture {
    live: TempDir,
    archive: TempDir,
}

impl Fixture {
    fn new(playlist: &str, segments: &[&str]) -> Self {
        let live = TempDir::new().expect("live dir");
        fs::write(live.path().join("playlist.m3u8"), playlist).expect("write live playlist");
        for name in segments {
            fs::write(live.path().join(name), format!("content of {name}")).expect("write segment");
        }
        Self {
            live,
            archive: TempDir::new().expect("archive dir"),
        }
    }

    async fn engine(&self) -> ArchiveEngine<FilesystemSegmentSource, FilesystemArchiveSink> {
        let source = FilesystemSegmentSource::new(self.live.path());
        let sink = FilesystemArchiveSink::new(FilesystemConfig::for_testing(self.archive.path()))
            .await
            .expect("archive sink");
        ArchiveEngine::new(Arc::new(source), Arc::new(sink), EngineConfig::for_testing())
    }

    fn archived(&self, relative: &str) -> String {
        read(&self.archive.path().join(relative))
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()))
}

#[tokio::test]
async fn test_archives_live_window_into_hour_buckets() {
    let fixture = Fixture::new(
        LIVE_PLAYLIST,
        &["rec_17.ts", "rec_17b.ts", "rec_18.ts", "rec_19.ts"],
    );

    let report = fixture.engine().await.run().await.expect("run");

    assert_eq!(report.archived, 3);
    assert_eq!(report.skipped_duplicates, 1);
    assert!(report.is_clean());

    assert_eq!(
        fixture.archived("2025/04/11/00/playlist.m3u8"),
        "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:61
#EXT-X-MEDIA-SEQUENCE:17
#EXTINF:60.802000,
#EXT-X-PROGRAM-DATE-TIME:2025-04-11T00:27:48.996+0000
segment_000.ts
#EXTINF:60.800000,
#EXT-X-PROGRAM-DATE-TIME:2025-04-11T00:28:49.797+0000
segment_001.ts
"
    );
    assert_eq!(
        fixture.archived("2025/04/11/00/segment_000.ts"),
        "content of rec_17.ts"
    );
    assert_eq!(
        fixture.archived("2025/04/11/00/segment_001.ts"),
        "content of rec_18.ts"
    );
    assert_eq!(
        fixture.archived("2025/04/11/01/segment_000.ts"),
        "content of rec_19.ts"
    );
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let fixture = Fixture::new(
        LIVE_PLAYLIST,
        &["rec_17.ts", "rec_17b.ts", "rec_18.ts", "rec_19.ts"],
    );
    let engine = fixture.engine().await;

    engine.run().await.expect("first run");
    let before = fixture.archived("2025/04/11/00/playlist.m3u8");

    let report = engine.run().await.expect("second run");

    assert_eq!(report.archived, 0);
    assert_eq!(report.skipped_duplicates, 4);
    assert_eq!(fixture.archived("2025/04/11/00/playlist.m3u8"), before);
    assert!(!fixture
        .archive
        .path()
        .join("2025/04/11/00/segment_002.ts")
        .exists());
}

#[tokio::test]
async fn test_missing_segment_file_is_retried_next_run() {
    let fixture = Fixture::new(LIVE_PLAYLIST, &["rec_17.ts", "rec_19.ts"]);
    let engine = fixture.engine().await;

    let report = engine.run().await.expect("run");

    assert_eq!(report.archived, 2);
    let failed: Vec<&str> = report.failures.iter().map(|f| f.filename.as_str()).collect();
    assert_eq!(failed, ["rec_18.ts"]);
    assert_eq!(report.failures[0].stage, FailureStage::FetchSegment);

    fs::write(fixture.live.path().join("rec_18.ts"), "late").expect("write late segment");
    let report = engine.run().await.expect("rerun");

    assert_eq!(report.archived, 1);
    assert_eq!(fixture.archived("2025/04/11/00/segment_001.ts"), "late");
}

#[tokio::test]
async fn test_missing_live_playlist_is_fatal() {
    let fixture = Fixture::new(LIVE_PLAYLIST, &[]);
    fs::remove_file(fixture.live.path().join("playlist.m3u8")).expect("remove playlist");

    let result = fixture.engine().await.run().await;

    assert!(matches!(result, Err(ArchiveError::SourceUnavailable { .. })));
    let entries = fs::read_dir(fixture.archive.path()).expect("list archive").count();
    assert_eq!(entries, 0);
}

#[tokio::test]
async fn test_malformed_records_are_ignored() {
    let playlist = "#EXTM3U
#EXT-X-VERSION:3
orphan.ts
#EXTINF:abc,
#EXT-X-PROGRAM-DATE-TIME:2025-04-11T00:27:48.996+0000
bad_duration.ts
#EXTINF:10.000000,
#EXT-X-PROGRAM-DATE-TIME:not a time
bad_time.ts
#EXTINF:10.000000,
#EXT-X-PROGRAM-DATE-TIME:2025-04-11T00:29:00Z
good.ts
";
    let fixture = Fixture::new(playlist, &["orphan.ts", "good.ts"]);

    let report = fixture.engine().await.run().await.expect("run");

    assert_eq!(report.archived, 1);
    assert!(report.is_clean());
    assert_eq!(
        fixture.archived("2025/04/11/00/segment_000.ts"),
        "content of good.ts"
    );
}

#[tokio::test]
async fn test_invalid_utf8_in_live_playlist_is_tolerated() {
    let fixture = Fixture::new("", &["good.ts"]);
    let mut raw = b"#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-COMMENT:caf\xe9\n".to_vec();
    raw.extend_from_slice(b"#EXTINF:10.000000,\n");
    raw.extend_from_slice(b"#EXT-X-PROGRAM-DATE-TIME:2025-04-11T00:29:00Z\ngood.ts\n");
    fs::write(fixture.live.path().join("playlist.m3u8"), raw).expect("write live playlist");

    let report = fixture.engine().await.run().await.expect("run");

    assert_eq!(report.archived, 1);
    assert!(report.is_clean());
    assert_eq!(
        fixture.archived("2025/04/11/00/segment_000.ts"),
        "content of good.ts"
    );
}

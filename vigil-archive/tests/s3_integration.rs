//! `LocalStack` integration tests for `S3ArchiveSink`.
//!
//! These tests require `LocalStack` to be running. Start it with:
//!
//! ```bash
//! docker run --rm -p 4566:4566 localstack/localstack
//! ```
//!
//! Create the test bucket:
//!
//! ```bash
//! aws --endpoint-url=http://localhost:4566 s3 mb s3://vigil-test
//! ```
//!
//! Run tests with:
//!
//! ```bash
//! cargo test -p vigil-archive --features s3 --test s3_integration -- --ignored
//! ```

#![cfg(feature = "s3")]

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use vigil_archive::{
    ArchiveEngine, ArchiveSink, EngineConfig, S3ArchiveSink, S3Config, SimulatedSegmentSource,
};
use vigil_core::{parse_timestamp, BucketKey, Playlist, SegmentRecord};

const TEST_BUCKET: &str = "vigil-test";
const LOCALSTACK_ENDPOINT: &str = "http://localhost:4566";

/// Each test writes under its own prefix so reruns start from an empty archive.
fn localstack_config(test: &str) -> S3Config {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_nanos();
    S3Config {
        key_prefix: format!("test/{test}-{nanos}/"),
        region: Some("us-east-1".to_string()),
        endpoint_url: Some(LOCALSTACK_ENDPOINT.to_string()),
        force_path_style: true,
        ..S3Config::new(TEST_BUCKET)
    }
}

async fn create_sink(test: &str) -> S3ArchiveSink {
    S3ArchiveSink::new(localstack_config(test)).await
}

fn bucket(pdt: &str) -> BucketKey {
    BucketKey::from_timestamp(&parse_timestamp(pdt).expect("timestamp"))
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_s3_missing_playlist_is_none() {
    let sink = create_sink("missing").await;

    let playlist = sink
        .read_playlist(&bucket("2025-04-11T00:27:48.996+0000"))
        .await
        .expect("read failed");
    assert!(playlist.is_none());
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_s3_playlist_roundtrip() {
    let sink = create_sink("roundtrip").await;
    let key = bucket("2025-04-11T00:27:48.996+0000");

    let mut playlist = Playlist::new(3, 61, 17);
    playlist.push(SegmentRecord::new(
        "segment_000.ts",
        60.802,
        "2025-04-11T00:27:48.996+0000",
    ));
    sink.write_playlist(&key, &playlist).await.expect("write failed");
    sink.write_segment(&key, "segment_000.ts", Bytes::from_static(b"\x47"))
        .await
        .expect("segment write failed");

    let read = sink.read_playlist(&key).await.expect("read failed");
    assert_eq!(read, Some(playlist));
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_s3_engine_run_is_idempotent() {
    let source = SimulatedSegmentSource::new(42);
    source.push_segment(
        SegmentRecord::new("rec_1.ts", 60.0, "2025-04-11T00:27:48.996+0000"),
        "one",
    );
    source.push_segment(
        SegmentRecord::new("rec_2.ts", 60.0, "2025-04-11T00:28:48.996+0000"),
        "two",
    );
    let sink = create_sink("engine").await;
    let engine = ArchiveEngine::new(Arc::new(source), Arc::new(sink), EngineConfig::default());

    let first = engine.run().await.expect("first run");
    assert_eq!(first.archived, 2);

    let second = engine.run().await.expect("second run");
    assert_eq!(second.archived, 0);
    assert_eq!(second.skipped_duplicates, 2);
}

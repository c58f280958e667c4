//! Vigil archiver daemon.
//!
//! Periodically copies the recorder's rolling HLS window into the permanent
//! hour-partitioned archive. A run happens at startup and then once per
//! interval until the process receives Ctrl-C.
//!
//! # Local Directory Source
//!
//! ```bash
//! vigil-archiver --source-dir /var/recorder/videos --output-dir /srv/archive
//! ```
//!
//! # HTTP Source
//!
//! Read the live window from the recorder's file server instead:
//!
//! ```bash
//! vigil-archiver --source-url http://recorder:8080/videos --output-dir /srv/archive
//! ```
//!
//! # S3 Archive
//!
//! With the `s3` feature, `--s3` archives into the bucket configured through
//! the `VIGIL_S3_*` environment variables:
//!
//! ```bash
//! VIGIL_S3_BUCKET=court-recordings vigil-archiver --source-dir /var/recorder/videos --s3
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use vigil_archive::{
    ArchiveEngine, ArchiveSink, EngineConfig, FilesystemArchiveSink, FilesystemConfig,
    FilesystemSegmentSource, HttpSegmentSource, HttpSourceConfig, SegmentSource,
};
#[cfg(feature = "s3")]
use vigil_archive::{S3ArchiveSink, S3Config};
use vigil_core::limits::{
    ARCHIVE_INTERVAL_SECS_DEFAULT, SEGMENT_INDEX_WIDTH_DEFAULT, SEGMENT_INDEX_WIDTH_MAX,
};

/// Archives a rolling HLS window into hourly buckets.
#[derive(Parser, Debug)]
#[command(name = "vigil-archiver")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the live playlist and its segments.
    #[arg(long, env = "INPUT_DIR", value_parser = parse_dir)]
    source_dir: Option<PathBuf>,

    /// URL of the directory serving the live playlist and its segments,
    /// e.g. `http://recorder:8080/videos`.
    #[arg(long, env = "RECORDER_URL", value_parser = parse_url)]
    source_url: Option<String>,

    /// Directory the archive is written to.
    #[arg(long, env = "OUTPUT_DIR", value_parser = parse_dir)]
    output_dir: Option<PathBuf>,

    /// Archive into S3 instead of `--output-dir` (configured via `VIGIL_S3_*`).
    #[cfg(feature = "s3")]
    #[arg(long)]
    s3: bool,

    /// Seconds between archive runs.
    #[arg(
        long,
        env = "ARCHIVE_INTERVAL_SECS",
        default_value_t = ARCHIVE_INTERVAL_SECS_DEFAULT,
        value_parser = parse_secs
    )]
    interval_secs: u64,

    /// Run once and exit.
    #[arg(long)]
    once: bool,

    /// Digits the archived segment index is zero-padded to.
    #[arg(long, default_value_t = SEGMENT_INDEX_WIDTH_DEFAULT, value_parser = parse_index_width)]
    index_width: usize,

    /// Per-request timeout of the HTTP source in seconds.
    #[arg(long, default_value = "30", value_parser = parse_secs)]
    http_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: Level,
}

/// Parses a directory path, rejecting an empty one.
fn parse_dir(s: &str) -> Result<PathBuf, String> {
    if s.trim().is_empty() {
        return Err("directory must not be empty".to_string());
    }
    Ok(PathBuf::from(s))
}

/// Parses an `http` or `https` URL.
fn parse_url(s: &str) -> Result<String, String> {
    let has_host = ["http://", "https://"]
        .iter()
        .any(|scheme| s.strip_prefix(scheme).is_some_and(|rest| !rest.is_empty()));
    if !has_host {
        return Err(format!("invalid URL '{s}', expected http:// or https://"));
    }
    Ok(s.to_string())
}

/// Parses a positive number of seconds.
fn parse_secs(s: &str) -> Result<u64, String> {
    let secs: u64 = s
        .parse()
        .map_err(|_| format!("invalid number of seconds '{s}'"))?;

    if secs == 0 {
        return Err("must be at least one second".to_string());
    }

    Ok(secs)
}

/// Parses a segment index width.
fn parse_index_width(s: &str) -> Result<usize, String> {
    let width: usize = s
        .parse()
        .map_err(|_| format!("invalid index width '{s}'"))?;

    if !(1..=SEGMENT_INDEX_WIDTH_MAX).contains(&width) {
        return Err(format!(
            "index width must be between 1 and {SEGMENT_INDEX_WIDTH_MAX}, got {width}"
        ));
    }

    Ok(width)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    // Initialize logging to stderr.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(
        source_dir = ?args.source_dir,
        source_url = ?args.source_url,
        output_dir = ?args.output_dir,
        interval_secs = args.interval_secs,
        once = args.once,
        "Starting Vigil archiver"
    );

    let engine_config = EngineConfig::new().with_index_width(args.index_width);

    match (&args.source_dir, &args.source_url) {
        (Some(dir), None) => {
            let source = FilesystemSegmentSource::new(dir);
            with_sink(source, &args, engine_config).await
        }
        (None, Some(url)) => {
            let config = HttpSourceConfig::new(url).with_timeout_secs(args.http_timeout_secs);
            let source = HttpSegmentSource::new(config)?;
            with_sink(source, &args, engine_config).await
        }
        (Some(_), Some(_)) => {
            Err("set only one of --source-dir (INPUT_DIR) and --source-url (RECORDER_URL)".into())
        }
        (None, None) => {
            Err("one of --source-dir (INPUT_DIR) or --source-url (RECORDER_URL) is required".into())
        }
    }
}

/// Opens the configured archive and starts the run loop.
async fn with_sink<S: SegmentSource>(
    source: S,
    args: &Args,
    config: EngineConfig,
) -> Result<(), Box<dyn Error>> {
    #[cfg(feature = "s3")]
    {
        if args.s3 {
            let s3_config = S3Config::from_env()?;
            info!(bucket = %s3_config.bucket, prefix = %s3_config.key_prefix, "Archiving to S3");
            let sink = S3ArchiveSink::new(s3_config).await;
            let engine = ArchiveEngine::new(Arc::new(source), Arc::new(sink), config);
            return schedule(&engine, args).await;
        }
    }

    let output_dir = args
        .output_dir
        .clone()
        .ok_or("--output-dir (OUTPUT_DIR) is required")?;
    let sink = FilesystemArchiveSink::new(FilesystemConfig::new(output_dir)).await?;
    let engine = ArchiveEngine::new(Arc::new(source), Arc::new(sink), config);
    schedule(&engine, args).await
}

/// Runs the engine once, or at every interval tick until Ctrl-C.
async fn schedule<S: SegmentSource, A: ArchiveSink>(
    engine: &ArchiveEngine<S, A>,
    args: &Args,
) -> Result<(), Box<dyn Error>> {
    if args.once {
        let report = engine.run().await?;
        if !report.is_clean() {
            warn!(failed = report.failures.len(), "Some segments were not archived");
        }
        return Ok(());
    }

    // The first tick completes immediately, so a run happens at startup.
    let mut interval = tokio::time::interval(Duration::from_secs(args.interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, stopping");
                return Ok(());
            }
        }

        // Failed segments are picked up again by the next run.
        if let Err(e) = engine.run().await {
            error!(error = %e, "Archive run failed");
        }
    }
}

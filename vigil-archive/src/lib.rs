//! Vigil Archive - idempotent archiving of a rolling HLS window.
//!
//! A recorder keeps a short rolling window of segments and a live playlist.
//! This crate copies that window, run after run, into a permanent archive
//! partitioned by hour (`YYYY/MM/DD/HH/`), where every bucket holds its own
//! playlist and sequentially renamed segments.
//!
//! # Design Principles (`TigerStyle`)
//!
//! - **Deterministic testing**: simulated source and archive with seeded fault injection
//! - **Idempotent runs**: segments are deduplicated by timestamp per bucket
//! - **Assertions**: Pre/post-conditions on naming and storage
//! - **No unsafe code**: Safety > Performance
//!
//! # Backends
//!
//! - [`FilesystemSegmentSource`] / [`HttpSegmentSource`]: the live window
//! - [`FilesystemArchiveSink`]: local archive with atomic writes
//! - `S3ArchiveSink`: production S3 archive (behind `s3` feature flag)
//! - [`SimulatedSegmentSource`] / [`SimulatedArchiveSink`]: in-memory, for tests
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use vigil_archive::{
//!     ArchiveEngine, EngineConfig, SimulatedArchiveSink, SimulatedSegmentSource,
//! };
//!
//! let source = Arc::new(SimulatedSegmentSource::new(42));
//! let sink = Arc::new(SimulatedArchiveSink::new(42));
//! let engine = ArchiveEngine::new(source, sink, EngineConfig::for_testing());
//!
//! let report = engine.run().await?;
//! println!("archived {} segments", report.archived);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod engine;
mod error;
mod filesystem;
mod http;
#[cfg(feature = "s3")]
mod s3;
mod simulated;
mod storage;

pub use engine::{ArchiveEngine, ArchiveReport, EngineConfig, FailureStage, SegmentFailure};
pub use error::{ArchiveError, ArchiveResult};
pub use filesystem::{FilesystemArchiveSink, FilesystemConfig, FilesystemSegmentSource};
pub use http::{HttpSegmentSource, HttpSourceConfig};
#[cfg(feature = "s3")]
pub use s3::{S3ArchiveSink, S3Config, S3ConfigError};
pub use simulated::{
    SimulatedArchiveSink, SimulatedSegmentSource, SinkFaultConfig, SourceFaultConfig,
};
pub use storage::{validate_filename, ArchiveKey, ArchiveSink, SegmentSource};

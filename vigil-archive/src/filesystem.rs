//! Filesystem-backed live window and archive.
//!
//! The source side reads the directory the recorder writes its rolling
//! window into. The archive side keeps one directory per hour.
//!
//! # Directory Structure
//!
//! Source: `{root}/playlist.m3u8` and `{root}/{filename}`.
//!
//! Archive: `{base_path}/{YYYY}/{MM}/{DD}/{HH}/playlist.m3u8` plus the
//! segment files it lists.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use vigil_core::limits::PLAYLIST_FILE_NAME;
use vigil_core::{BucketKey, Playlist};

use crate::error::{ArchiveError, ArchiveResult};
use crate::storage::{validate_filename, ArchiveKey, ArchiveSink, SegmentSource};

// -----------------------------------------------------------------------------
// FilesystemSegmentSource
// -----------------------------------------------------------------------------

/// Reads the live window from the recorder's output directory.
#[derive(Debug, Clone)]
pub struct FilesystemSegmentSource {
    root: PathBuf,
}

impl FilesystemSegmentSource {
    /// Creates a source reading from `root`.
    ///
    /// # Panics
    ///
    /// Panics if `root` is empty.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        assert!(!root.as_os_str().is_empty(), "root must not be empty");
        Self { root }
    }

    /// Returns the directory being read.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl SegmentSource for FilesystemSegmentSource {
    async fn fetch_playlist(&self) -> ArchiveResult<Playlist> {
        let path = self.root.join(PLAYLIST_FILE_NAME);
        let data = read_file(&path).await?;

        vigil_core::parse_reader(data.as_slice()).map_err(|e| ArchiveError::FetchFailed {
            key: path.display().to_string(),
            message: e.to_string(),
        })
    }

    async fn fetch_segment(&self, filename: &str) -> ArchiveResult<Bytes> {
        validate_filename(filename)?;

        let data = read_file(&self.root.join(filename)).await?;
        Ok(Bytes::from(data))
    }
}

async fn read_file(path: &Path) -> ArchiveResult<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ArchiveError::NotFound {
                key: path.display().to_string(),
            }
        } else {
            ArchiveError::FetchFailed {
                key: path.display().to_string(),
                message: format!("failed to read file: {e}"),
            }
        }
    })
}

// -----------------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------------

/// Configuration for the filesystem archive.
#[derive(Debug, Clone)]
pub struct FilesystemConfig {
    /// Base directory holding the hour directories.
    pub base_path: PathBuf,

    /// Whether to call fsync after writes for durability.
    ///
    /// Default: `true` for safety. Set to `false` for faster tests.
    pub sync_on_write: bool,

    /// Create base directory if it doesn't exist.
    ///
    /// Default: `true`.
    pub create_if_missing: bool,
}

impl FilesystemConfig {
    /// Creates a new configuration with the given base path.
    ///
    /// Uses safe defaults: `sync_on_write = true`, `create_if_missing = true`.
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            sync_on_write: true,
            create_if_missing: true,
        }
    }

    /// Creates a configuration optimized for testing (no fsync).
    #[must_use]
    pub fn for_testing(base_path: impl Into<PathBuf>) -> Self {
        Self {
            sync_on_write: false,
            ..Self::new(base_path)
        }
    }
}

// -----------------------------------------------------------------------------
// FilesystemArchiveSink
// -----------------------------------------------------------------------------

/// Hour-partitioned archive on the local filesystem.
#[derive(Debug, Clone)]
pub struct FilesystemArchiveSink {
    config: FilesystemConfig,
}

impl FilesystemArchiveSink {
    /// Creates a new filesystem archive with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `create_if_missing` is true and directory creation fails.
    ///
    /// # Panics
    ///
    /// Panics if `base_path` is empty.
    pub async fn new(config: FilesystemConfig) -> ArchiveResult<Self> {
        assert!(
            !config.base_path.as_os_str().is_empty(),
            "base_path must not be empty"
        );

        if config.create_if_missing {
            tokio::fs::create_dir_all(&config.base_path)
                .await
                .map_err(|e| ArchiveError::Io {
                    operation: "create_base_dir",
                    message: format!(
                        "failed to create base directory '{}': {e}",
                        config.base_path.display()
                    ),
                })?;
        }

        Ok(Self { config })
    }

    /// Returns the directory of a bucket.
    #[must_use]
    pub fn bucket_path(&self, bucket: &BucketKey) -> PathBuf {
        bucket
            .components()
            .fold(self.config.base_path.clone(), |path, part| path.join(part))
    }

    /// Returns the full filesystem path for an archive key.
    fn object_path(&self, key: &ArchiveKey) -> PathBuf {
        key.as_str()
            .split('/')
            .fold(self.config.base_path.clone(), |path, part| path.join(part))
    }

    /// Writes `data` to `path` through a temp file and a rename, so readers
    /// never observe a partially written file.
    async fn write_atomic(&self, key: &ArchiveKey, data: &[u8]) -> ArchiveResult<()> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ArchiveError::Io {
                    operation: "create_bucket_dir",
                    message: format!(
                        "failed to create bucket directory '{}': {e}",
                        parent.display()
                    ),
                })?;
        }

        let temp_path = path.with_extension("tmp");

        let write_result = async {
            let mut file = tokio::fs::File::create(&temp_path)
                .await
                .map_err(|e| ArchiveError::WriteFailed {
                    key: key.to_string(),
                    message: format!("failed to create temp file: {e}"),
                })?;

            tokio::io::AsyncWriteExt::write_all(&mut file, data)
                .await
                .map_err(|e| ArchiveError::WriteFailed {
                    key: key.to_string(),
                    message: format!("failed to write data: {e}"),
                })?;

            if self.config.sync_on_write {
                file.sync_all().await.map_err(|e| ArchiveError::WriteFailed {
                    key: key.to_string(),
                    message: format!("failed to sync file: {e}"),
                })?;
            }

            Ok::<(), ArchiveError>(())
        }
        .await;

        if let Err(e) = write_result {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }

        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| ArchiveError::WriteFailed {
                key: key.to_string(),
                message: format!("failed to rename temp file: {e}"),
            })?;

        debug!(key = %key, size_bytes = data.len(), "Wrote archive object");
        Ok(())
    }
}

#[async_trait]
impl ArchiveSink for FilesystemArchiveSink {
    async fn read_playlist(&self, bucket: &BucketKey) -> ArchiveResult<Option<Playlist>> {
        let key = ArchiveKey::playlist(bucket);
        let path = self.object_path(&key);

        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ArchiveError::Io {
                    operation: "read_playlist",
                    message: format!("failed to read '{}': {e}", path.display()),
                })
            }
        };

        let playlist = vigil_core::parse_reader(data.as_slice()).map_err(|e| ArchiveError::Io {
            operation: "read_playlist",
            message: format!("failed to decode '{}': {e}", path.display()),
        })?;

        Ok(Some(playlist))
    }

    async fn write_playlist(&self, bucket: &BucketKey, playlist: &Playlist) -> ArchiveResult<()> {
        let key = ArchiveKey::playlist(bucket);
        self.write_atomic(&key, vigil_core::serialize(playlist).as_bytes())
            .await
    }

    async fn write_segment(
        &self,
        bucket: &BucketKey,
        filename: &str,
        data: Bytes,
    ) -> ArchiveResult<()> {
        validate_filename(filename).map_err(|_| ArchiveError::WriteFailed {
            key: filename.to_string(),
            message: "segment file name is not a plain file name".to_string(),
        })?;

        let key = ArchiveKey::segment(bucket, filename);
        self.write_atomic(&key, &data).await
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

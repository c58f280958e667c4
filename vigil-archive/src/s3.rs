//! S3-based archive for production deployments.
//!
//! Bucket playlists and segments are stored under
//! `{prefix}{YYYY}/{MM}/{DD}/{HH}/`, the same layout as the filesystem
//! archive. Works with AWS S3 and S3-compatible services (`MinIO`,
//! `LocalStack`) through a custom endpoint and path-style addressing.

use std::env;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response as HttpResponse;
use bytes::Bytes;
use vigil_core::{BucketKey, Playlist};

use crate::error::{ArchiveError, ArchiveResult};
use crate::storage::{ArchiveKey, ArchiveSink};

/// Key prefix used when `VIGIL_S3_PREFIX` is not set.
pub const DEFAULT_KEY_PREFIX: &str = "vigil/archive/";

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

// -----------------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------------

/// Where the S3 archive lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    /// S3 bucket name.
    pub bucket: String,
    /// Prefix prepended to every archive key.
    pub key_prefix: String,
    /// AWS region. Falls back to the SDK's default resolution.
    pub region: Option<String>,
    /// Endpoint of an S3-compatible service.
    pub endpoint_url: Option<String>,
    /// Path-style addressing, needed by `MinIO` and `LocalStack`.
    pub force_path_style: bool,
}

/// Error while loading the S3 configuration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum S3ConfigError {
    /// Required environment variable is missing or empty.
    #[error("missing required environment variable: {0}")]
    MissingEnv(&'static str),
}

impl S3Config {
    /// Creates a configuration for `bucket` with the default prefix.
    #[must_use]
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            region: None,
            endpoint_url: None,
            force_path_style: false,
        }
    }

    /// Loads the configuration from `VIGIL_S3_BUCKET` (required),
    /// `VIGIL_S3_PREFIX`, `VIGIL_S3_REGION`, `VIGIL_S3_ENDPOINT` and
    /// `VIGIL_S3_FORCE_PATH_STYLE` (`true` to enable).
    ///
    /// # Errors
    ///
    /// Returns an error if `VIGIL_S3_BUCKET` is unset or empty.
    pub fn from_env() -> Result<Self, S3ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, S3ConfigError> {
        let bucket = lookup("VIGIL_S3_BUCKET")
            .filter(|bucket| !bucket.is_empty())
            .ok_or(S3ConfigError::MissingEnv("VIGIL_S3_BUCKET"))?;

        let mut config = Self::new(bucket);
        if let Some(prefix) = lookup("VIGIL_S3_PREFIX") {
            config.key_prefix = prefix;
        }
        config.region = lookup("VIGIL_S3_REGION");
        config.endpoint_url = lookup("VIGIL_S3_ENDPOINT");
        config.force_path_style =
            lookup("VIGIL_S3_FORCE_PATH_STYLE").is_some_and(|v| v.eq_ignore_ascii_case("true"));
        Ok(config)
    }
}

// -----------------------------------------------------------------------------
// S3ArchiveSink
// -----------------------------------------------------------------------------

/// Hour-partitioned archive in S3.
#[derive(Clone)]
pub struct S3ArchiveSink {
    client: aws_sdk_s3::Client,
    config: S3Config,
}

impl S3ArchiveSink {
    /// Creates an S3 archive, loading credentials from the standard AWS
    /// credential chain.
    ///
    /// # Panics
    ///
    /// Panics if the bucket name is empty.
    pub async fn new(config: S3Config) -> Self {
        assert!(!config.bucket.is_empty(), "bucket name must not be empty");

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = config.region.clone() {
            loader = loader.region(Region::new(region));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            config,
        }
    }

    fn object_key(&self, key: &ArchiveKey) -> String {
        format!("{}{key}", self.config.key_prefix)
    }

    async fn put(&self, key: &ArchiveKey, data: Bytes, content_type: &str) -> ArchiveResult<()> {
        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(self.object_key(key))
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| ArchiveError::WriteFailed {
                key: key.to_string(),
                message: format!("S3 PutObject failed: {e}"),
            })?;

        Ok(())
    }
}

impl std::fmt::Debug for S3ArchiveSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ArchiveSink")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ArchiveSink for S3ArchiveSink {
    async fn read_playlist(&self, bucket: &BucketKey) -> ArchiveResult<Option<Playlist>> {
        let key = ArchiveKey::playlist(bucket);

        let response = match self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(self.object_key(&key))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if is_not_found_error(&e) => return Ok(None),
            Err(e) => {
                return Err(ArchiveError::Io {
                    operation: "read_playlist",
                    message: format!("S3 GetObject failed for {key}: {e}"),
                })
            }
        };

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| ArchiveError::Io {
                operation: "read_playlist",
                message: format!("failed to read S3 response body for {key}: {e}"),
            })?
            .into_bytes();

        let playlist = vigil_core::parse_reader(&body[..]).map_err(|e| ArchiveError::Io {
            operation: "read_playlist",
            message: format!("{key}: {e}"),
        })?;

        Ok(Some(playlist))
    }

    async fn write_playlist(&self, bucket: &BucketKey, playlist: &Playlist) -> ArchiveResult<()> {
        let data = Bytes::from(vigil_core::serialize(playlist));
        self.put(&ArchiveKey::playlist(bucket), data, PLAYLIST_CONTENT_TYPE)
            .await
    }

    async fn write_segment(
        &self,
        bucket: &BucketKey,
        filename: &str,
        data: Bytes,
    ) -> ArchiveResult<()> {
        assert!(!filename.is_empty(), "segment file name must not be empty");

        self.put(&ArchiveKey::segment(bucket, filename), data, SEGMENT_CONTENT_TYPE)
            .await
    }
}

/// Checks if an AWS SDK error is a 404.
fn is_not_found_error<E>(err: &SdkError<E, HttpResponse>) -> bool {
    match err {
        SdkError::ServiceError(service_err) => service_err.raw().status().as_u16() == 404,
        _ => false,
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

//! HTTP-backed live window.
//!
//! Fetches the playlist and segments from the static file server that fronts
//! the recorder: `GET {base_url}/playlist.m3u8` and `GET {base_url}/{filename}`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use vigil_core::limits::PLAYLIST_FILE_NAME;
use vigil_core::Playlist;

use crate::error::{ArchiveError, ArchiveResult};
use crate::storage::{validate_filename, SegmentSource};

// -----------------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------------

/// Configuration for the HTTP source.
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// URL of the directory holding the live playlist, e.g.
    /// `http://recorder:8080/videos`.
    pub base_url: String,

    /// Per-request timeout in seconds.
    ///
    /// Default: 30 seconds.
    pub timeout_secs: u64,
}

impl HttpSourceConfig {
    /// Creates a new configuration for `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: 30,
        }
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

// -----------------------------------------------------------------------------
// HttpSegmentSource
// -----------------------------------------------------------------------------

/// Reads the live window over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSegmentSource {
    client: reqwest::Client,
    config: HttpSourceConfig,
}

impl HttpSegmentSource {
    /// Creates a new HTTP source.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    ///
    /// # Panics
    ///
    /// Panics if `base_url` is empty or the timeout is zero.
    pub fn new(config: HttpSourceConfig) -> ArchiveResult<Self> {
        assert!(!config.base_url.is_empty(), "base_url must not be empty");
        assert!(config.timeout_secs > 0, "timeout must be positive");

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ArchiveError::Io {
                operation: "build_http_client",
                message: e.to_string(),
            })?;

        Ok(Self { client, config })
    }

    /// Returns the URL of a file under the base URL.
    #[must_use]
    pub fn url(&self, filename: &str) -> String {
        format!("{}/{filename}", self.config.base_url.trim_end_matches('/'))
    }

    async fn get(&self, filename: &str) -> ArchiveResult<Bytes> {
        let url = self.url(filename);
        debug!(url = %url, "Fetching");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ArchiveError::FetchFailed {
                key: url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ArchiveError::NotFound { key: url });
        }
        if !status.is_success() {
            return Err(ArchiveError::Http {
                url,
                status: status.as_u16(),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| ArchiveError::FetchFailed {
                key: url,
                message: format!("failed to read response body: {e}"),
            })
    }
}

#[async_trait]
impl SegmentSource for HttpSegmentSource {
    async fn fetch_playlist(&self) -> ArchiveResult<Playlist> {
        let body = self.get(PLAYLIST_FILE_NAME).await?;

        vigil_core::parse_reader(&body[..]).map_err(|e| ArchiveError::FetchFailed {
            key: self.url(PLAYLIST_FILE_NAME),
            message: e.to_string(),
        })
    }

    async fn fetch_segment(&self, filename: &str) -> ArchiveResult<Bytes> {
        validate_filename(filename)?;
        self.get(filename).await
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

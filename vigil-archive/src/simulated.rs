//! In-memory source and archive with fault injection.
//!
//! Used for deterministic testing of archive runs. Both types are cheap to
//! clone and clones share state, so a test can keep a handle while the
//! engine owns another.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use vigil_core::{BucketKey, Playlist, SegmentRecord};

use crate::error::{ArchiveError, ArchiveResult};
use crate::storage::{ArchiveKey, ArchiveSink, SegmentSource};

// -----------------------------------------------------------------------------
// Deterministic fault RNG
// -----------------------------------------------------------------------------

/// Seeded fault decision source shared by clones.
#[derive(Debug, Clone)]
struct FaultRng {
    seed: u64,
    counter: Arc<AtomicU64>,
}

impl FaultRng {
    fn new(seed: u64) -> Self {
        Self {
            seed,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    fn should_inject(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let hash = self.seed.wrapping_add(counter).wrapping_mul(0x5851_f42d_4c95_7f2d);
        #[allow(clippy::cast_precision_loss)]
        let normalized = (hash as f64) / (u64::MAX as f64);
        normalized < rate
    }
}

fn assert_rate(rate: f64) {
    assert!((0.0..=1.0).contains(&rate), "rate must be in 0.0..=1.0");
}

// -----------------------------------------------------------------------------
// Source fault configuration
// -----------------------------------------------------------------------------

/// Fault injection for [`SimulatedSegmentSource`].
#[derive(Debug, Clone, Default)]
pub struct SourceFaultConfig {
    /// Probability of the playlist fetch failing. Range: 0.0 - 1.0.
    pub playlist_fail_rate: f64,
    /// Probability of a segment fetch failing. Range: 0.0 - 1.0.
    pub segment_fail_rate: f64,
    /// If true, next playlist fetch will fail (one-shot).
    pub force_playlist_fail: bool,
    /// If true, next segment fetch will fail (one-shot).
    pub force_segment_fail: bool,
    /// Segment file names whose fetch always fails.
    pub failing_segments: HashSet<String>,
}

impl SourceFaultConfig {
    /// Creates a fault config with no faults.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets the segment fetch failure rate.
    ///
    /// # Panics
    ///
    /// Panics if rate is not in range 0.0..=1.0.
    #[must_use]
    pub fn with_segment_fail_rate(mut self, rate: f64) -> Self {
        assert_rate(rate);
        self.segment_fail_rate = rate;
        self
    }

    /// Sets the playlist fetch failure rate.
    ///
    /// # Panics
    ///
    /// Panics if rate is not in range 0.0..=1.0.
    #[must_use]
    pub fn with_playlist_fail_rate(mut self, rate: f64) -> Self {
        assert_rate(rate);
        self.playlist_fail_rate = rate;
        self
    }

    /// Forces the next segment fetch to fail.
    #[must_use]
    pub const fn with_force_segment_fail(mut self) -> Self {
        self.force_segment_fail = true;
        self
    }

    /// Forces the next playlist fetch to fail.
    #[must_use]
    pub const fn with_force_playlist_fail(mut self) -> Self {
        self.force_playlist_fail = true;
        self
    }

    /// Makes every fetch of `filename` fail.
    #[must_use]
    pub fn with_failing_segment(mut self, filename: impl Into<String>) -> Self {
        self.failing_segments.insert(filename.into());
        self
    }
}

// -----------------------------------------------------------------------------
// SimulatedSegmentSource
// -----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SourceState {
    playlist: Option<Playlist>,
    segments: HashMap<String, Bytes>,
    segment_fetches: u64,
}

/// In-memory live window.
#[derive(Debug, Clone)]
pub struct SimulatedSegmentSource {
    state: Arc<Mutex<SourceState>>,
    fault_config: Arc<Mutex<SourceFaultConfig>>,
    rng: FaultRng,
}

impl SimulatedSegmentSource {
    /// Creates an empty source with no playlist and no faults.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_faults(seed, SourceFaultConfig::none())
    }

    /// Creates an empty source with the given fault configuration.
    #[must_use]
    pub fn with_faults(seed: u64, fault_config: SourceFaultConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(SourceState::default())),
            fault_config: Arc::new(Mutex::new(fault_config)),
            rng: FaultRng::new(seed),
        }
    }

    /// Returns the fault configuration for modification.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn fault_config(&self) -> MutexGuard<'_, SourceFaultConfig> {
        self.fault_config.lock().expect("fault config lock poisoned")
    }

    /// Replaces the live playlist. Segment content is left as is.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn set_playlist(&self, playlist: Playlist) {
        let mut state = self.state.lock().expect("state lock poisoned");
        state.playlist = Some(playlist);
    }

    /// Appends a record to the live playlist and stores its content.
    ///
    /// Creates a default playlist if none is set.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned or the file name is already listed.
    pub fn push_segment(&self, record: SegmentRecord, data: impl Into<Bytes>) {
        let mut state = self.state.lock().expect("state lock poisoned");
        state.segments.insert(record.filename.clone(), data.into());
        state.playlist.get_or_insert_with(Playlist::default).push(record);
    }

    /// Drops the oldest `count` records from the live playlist, as the
    /// recorder does when the rolling window advances.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn evict_oldest(&self, count: usize) {
        let mut guard = self.state.lock().expect("state lock poisoned");
        let state = &mut *guard;
        if let Some(playlist) = state.playlist.as_mut() {
            let count = count.min(playlist.segments.len());
            for record in playlist.segments.drain(..count) {
                state.segments.remove(&record.filename);
            }
        }
    }

    /// Returns how many segment fetches have been attempted.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn segment_fetch_count(&self) -> u64 {
        self.state.lock().expect("state lock poisoned").segment_fetches
    }
}

// Allow significant_drop_tightening since this is test-only simulation code.
#[allow(clippy::significant_drop_tightening)]
#[async_trait]
impl SegmentSource for SimulatedSegmentSource {
    async fn fetch_playlist(&self) -> ArchiveResult<Playlist> {
        let mut config = self.fault_config.lock().expect("fault config lock poisoned");
        if config.force_playlist_fail {
            config.force_playlist_fail = false;
            drop(config);
            return Err(ArchiveError::FetchFailed {
                key: "playlist".to_string(),
                message: "simulated playlist failure (forced)".to_string(),
            });
        }
        let playlist_fail_rate = config.playlist_fail_rate;
        drop(config);

        if self.rng.should_inject(playlist_fail_rate) {
            return Err(ArchiveError::FetchFailed {
                key: "playlist".to_string(),
                message: "simulated playlist failure (random)".to_string(),
            });
        }

        let state = self.state.lock().expect("state lock poisoned");
        state.playlist.clone().ok_or_else(|| ArchiveError::NotFound {
            key: "playlist".to_string(),
        })
    }

    async fn fetch_segment(&self, filename: &str) -> ArchiveResult<Bytes> {
        assert!(!filename.is_empty(), "segment file name must not be empty");

        self.state.lock().expect("state lock poisoned").segment_fetches += 1;

        let mut config = self.fault_config.lock().expect("fault config lock poisoned");
        let forced = std::mem::take(&mut config.force_segment_fail);
        let listed = config.failing_segments.contains(filename);
        let segment_fail_rate = config.segment_fail_rate;
        drop(config);

        if forced || listed || self.rng.should_inject(segment_fail_rate) {
            return Err(ArchiveError::FetchFailed {
                key: filename.to_string(),
                message: "simulated segment fetch failure".to_string(),
            });
        }

        let state = self.state.lock().expect("state lock poisoned");
        state
            .segments
            .get(filename)
            .cloned()
            .ok_or_else(|| ArchiveError::NotFound {
                key: filename.to_string(),
            })
    }
}

// -----------------------------------------------------------------------------
// Sink fault configuration
// -----------------------------------------------------------------------------

/// Fault injection for [`SimulatedArchiveSink`].
#[derive(Debug, Clone, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct SinkFaultConfig {
    /// Probability of a playlist read failing. Range: 0.0 - 1.0.
    pub read_fail_rate: f64,
    /// Probability of a segment write failing. Range: 0.0 - 1.0.
    pub segment_write_fail_rate: f64,
    /// Probability of a playlist write failing. Range: 0.0 - 1.0.
    pub playlist_write_fail_rate: f64,
    /// If true, next playlist read will fail (one-shot).
    pub force_read_fail: bool,
    /// If true, next segment write will fail (one-shot).
    pub force_segment_write_fail: bool,
    /// If true, next playlist write will fail (one-shot).
    pub force_playlist_write_fail: bool,
    /// If true, every playlist write fails.
    pub read_only_playlists: bool,
}

impl SinkFaultConfig {
    /// Creates a fault config with no faults.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets the segment write failure rate.
    ///
    /// # Panics
    ///
    /// Panics if rate is not in range 0.0..=1.0.
    #[must_use]
    pub fn with_segment_write_fail_rate(mut self, rate: f64) -> Self {
        assert_rate(rate);
        self.segment_write_fail_rate = rate;
        self
    }

    /// Sets the playlist read failure rate.
    ///
    /// # Panics
    ///
    /// Panics if rate is not in range 0.0..=1.0.
    #[must_use]
    pub fn with_read_fail_rate(mut self, rate: f64) -> Self {
        assert_rate(rate);
        self.read_fail_rate = rate;
        self
    }

    /// Sets the playlist write failure rate.
    ///
    /// # Panics
    ///
    /// Panics if rate is not in range 0.0..=1.0.
    #[must_use]
    pub fn with_playlist_write_fail_rate(mut self, rate: f64) -> Self {
        assert_rate(rate);
        self.playlist_write_fail_rate = rate;
        self
    }

    /// Makes every playlist write fail until cleared.
    #[must_use]
    pub const fn with_read_only_playlists(mut self) -> Self {
        self.read_only_playlists = true;
        self
    }

    /// Forces the next playlist read to fail.
    #[must_use]
    pub const fn with_force_read_fail(mut self) -> Self {
        self.force_read_fail = true;
        self
    }

    /// Forces the next segment write to fail.
    #[must_use]
    pub const fn with_force_segment_write_fail(mut self) -> Self {
        self.force_segment_write_fail = true;
        self
    }

    /// Forces the next playlist write to fail.
    #[must_use]
    pub const fn with_force_playlist_write_fail(mut self) -> Self {
        self.force_playlist_write_fail = true;
        self
    }
}

// -----------------------------------------------------------------------------
// SimulatedArchiveSink
// -----------------------------------------------------------------------------

/// In-memory archive.
///
/// Playlists are stored as serialized text and parsed back on every read,
/// exactly like the persistent backends.
#[derive(Debug, Clone)]
pub struct SimulatedArchiveSink {
    objects: Arc<Mutex<BTreeMap<ArchiveKey, Bytes>>>,
    fault_config: Arc<Mutex<SinkFaultConfig>>,
    rng: FaultRng,
}

impl SimulatedArchiveSink {
    /// Creates an empty archive with no faults.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_faults(seed, SinkFaultConfig::none())
    }

    /// Creates an empty archive with the given fault configuration.
    #[must_use]
    pub fn with_faults(seed: u64, fault_config: SinkFaultConfig) -> Self {
        Self {
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            fault_config: Arc::new(Mutex::new(fault_config)),
            rng: FaultRng::new(seed),
        }
    }

    /// Returns the fault configuration for modification.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn fault_config(&self) -> MutexGuard<'_, SinkFaultConfig> {
        self.fault_config.lock().expect("fault config lock poisoned")
    }

    /// Returns a bucket's playlist, bypassing fault injection.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn playlist(&self, bucket: &BucketKey) -> Option<Playlist> {
        let objects = self.objects.lock().expect("objects lock poisoned");
        objects
            .get(&ArchiveKey::playlist(bucket))
            .map(|raw| vigil_core::parse(&String::from_utf8_lossy(raw)))
    }

    /// Returns stored segment content, bypassing fault injection.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn segment(&self, bucket: &BucketKey, filename: &str) -> Option<Bytes> {
        let objects = self.objects.lock().expect("objects lock poisoned");
        objects.get(&ArchiveKey::segment(bucket, filename)).cloned()
    }

    /// Stores raw bytes under a key, bypassing fault injection.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    pub fn set_raw_content(&self, key: &ArchiveKey, data: impl Into<Bytes>) {
        let mut objects = self.objects.lock().expect("objects lock poisoned");
        objects.insert(key.clone(), data.into());
    }

    /// Returns all stored keys in sorted order.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn keys(&self) -> Vec<ArchiveKey> {
        let objects = self.objects.lock().expect("objects lock poisoned");
        objects.keys().cloned().collect()
    }

    /// Returns the number of stored objects.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.lock().expect("objects lock poisoned").len()
    }
}

// Allow significant_drop_tightening since this is test-only simulation code.
#[allow(clippy::significant_drop_tightening)]
#[async_trait]
impl ArchiveSink for SimulatedArchiveSink {
    async fn read_playlist(&self, bucket: &BucketKey) -> ArchiveResult<Option<Playlist>> {
        let mut config = self.fault_config.lock().expect("fault config lock poisoned");
        let forced = std::mem::take(&mut config.force_read_fail);
        let read_fail_rate = config.read_fail_rate;
        drop(config);

        let key = ArchiveKey::playlist(bucket);
        if forced || self.rng.should_inject(read_fail_rate) {
            return Err(ArchiveError::Io {
                operation: "read_playlist",
                message: format!("simulated read failure for {key}"),
            });
        }

        let objects = self.objects.lock().expect("objects lock poisoned");
        let Some(raw) = objects.get(&key) else {
            return Ok(None);
        };
        let playlist = vigil_core::parse_reader(&raw[..]).map_err(|e| ArchiveError::Io {
            operation: "read_playlist",
            message: format!("{key}: {e}"),
        })?;
        Ok(Some(playlist))
    }

    async fn write_playlist(&self, bucket: &BucketKey, playlist: &Playlist) -> ArchiveResult<()> {
        let mut config = self.fault_config.lock().expect("fault config lock poisoned");
        let forced = std::mem::take(&mut config.force_playlist_write_fail);
        let read_only = config.read_only_playlists;
        let playlist_write_fail_rate = config.playlist_write_fail_rate;
        drop(config);

        let key = ArchiveKey::playlist(bucket);
        if forced || read_only || self.rng.should_inject(playlist_write_fail_rate) {
            return Err(ArchiveError::WriteFailed {
                key: key.to_string(),
                message: "simulated playlist write failure".to_string(),
            });
        }

        let mut objects = self.objects.lock().expect("objects lock poisoned");
        objects.insert(key, Bytes::from(vigil_core::serialize(playlist)));
        Ok(())
    }

    async fn write_segment(
        &self,
        bucket: &BucketKey,
        filename: &str,
        data: Bytes,
    ) -> ArchiveResult<()> {
        assert!(!filename.is_empty(), "segment file name must not be empty");

        let mut config = self.fault_config.lock().expect("fault config lock poisoned");
        let forced = std::mem::take(&mut config.force_segment_write_fail);
        let segment_write_fail_rate = config.segment_write_fail_rate;
        drop(config);

        let key = ArchiveKey::segment(bucket, filename);
        if forced || self.rng.should_inject(segment_write_fail_rate) {
            return Err(ArchiveError::WriteFailed {
                key: key.to_string(),
                message: "simulated segment write failure".to_string(),
            });
        }

        let data_len = data.len();
        let mut objects = self.objects.lock().expect("objects lock poisoned");
        objects.insert(key.clone(), data);

        // Postcondition: data was stored.
        assert!(
            objects.get(&key).is_some_and(|v| v.len() == data_len),
            "data should be stored after write"
        );
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

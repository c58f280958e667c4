//! Hour-granularity archive buckets.

use std::fmt;

use chrono::{DateTime, Datelike, FixedOffset, Timelike};

/// Archive partition for one clock hour: `YYYY/MM/DD/HH`.
///
/// The key is computed in the offset the timestamp was recorded with, so the
/// layout follows the recorder's wall clock. It is used both as the storage
/// prefix of a bucket and as its identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey(String);

impl BucketKey {
    /// Returns the bucket a timestamp falls into.
    #[must_use]
    pub fn from_timestamp(timestamp: &DateTime<FixedOffset>) -> Self {
        Self(format!(
            "{}/{:02}/{:02}/{:02}",
            timestamp.year(),
            timestamp.month(),
            timestamp.day(),
            timestamp.hour()
        ))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the path components of the key: year, month, day, hour.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

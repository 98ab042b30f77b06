//! Cache entries as observed by readers and subscribers.

use std::fmt;
use std::sync::Arc;

use time::OffsetDateTime;

use super::fetcher::FetchError;
use super::keys::ResourceKey;

/// Fetch/revalidation status of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Never fetched.
    Idle,
    /// A fetch is outstanding.
    Fetching,
    /// The last fetch succeeded and nothing invalidated it since.
    Fresh,
    /// Invalidated; the value (if any) is out of date.
    Stale,
    /// The last fetch failed; `value` still holds the last good value.
    Errored,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Idle => "idle",
            EntryStatus::Fetching => "fetching",
            EntryStatus::Fresh => "fresh",
            EntryStatus::Stale => "stale",
            EntryStatus::Errored => "errored",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of a cache entry.
///
/// `version` grows by one for every applied fetch result, so two snapshots of
/// the same key with equal versions carry the same value.
#[derive(Debug)]
pub struct CacheEntry<V> {
    pub key: ResourceKey,
    pub value: Option<Arc<V>>,
    pub status: EntryStatus,
    pub last_error: Option<FetchError>,
    pub version: u64,
    pub updated_at: Option<OffsetDateTime>,
}

impl<V> CacheEntry<V> {
    pub(crate) fn idle(key: ResourceKey) -> Self {
        Self {
            key,
            value: None,
            status: EntryStatus::Idle,
            last_error: None,
            version: 0,
            updated_at: None,
        }
    }

    pub fn value(&self) -> Option<&V> {
        self.value.as_deref()
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

impl<V> Clone for CacheEntry<V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            value: self.value.clone(),
            status: self.status,
            last_error: self.last_error.clone(),
            version: self.version,
            updated_at: self.updated_at,
        }
    }
}

//! Cache entries with explicit staleness metadata.
//!
//! An entry is fresh only between a successful fetch and the end of its
//! time-to-live, and only until someone invalidates it. Optimistic writes
//! replace the data but never extend freshness: only the server can make an
//! entry fresh.

use super::key::CacheKey;
use super::value::{CacheValue, CacheableView};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Snapshot of one cache key.
///
/// Entries are immutable once built. The store swaps whole entries, so a
/// reader holding a clone never observes a half-applied update.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    key: CacheKey,
    data: Arc<CacheValue>,
    /// When the data was last fetched from the server, `None` if never.
    fetched_at: Option<Instant>,
    /// End of the time-to-live granted by the last fetch.
    fresh_until: Option<Instant>,
    /// Set by `invalidate`, cleared by the next fetch.
    invalidated: bool,
    /// Store write counter at the time this entry was produced.
    version: u64,
}

impl CacheEntry {
    /// Entry produced by a successful fetch.
    pub(crate) fn fetched(key: CacheKey, data: CacheValue, ttl: Duration, version: u64) -> Self {
        let now = Instant::now();
        Self {
            key,
            data: Arc::new(data),
            fetched_at: Some(now),
            fresh_until: Some(now + ttl),
            invalidated: false,
            version,
        }
    }

    /// Entry created by a local write on an absent key. Stale from birth.
    pub(crate) fn local(key: CacheKey, data: CacheValue, version: u64) -> Self {
        Self {
            key,
            data: Arc::new(data),
            fetched_at: None,
            fresh_until: None,
            invalidated: false,
            version,
        }
    }

    /// Same freshness metadata, new data.
    pub(crate) fn replaced(&self, data: CacheValue, version: u64) -> Self {
        Self {
            data: Arc::new(data),
            version,
            ..self.clone()
        }
    }

    pub(crate) fn into_invalidated(mut self, version: u64) -> Self {
        self.invalidated = true;
        self.version = version;
        self
    }

    pub fn key(&self) -> CacheKey {
        self.key
    }

    pub fn data(&self) -> &CacheValue {
        &self.data
    }

    /// Shared handle to the payload.
    pub fn shared_data(&self) -> Arc<CacheValue> {
        Arc::clone(&self.data)
    }

    /// Borrow the payload as a typed view.
    pub fn view<T: CacheableView>(&self) -> Option<&T> {
        T::peek(&self.data)
    }

    pub fn fetched_at(&self) -> Option<Instant> {
        self.fetched_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    /// Check staleness as of `now`.
    pub fn is_stale_at(&self, now: Instant) -> bool {
        if self.invalidated {
            return true;
        }
        match self.fresh_until {
            Some(fresh_until) => now >= fresh_until,
            None => true,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Instant::now())
    }

    /// Time since the last fetch, `None` if the entry was never fetched.
    pub fn staleness(&self) -> Option<Duration> {
        self.fetched_at.map(|fetched_at| fetched_at.elapsed())
    }
}

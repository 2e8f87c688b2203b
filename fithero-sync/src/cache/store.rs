//! Process-wide keyed cache store.

use super::entry::CacheEntry;
use super::key::CacheKey;
use super::value::{CacheValue, CacheableView};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

/// Keyed store of view snapshots.
///
/// All operations are synchronous. A `write` swaps the entry and signals every
/// subscriber of the key before it returns, so an optimistic update is visible
/// to the very next read anywhere in the process.
///
/// The store is not reentrant: updaters passed to [`CacheStore::write`] run
/// under the store lock and must not call back into the store.
///
/// Keys can be leased by a pending mutation. While a key is leased, or once
/// it has been leased after a fetch started, that fetch's result is discarded
/// by [`CacheStore::store_fetched_if_current`] so that server data never lands
/// underneath optimistic writes.
#[derive(Clone, Default)]
pub struct CacheStore {
    inner: Arc<Mutex<StoreInner>>,
}

#[derive(Default)]
struct StoreInner {
    slots: HashMap<CacheKey, Slot>,
    /// Monotonic counter bumped by every mutation of any key.
    version: u64,
}

struct Slot {
    entry: Option<CacheEntry>,
    signal: watch::Sender<u64>,
    leased: bool,
    /// Bumped every time the key is leased.
    lease_epoch: u64,
}

impl Slot {
    fn empty() -> Self {
        Self {
            entry: None,
            signal: watch::Sender::new(0),
            leased: false,
            lease_epoch: 0,
        }
    }
}

/// Lease state of a key at the moment a fetch was issued.
///
/// Taken with [`CacheStore::begin_fetch`] before the request goes out and
/// handed back with the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    key: CacheKey,
    lease_epoch: u64,
    leased: bool,
}

impl FetchTicket {
    pub fn key(&self) -> CacheKey {
        self.key
    }
}

impl StoreInner {
    fn slot(&mut self, key: CacheKey) -> &mut Slot {
        self.slots.entry(key).or_insert_with(Slot::empty)
    }

    fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current entry for `key`, if any.
    pub fn read(&self, key: CacheKey) -> Option<CacheEntry> {
        self.lock()
            .slots
            .get(&key)
            .and_then(|slot| slot.entry.clone())
    }

    /// Typed clone of the current data for `key`.
    pub fn view<T: CacheableView>(&self, key: CacheKey) -> Option<T> {
        self.read(key).and_then(|entry| entry.view::<T>().cloned())
    }

    /// Replace the data for `key` with the updater's result.
    ///
    /// The updater receives the current data (or `None` when the key is
    /// absent) and returns the full new value, or `None` to leave the key
    /// untouched. Freshness metadata is preserved: a local write never makes
    /// an entry fresh. Returns whether the key was written.
    pub fn write<F>(&self, key: CacheKey, updater: F) -> bool
    where
        F: FnOnce(Option<&CacheValue>) -> Option<CacheValue>,
    {
        let mut inner = self.lock();
        let current = inner.slots.get(&key).and_then(|slot| slot.entry.clone());
        let Some(next) = updater(current.as_ref().map(CacheEntry::data)) else {
            return false;
        };

        let version = inner.next_version();
        let entry = match current {
            Some(entry) => entry.replaced(next, version),
            None => CacheEntry::local(key, next, version),
        };
        let slot = inner.slot(key);
        slot.entry = Some(entry);
        slot.signal.send_replace(version);
        tracing::trace!(key = %key, version, "Cache entry written");
        true
    }

    /// Store data freshly fetched from the server, fresh for `ttl`.
    pub fn store_fetched(&self, key: CacheKey, value: CacheValue, ttl: Duration) {
        let mut inner = self.lock();
        let version = inner.next_version();
        let slot = inner.slot(key);
        slot.entry = Some(CacheEntry::fetched(key, value, ttl, version));
        slot.signal.send_replace(version);
        tracing::trace!(key = %key, version, ttl_ms = ttl.as_millis() as u64, "Cache entry fetched");
    }

    /// Record the lease state of `key` before fetching it.
    pub fn begin_fetch(&self, key: CacheKey) -> FetchTicket {
        let mut inner = self.lock();
        let slot = inner.slot(key);
        FetchTicket {
            key,
            lease_epoch: slot.lease_epoch,
            leased: slot.leased,
        }
    }

    /// Store a fetch result unless a mutation held the key at any point
    /// since `ticket` was taken.
    ///
    /// A discarded result marks the current entry stale without waking
    /// subscribers: the mutation's reconciliation refetches it later.
    /// Returns whether the result was stored.
    pub fn store_fetched_if_current(
        &self,
        ticket: FetchTicket,
        value: CacheValue,
        ttl: Duration,
    ) -> bool {
        let key = ticket.key;
        let mut inner = self.lock();
        let slot = inner.slot(key);
        let overlapped = ticket.leased || slot.leased || slot.lease_epoch != ticket.lease_epoch;
        let version = inner.next_version();
        let slot = inner.slot(key);
        if overlapped {
            if let Some(entry) = slot.entry.take() {
                slot.entry = Some(entry.into_invalidated(version));
            }
            tracing::debug!(key = %key, "Fetch overlapped a pending mutation, result discarded");
            return false;
        }

        slot.entry = Some(CacheEntry::fetched(key, value, ttl, version));
        slot.signal.send_replace(version);
        tracing::trace!(key = %key, version, ttl_ms = ttl.as_millis() as u64, "Cache entry fetched");
        true
    }

    /// Lease every key in `keys`, or none of them.
    ///
    /// On conflict returns the first key already leased.
    pub(crate) fn try_lease(&self, keys: &[CacheKey]) -> Result<(), CacheKey> {
        let mut inner = self.lock();
        if let Some(busy) = keys
            .iter()
            .find(|key| inner.slots.get(*key).is_some_and(|slot| slot.leased))
        {
            return Err(*busy);
        }
        for key in keys {
            let slot = inner.slot(*key);
            slot.leased = true;
            slot.lease_epoch += 1;
        }
        Ok(())
    }

    pub(crate) fn release(&self, keys: &[CacheKey]) {
        let mut inner = self.lock();
        for key in keys {
            if let Some(slot) = inner.slots.get_mut(key) {
                slot.leased = false;
            }
        }
    }

    pub fn is_leased(&self, key: CacheKey) -> bool {
        self.lock().slots.get(&key).is_some_and(|slot| slot.leased)
    }

    /// Keys currently leased by pending mutations.
    pub fn leased(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self
            .lock()
            .slots
            .iter()
            .filter(|(_, slot)| slot.leased)
            .map(|(key, _)| *key)
            .collect();
        keys.sort();
        keys
    }

    /// Mark `key` stale and wake its subscribers so active readers refetch.
    ///
    /// Returns false when there is nothing cached under `key`.
    pub fn invalidate(&self, key: CacheKey) -> bool {
        let mut inner = self.lock();
        let Some(entry) = inner.slots.get(&key).and_then(|slot| slot.entry.clone()) else {
            return false;
        };
        let version = inner.next_version();
        let slot = inner.slot(key);
        slot.entry = Some(entry.into_invalidated(version));
        slot.signal.send_replace(version);
        tracing::debug!(key = %key, version, "Cache entry invalidated");
        true
    }

    /// True when `key` is absent or its entry is stale.
    pub fn is_stale(&self, key: CacheKey) -> bool {
        self.read(key).map(|entry| entry.is_stale()).unwrap_or(true)
    }

    pub fn contains(&self, key: CacheKey) -> bool {
        self.read(key).is_some()
    }

    /// Keys that currently hold data.
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self
            .lock()
            .slots
            .iter()
            .filter(|(_, slot)| slot.entry.is_some())
            .map(|(key, _)| *key)
            .collect();
        keys.sort();
        keys
    }

    /// Subscribe to changes of `key`, including keys not cached yet.
    pub fn subscribe(&self, key: CacheKey) -> Subscription {
        let receiver = self.lock().slot(key).signal.subscribe();
        Subscription {
            key,
            store: self.clone(),
            receiver,
        }
    }

    /// Number of live subscriptions on `key`.
    pub fn subscriber_count(&self, key: CacheKey) -> usize {
        self.lock()
            .slots
            .get(&key)
            .map(|slot| slot.signal.receiver_count())
            .unwrap_or(0)
    }
}

/// Live subscription to one cache key.
pub struct Subscription {
    key: CacheKey,
    store: CacheStore,
    receiver: watch::Receiver<u64>,
}

impl Subscription {
    pub fn key(&self) -> CacheKey {
        self.key
    }

    /// Wait for the next write or invalidation of the key.
    ///
    /// Returns false only if the store has been dropped.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    /// True when the key changed since the last call to `changed` or `current`.
    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    /// Current entry, marking the change as seen.
    pub fn current(&mut self) -> Option<CacheEntry> {
        let _ = self.receiver.borrow_and_update();
        self.store.read(self.key)
    }
}

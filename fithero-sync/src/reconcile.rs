//! Delayed invalidation of keys touched by a mutation.

use crate::cache::{CacheKey, CacheStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// One-shot invalidation timers, at most one per key.
///
/// Scheduling a key that already has a timer re-arms it: the old timer is
/// aborted and the key is invalidated once, `delay` after the last call.
#[derive(Clone)]
pub struct ReconciliationScheduler {
    store: CacheStore,
    delay: Duration,
    timers: Arc<Mutex<Timers>>,
}

#[derive(Default)]
struct Timers {
    armed: HashMap<CacheKey, Timer>,
    generation: u64,
}

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

impl ReconciliationScheduler {
    pub fn new(store: CacheStore, delay: Duration) -> Self {
        Self {
            store,
            delay,
            timers: Arc::new(Mutex::new(Timers::default())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn lock(&self) -> MutexGuard<'_, Timers> {
        lock_timers(&self.timers)
    }

    /// Arm timers for `keys` with the default delay.
    pub fn schedule(&self, keys: &[CacheKey]) {
        self.schedule_after(keys, self.delay);
    }

    pub fn schedule_after(&self, keys: &[CacheKey], delay: Duration) {
        let mut timers = self.lock();
        for &key in keys {
            timers.generation += 1;
            let generation = timers.generation;
            let store = self.store.clone();
            let shared = Arc::clone(&self.timers);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let mut timers = lock_timers(&shared);
                // A newer timer for the key may have replaced this one after it woke.
                let current = timers
                    .armed
                    .get(&key)
                    .is_some_and(|timer| timer.generation == generation);
                if current {
                    timers.armed.remove(&key);
                    drop(timers);
                    store.invalidate(key);
                    debug!(key = %key, "Reconciliation fired");
                }
            });

            if let Some(previous) = timers.armed.insert(key, Timer { generation, handle }) {
                previous.handle.abort();
                debug!(key = %key, delay_ms = delay.as_millis() as u64, "Reconciliation re-armed");
            } else {
                debug!(key = %key, delay_ms = delay.as_millis() as u64, "Reconciliation armed");
            }
        }
    }

    pub fn is_pending(&self, key: CacheKey) -> bool {
        self.lock().armed.contains_key(&key)
    }

    /// Keys with an armed timer.
    pub fn pending(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.lock().armed.keys().copied().collect();
        keys.sort();
        keys
    }

    /// Disarm every timer without invalidating anything.
    pub fn cancel_all(&self) {
        for (_, timer) in self.lock().armed.drain() {
            timer.handle.abort();
        }
    }
}

fn lock_timers(timers: &Mutex<Timers>) -> MutexGuard<'_, Timers> {
    timers.lock().unwrap_or_else(PoisonError::into_inner)
}

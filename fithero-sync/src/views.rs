//! View readers: fetch-or-return-cached access to one cache key.
//!
//! A reader never keeps a private copy of the data. Every [`ViewState`] it
//! returns is built from the store at the time of the call, so optimistic
//! writes show up in the next read without any extra wiring.

use crate::cache::{CacheKey, CacheStore, CacheValue, CacheableView};
use crate::config::ViewTtls;
use fithero_core::{ApiError, ApiResult};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type SharedFetch = Shared<BoxFuture<'static, Result<(), ApiError>>>;

/// What a view exposes to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState<T> {
    /// Last known data, possibly stale.
    pub data: Option<T>,
    /// A fetch for the key is in flight.
    pub is_loading: bool,
    /// Error of the last fetch, cleared by the next successful one.
    pub error: Option<ApiError>,
}

impl<T> ViewState<T> {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn map<U, F>(self, f: F) -> ViewState<U>
    where
        F: FnOnce(T) -> U,
    {
        ViewState {
            data: self.data.map(f),
            is_loading: self.is_loading,
            error: self.error,
        }
    }
}

/// Reader over the shared cache store.
///
/// Concurrent reads of the same key share a single in-flight fetch. The fetch
/// runs on its own task, so it completes and populates the store even if
/// every caller waiting on it goes away.
#[derive(Clone)]
pub struct ViewReader {
    store: CacheStore,
    ttls: ViewTtls,
    inner: Arc<Mutex<ReaderInner>>,
}

#[derive(Default)]
struct ReaderInner {
    in_flight: HashMap<CacheKey, SharedFetch>,
    errors: HashMap<CacheKey, ApiError>,
}

impl ViewReader {
    pub fn new(store: CacheStore, ttls: ViewTtls) -> Self {
        Self {
            store,
            ttls,
            inner: Arc::new(Mutex::new(ReaderInner::default())),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    fn lock(&self) -> MutexGuard<'_, ReaderInner> {
        lock_inner(&self.inner)
    }

    /// Current state of `key` without fetching.
    pub fn snapshot<T: CacheableView>(&self, key: CacheKey) -> ViewState<T> {
        let data = self
            .store
            .read(key)
            .and_then(|entry| entry.view::<T>().cloned());
        let inner = self.lock();
        ViewState {
            data,
            is_loading: inner.in_flight.contains_key(&key),
            error: inner.errors.get(&key).cloned(),
        }
    }

    pub fn is_loading(&self, key: CacheKey) -> bool {
        self.lock().in_flight.contains_key(&key)
    }

    /// Return fresh cached data, or fetch it.
    ///
    /// A fresh entry is returned as-is. An absent or stale entry triggers a
    /// fetch, joined with any fetch already in flight for the same key. On
    /// failure the stale data, if any, is returned together with the error.
    pub async fn read<T, F, Fut>(&self, key: CacheKey, fetch: F) -> ViewState<T>
    where
        T: CacheableView,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        if !self.store.is_stale(key) {
            return self.snapshot(key);
        }
        let pending = self.join_or_start(key, fetch);
        let _ = pending.await;
        self.snapshot(key)
    }

    /// Invalidate `key` and read it again.
    pub async fn refresh<T, F, Fut>(&self, key: CacheKey, fetch: F) -> ViewState<T>
    where
        T: CacheableView,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        self.store.invalidate(key);
        self.read(key, fetch).await
    }

    fn join_or_start<T, F, Fut>(&self, key: CacheKey, fetch: F) -> SharedFetch
    where
        T: CacheableView,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let mut inner = self.lock();
        if let Some(existing) = inner.in_flight.get(&key) {
            debug!(key = %key, "Joining in-flight fetch");
            return existing.clone();
        }

        debug!(key = %key, "Fetching view");
        let ticket = self.store.begin_fetch(key);
        let request = fetch();
        let store = self.store.clone();
        let ttl = self.ttls.for_key(key);
        let reader = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let result = request.await;
            match result {
                Ok(value) => {
                    let value: CacheValue = value.wrap();
                    store.store_fetched_if_current(ticket, value, ttl);
                    let mut inner = lock_inner(&reader);
                    inner.errors.remove(&key);
                    inner.in_flight.remove(&key);
                    Ok(())
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "View fetch failed");
                    let mut inner = lock_inner(&reader);
                    inner.errors.insert(key, err.clone());
                    inner.in_flight.remove(&key);
                    Err(err)
                }
            }
        });

        let shared = async move {
            match task.await {
                Ok(result) => result,
                Err(join_err) => Err(ApiError::Transport {
                    reason: join_err.to_string(),
                }),
            }
        }
        .boxed()
        .shared();
        inner.in_flight.insert(key, shared.clone());
        shared
    }

    /// Keep `key` populated while the returned handle is alive.
    ///
    /// The key is read immediately if stale, then re-read every time it is
    /// invalidated. Dropping the handle stops the background task.
    pub fn keep_fresh<T, F, Fut>(&self, key: CacheKey, fetch: F) -> ActiveView
    where
        T: CacheableView,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let reader = self.clone();
        let mut subscription = self.store.subscribe(key);
        let task = tokio::spawn(async move {
            loop {
                if reader.store.is_stale(key) {
                    let _: ViewState<T> = reader.read(key, &fetch).await;
                }
                if !subscription.changed().await {
                    break;
                }
            }
        });
        ActiveView { key, task }
    }
}

fn lock_inner(inner: &Mutex<ReaderInner>) -> MutexGuard<'_, ReaderInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Background subscription created by [`ViewReader::keep_fresh`].
pub struct ActiveView {
    key: CacheKey,
    task: JoinHandle<()>,
}

impl ActiveView {
    pub fn key(&self) -> CacheKey {
        self.key
    }
}

impl Drop for ActiveView {
    fn drop(&mut self) {
        self.task.abort();
    }
}

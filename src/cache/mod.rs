use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;
use tracing::{debug, error};

use crate::error::AuthQueryError;

/// Ordered sequence of opaque tokens addressing one cached resource
/// collection. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(Vec<String>);

impl CacheKey {
    /// Build a key from its parts.
    ///
    /// # Panics
    ///
    /// Panics if `parts` is empty; an empty key cannot address anything and
    /// indicates a bug at the call site.
    #[must_use]
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        assert!(!parts.is_empty(), "cache key must not be empty");
        Self(parts)
    }

    #[must_use]
    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Async closure producing the authoritative value for a key.
pub type Fetcher = dyn Fn() -> BoxFuture<Result<Value, AuthQueryError>> + Send + Sync;

type ErrorHook = dyn Fn(&AuthQueryError, &CacheKey) + Send + Sync;

#[derive(Default)]
struct Entry {
    value: Option<Value>,
    fetcher: Option<Arc<Fetcher>>,
    // (token, handle) of the in-flight refetch task, so a superseded refetch
    // cannot clear its successor's handle on cleanup.
    pending: Option<(u64, AbortHandle)>,
    // Bumped on every optimistic install; rollback applies only when the
    // entry still carries the installing attempt's sequence.
    mutation_seq: u64,
}

struct Inner {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    error_hook: Mutex<Option<Box<ErrorHook>>>,
    seq: AtomicU64,
}

/// Key-addressed store holding cached values, their registered fetchers and
/// the bookkeeping for in-flight refetches and optimistic mutations.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                error_hook: Mutex::new(None),
                seq: AtomicU64::new(0),
            }),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        self.entries().get(key).and_then(|entry| entry.value.clone())
    }

    pub fn set(&self, key: &CacheKey, value: Value) {
        self.entries().entry(key.clone()).or_default().value = Some(value);
    }

    /// Drop the entry entirely, fetcher included.
    pub fn remove(&self, key: &CacheKey) {
        if let Some(entry) = self.entries().remove(key) {
            if let Some((_, handle)) = entry.pending {
                handle.abort();
            }
        }
    }

    /// Register the fetcher used by [`invalidate`](Self::invalidate) to
    /// refresh this key. Replaces any previous fetcher.
    pub fn register_fetcher<F, Fut>(&self, key: &CacheKey, fetcher: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, AuthQueryError>> + Send + 'static,
    {
        let fetcher: Arc<Fetcher> = Arc::new(move || Box::pin(fetcher()));
        self.entries().entry(key.clone()).or_default().fetcher = Some(fetcher);
    }

    #[must_use]
    pub fn has_fetcher(&self, key: &CacheKey) -> bool {
        self.entries()
            .get(key)
            .is_some_and(|entry| entry.fetcher.is_some())
    }

    /// Abort the in-flight refetch for `key`, if any.
    pub fn cancel_pending(&self, key: &CacheKey) {
        let handle = self
            .entries()
            .get_mut(key)
            .and_then(|entry| entry.pending.take());

        if let Some((token, handle)) = handle {
            debug!(%key, token, "cancelling pending refetch");
            handle.abort();
        }
    }

    /// Refresh `key` from its registered fetcher.
    ///
    /// The fetch runs as a tracked task so a concurrent
    /// [`cancel_pending`](Self::cancel_pending) can abort it before it
    /// overwrites the cache; a cancelled refetch resolves to `Ok(())` without
    /// touching the stored value. Cancellation is best-effort at task-yield
    /// granularity: a cancel racing the spawn can miss the handle, and a
    /// fetcher that already resolved completes its write. Calling this for a
    /// key with no registered fetcher is a bug at the call site; it is logged
    /// and ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetcher itself fails.
    pub async fn invalidate(&self, key: &CacheKey) -> Result<(), AuthQueryError> {
        let fetcher = match self.entries().get(key).and_then(|e| e.fetcher.clone()) {
            Some(fetcher) => fetcher,
            None => {
                error!(%key, "invalidate called for a key with no registered fetcher");
                return Ok(());
            }
        };

        self.cancel_pending(key);

        let token = self.inner.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let value = fetcher().await?;

            let mut entries = inner
                .entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            entries.entry(task_key).or_default().value = Some(value);

            Ok::<(), AuthQueryError>(())
        });

        self.entries().entry(key.clone()).or_default().pending =
            Some((token, handle.abort_handle()));

        let result = match handle.await {
            Ok(result) => result,
            Err(join_err) if join_err.is_cancelled() => {
                debug!(%key, "refetch superseded");
                Ok(())
            }
            Err(join_err) => Err(AuthQueryError::Remote(join_err.to_string())),
        };

        // Clear only our own handle; a superseding refetch may have already
        // installed a new one.
        if let Some(entry) = self.entries().get_mut(key) {
            if entry.pending.as_ref().is_some_and(|(t, _)| *t == token) {
                entry.pending = None;
            }
        }

        result
    }

    /// Refresh `key` and return the resulting cached value.
    ///
    /// # Errors
    ///
    /// Returns an error if the registered fetcher fails.
    pub async fn fetch(&self, key: &CacheKey) -> Result<Option<Value>, AuthQueryError> {
        self.invalidate(key).await?;
        Ok(self.get(key))
    }

    /// Install the hook invoked whenever a mutation fails, in addition to the
    /// error-level log line. One hook per cache; a later call replaces it.
    pub fn on_mutation_error<F>(&self, hook: F)
    where
        F: Fn(&AuthQueryError, &CacheKey) + Send + Sync + 'static,
    {
        *self
            .inner
            .error_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }

    pub(crate) fn report_mutation_error(&self, err: &AuthQueryError, key: &CacheKey) {
        error!(%key, error = %err, "mutation failed");

        let hook = self
            .inner
            .error_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(hook) = hook.as_ref() {
            hook(err, key);
        }
    }

    /// Mark the start of an optimistic install on `key` and return the
    /// sequence the snapshot must present to roll back.
    pub(crate) fn begin_mutation(&self, key: &CacheKey) -> u64 {
        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(entry) = self.entries().get_mut(key) {
            entry.mutation_seq = seq;
        }
        seq
    }

    /// Restore `previous` unless a newer optimistic install superseded `seq`.
    /// Returns whether the rollback was applied.
    pub(crate) fn rollback(&self, key: &CacheKey, previous: Value, seq: u64) -> bool {
        let mut entries = self.entries();
        if let Some(entry) = entries.get_mut(key) {
            if entry.mutation_seq == seq {
                entry.value = Some(previous);
                return true;
            }
            debug!(%key, seq, current = entry.mutation_seq, "stale snapshot, rollback skipped");
        }
        false
    }
}

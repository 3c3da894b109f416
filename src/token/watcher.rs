//! Expiry-driven refetch scheduling for the cached credential.

use tokio::task::AbortHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::cache::{CacheKey, QueryCache};

/// Schedules exactly one refetch trigger at the credential's expiry instant.
///
/// The watcher never performs network I/O itself; when the timer fires it
/// invalidates the token key and lets the cache's registered fetcher do the
/// rest. Superseding schedules abort the previous timer so at most one is
/// ever pending.
#[derive(Default)]
pub struct TokenWatcher {
    handle: Option<AbortHandle>,
}

impl TokenWatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer to fire `expires_at_ms - now_ms` from now. A delta that
    /// is already non-positive fires at the next scheduling opportunity.
    pub fn schedule(
        &mut self,
        cache: &QueryCache,
        key: &CacheKey,
        expires_at_ms: i64,
        now_ms: i64,
    ) {
        self.cancel();

        let delay_ms = u64::try_from(expires_at_ms - now_ms).unwrap_or(0);
        let delay = Duration::from_millis(delay_ms);
        debug!(%key, delay_ms, "scheduling token refetch");

        let cache = cache.clone();
        let key = key.clone();
        let handle = tokio::spawn(async move {
            sleep(delay).await;

            debug!(%key, "token expired, refetching");
            if let Err(err) = cache.invalidate(&key).await {
                warn!(%key, error = %err, "token refetch failed");
            }
        });

        self.handle = Some(handle.abort_handle());
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for TokenWatcher {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::advance;

    const NOW_MS: i64 = 1_700_000_000_000;

    fn counting_cache(key: &CacheKey) -> (QueryCache, Arc<AtomicUsize>) {
        let cache = QueryCache::new();
        let fetches = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fetches);
        cache.register_fetcher(key, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"token": "fresh"}))
            }
        });

        (cache, fetches)
    }

    async fn drain() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_at_expiry_instant() {
        let key = CacheKey::new(["token"]);
        let (cache, fetches) = counting_cache(&key);
        let mut watcher = TokenWatcher::new();

        watcher.schedule(&cache, &key, NOW_MS + 5000, NOW_MS);
        drain().await;

        advance(Duration::from_millis(4999)).await;
        drain().await;
        assert_eq!(fetches.load(Ordering::SeqCst), 0);

        advance(Duration::from_millis(1)).await;
        drain().await;
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        // One shot only.
        advance(Duration::from_secs(60)).await;
        drain().await;
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn superseding_schedule_cancels_previous_timer() {
        let key = CacheKey::new(["token"]);
        let (cache, fetches) = counting_cache(&key);
        let mut watcher = TokenWatcher::new();

        watcher.schedule(&cache, &key, NOW_MS + 1000, NOW_MS);
        drain().await;
        watcher.schedule(&cache, &key, NOW_MS + 5000, NOW_MS);
        drain().await;

        advance(Duration::from_millis(2000)).await;
        drain().await;
        assert_eq!(fetches.load(Ordering::SeqCst), 0);

        advance(Duration::from_millis(3000)).await;
        drain().await;
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_expiry_fires_immediately() {
        let key = CacheKey::new(["token"]);
        let (cache, fetches) = counting_cache(&key);
        let mut watcher = TokenWatcher::new();

        watcher.schedule(&cache, &key, NOW_MS - 1000, NOW_MS);
        drain().await;

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_disarms_the_timer() {
        let key = CacheKey::new(["token"]);
        let (cache, fetches) = counting_cache(&key);
        let mut watcher = TokenWatcher::new();

        watcher.schedule(&cache, &key, NOW_MS + 1000, NOW_MS);
        drain().await;
        watcher.cancel();

        advance(Duration::from_secs(10)).await;
        drain().await;
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }
}

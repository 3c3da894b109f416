//! Optimistic mutation coordinator.
//!
//! Applies a locally computed value to the cache before the remote operation
//! resolves, then reconciles once it settles: a failure restores the
//! pre-mutation snapshot and reports through the cache's error sink, and the
//! key is refetched so the next read reflects authoritative remote state.

use serde_json::Value;
use std::future::Future;
use tracing::{debug, warn};

use crate::cache::{CacheKey, QueryCache};
use crate::config::ResolvedMutateOptions;
use crate::error::AuthQueryError;

/// Pure function computing the optimistic value from the mutation params and
/// the current cached value. May be invoked speculatively and its result
/// discarded, so it must be side-effect free.
pub type OptimisticUpdate = dyn Fn(&Value, &Value) -> Value + Send + Sync;

/// Pre-mutation value retained for rollback during one attempt.
struct MutationSnapshot {
    key: CacheKey,
    previous: Value,
    seq: u64,
}

/// Remote failure details returned when the caller asked for non-throwing
/// semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub status: Option<u16>,
    pub message: String,
}

/// Settled outcome of a mutation: the remote data on success, the failure
/// details otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResponse {
    pub data: Option<Value>,
    pub error: Option<RemoteError>,
}

impl RemoteResponse {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Run `remote` against `key` with the optimistic snapshot/rollback protocol.
///
/// With `optimistic` enabled and an update function supplied, the in-flight
/// refetch for `key` is cancelled, the current value snapshotted and the
/// optimistic value installed before the remote call. A missing cached value
/// skips the optimistic step without creating an entry. On remote failure the
/// snapshot is restored (unless a newer optimistic install superseded it) and
/// the failure is reported through the cache's mutation-error sink. Whatever
/// the outcome, `refetch_on_mutate` triggers one refresh of `key` at settle.
///
/// # Errors
///
/// Remote failures are returned as `Err` when `fail_on_error` is set and
/// inside [`RemoteResponse::error`] otherwise.
pub async fn mutate<F, Fut>(
    cache: &QueryCache,
    key: &CacheKey,
    params: Value,
    remote: F,
    optimistic_update: Option<&OptimisticUpdate>,
    options: ResolvedMutateOptions,
) -> Result<RemoteResponse, AuthQueryError>
where
    F: FnOnce(Value) -> Fut,
    Fut: Future<Output = Result<Value, AuthQueryError>>,
{
    let mut snapshot: Option<MutationSnapshot> = None;

    if options.optimistic {
        if let Some(update) = optimistic_update {
            // A stale background fetch resolving mid-mutation would clobber
            // the optimistic value.
            cache.cancel_pending(key);

            if let Some(previous) = cache.get(key) {
                let next = update(&params, &previous);
                let seq = cache.begin_mutation(key);
                cache.set(key, next);
                snapshot = Some(MutationSnapshot {
                    key: key.clone(),
                    previous,
                    seq,
                });
                debug!(%key, seq, "optimistic value installed");
            } else {
                debug!(%key, "no cached value, optimistic step skipped");
            }
        }
    }

    let outcome = remote(params).await;

    let response = match outcome {
        Ok(data) => RemoteResponse {
            data: Some(data),
            error: None,
        },
        Err(err) => {
            cache.report_mutation_error(&err, key);

            if let Some(snapshot) = snapshot.take() {
                cache.rollback(&snapshot.key, snapshot.previous, snapshot.seq);
            }

            if options.fail_on_error {
                settle(cache, key, options).await;
                return Err(err);
            }

            RemoteResponse {
                data: None,
                error: Some(RemoteError {
                    status: err.status(),
                    message: err.to_string(),
                }),
            }
        }
    };

    settle(cache, key, options).await;

    Ok(response)
}

async fn settle(cache: &QueryCache, key: &CacheKey, options: ResolvedMutateOptions) {
    if !options.refetch_on_mutate {
        return;
    }

    if let Err(err) = cache.invalidate(key).await {
        warn!(%key, error = %err, "refetch after mutation failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthQueryOptions;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn resolved(optimistic: bool, refetch: bool, fail: bool) -> ResolvedMutateOptions {
        AuthQueryOptions {
            optimistic,
            refetch_on_mutate: refetch,
            fail_on_error: fail,
            ..AuthQueryOptions::default()
        }
        .resolve(None)
    }

    fn remove_token(params: &Value, previous: &Value) -> Value {
        let token = params.get("token").and_then(Value::as_str);
        let sessions = previous
            .as_array()
            .map(|sessions| {
                sessions
                    .iter()
                    .filter(|s| s.as_str() != token)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Value::Array(sessions)
    }

    #[tokio::test]
    async fn failure_rolls_back_and_reports_once() -> anyhow::Result<()> {
        let cache = QueryCache::new();
        let key = CacheKey::new(["list-sessions"]);
        cache.set(&key, json!(["sessA", "sessB"]));

        let reported = Arc::new(AtomicUsize::new(0));
        let sink_calls = Arc::clone(&reported);
        cache.on_mutation_error(move |_, _| {
            sink_calls.fetch_add(1, Ordering::SeqCst);
        });

        let observed = Arc::new(std::sync::Mutex::new(None));
        let observer = Arc::clone(&observed);
        let cache_for_remote = cache.clone();
        let key_for_remote = key.clone();

        let response = mutate(
            &cache,
            &key,
            json!({"token": "sessA"}),
            |_| async move {
                // The optimistic value is visible while the remote call is in
                // flight.
                *observer.lock().unwrap() = cache_for_remote.get(&key_for_remote);
                Err(AuthQueryError::Remote("boom".into()))
            },
            Some(&remove_token),
            resolved(true, false, false),
        )
        .await?;

        assert!(!response.is_ok());
        assert_eq!(*observed.lock().unwrap(), Some(json!(["sessB"])));
        assert_eq!(cache.get(&key), Some(json!(["sessA", "sessB"])));
        assert_eq!(reported.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn settle_refetches_exactly_once() -> anyhow::Result<()> {
        let cache = QueryCache::new();
        let key = CacheKey::new(["list-sessions"]);
        cache.set(&key, json!(["sessA", "sessB"]));

        let fetches = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fetches);
        cache.register_fetcher(&key, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!(["sessB"]))
            }
        });

        let response = mutate(
            &cache,
            &key,
            json!({"token": "sessA"}),
            |_| async { Ok(json!({"status": true})) },
            Some(&remove_token),
            resolved(true, true, false),
        )
        .await?;

        assert!(response.is_ok());
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&key), Some(json!(["sessB"])));
        Ok(())
    }

    #[tokio::test]
    async fn settle_refetches_on_failure_too() -> anyhow::Result<()> {
        let cache = QueryCache::new();
        let key = CacheKey::new(["list-sessions"]);
        cache.set(&key, json!(["sessA"]));

        let fetches = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fetches);
        cache.register_fetcher(&key, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!(["sessA"]))
            }
        });

        let response = mutate(
            &cache,
            &key,
            json!({"token": "sessA"}),
            |_| async { Err(AuthQueryError::Remote("boom".into())) },
            Some(&remove_token),
            resolved(true, true, false),
        )
        .await?;

        assert!(!response.is_ok());
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn absent_value_skips_optimistic_step() -> anyhow::Result<()> {
        let cache = QueryCache::new();
        let key = CacheKey::new(["list-sessions"]);

        let response = mutate(
            &cache,
            &key,
            json!({"token": "sessA"}),
            |_| async { Ok(json!({"status": true})) },
            Some(&remove_token),
            resolved(true, false, false),
        )
        .await?;

        assert!(response.is_ok());
        // No entry was created as a side effect of the optimistic step.
        assert_eq!(cache.get(&key), None);
        Ok(())
    }

    #[tokio::test]
    async fn optimistic_disabled_leaves_cache_untouched() -> anyhow::Result<()> {
        let cache = QueryCache::new();
        let key = CacheKey::new(["list-sessions"]);
        cache.set(&key, json!(["sessA", "sessB"]));

        let response = mutate(
            &cache,
            &key,
            json!({"token": "sessA"}),
            |_| async { Err(AuthQueryError::Remote("boom".into())) },
            Some(&remove_token),
            resolved(false, false, false),
        )
        .await?;

        assert!(!response.is_ok());
        assert_eq!(cache.get(&key), Some(json!(["sessA", "sessB"])));
        Ok(())
    }

    #[tokio::test]
    async fn fail_on_error_propagates_after_rollback() {
        let cache = QueryCache::new();
        let key = CacheKey::new(["list-sessions"]);
        cache.set(&key, json!(["sessA", "sessB"]));

        let result = mutate(
            &cache,
            &key,
            json!({"token": "sessA"}),
            |_| async { Err(AuthQueryError::Remote("boom".into())) },
            Some(&remove_token),
            resolved(true, false, true),
        )
        .await;

        assert!(matches!(result, Err(AuthQueryError::Remote(_))));
        assert_eq!(cache.get(&key), Some(json!(["sessA", "sessB"])));
    }

    #[tokio::test]
    async fn late_failure_does_not_clobber_newer_optimistic_write() -> anyhow::Result<()> {
        let cache = QueryCache::new();
        let key = CacheKey::new(["list-sessions"]);
        cache.set(&key, json!(["sessA", "sessB"]));

        let (release, gate) = tokio::sync::oneshot::channel::<()>();

        let first = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move {
                mutate(
                    &cache,
                    &key,
                    json!({"token": "sessA"}),
                    |_| async move {
                        let _ = gate.await;
                        Err(AuthQueryError::Remote("late failure".into()))
                    },
                    Some(&remove_token),
                    resolved(true, false, false),
                )
                .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(cache.get(&key), Some(json!(["sessB"])));

        // Second mutation on the same key snapshots the first one's
        // optimistic value; its snapshot supersedes the first.
        let response = mutate(
            &cache,
            &key,
            json!({"token": "sessB"}),
            |_| async { Ok(json!({"status": true})) },
            Some(&remove_token),
            resolved(true, false, false),
        )
        .await?;
        assert!(response.is_ok());
        assert_eq!(cache.get(&key), Some(json!([])));

        let _ = release.send(());
        let first = first.await??;
        assert!(!first.is_ok());

        // The late rollback was skipped; the newer write stands.
        assert_eq!(cache.get(&key), Some(json!([])));
        Ok(())
    }
}

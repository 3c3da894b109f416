//! Client-bound resource bindings.
//!
//! [`AuthQueryClient`] pairs an [`AuthClient`] with a [`QueryCache`] and
//! exposes each resource collection as cache-backed queries and optimistic
//! mutations, one module per resource.

mod accounts;
mod api_keys;
mod device_sessions;
mod passkeys;
mod session;
mod sessions;
mod token;

pub use token::TokenData;

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Mutex;

use crate::cache::{CacheKey, QueryCache};
use crate::client::AuthClient;
use crate::config::AuthQueryOptions;
use crate::error::AuthQueryError;
use crate::token::watcher::TokenWatcher;

pub struct AuthQueryClient {
    client: AuthClient,
    cache: QueryCache,
    options: AuthQueryOptions,
    token_watcher: Mutex<TokenWatcher>,
}

impl AuthQueryClient {
    #[must_use]
    pub fn new(client: AuthClient) -> Self {
        Self::with_options(client, AuthQueryOptions::default())
    }

    #[must_use]
    pub fn with_options(client: AuthClient, options: AuthQueryOptions) -> Self {
        Self {
            client,
            cache: QueryCache::new(),
            options,
            token_watcher: Mutex::new(TokenWatcher::new()),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    #[must_use]
    pub fn options(&self) -> &AuthQueryOptions {
        &self.options
    }

    /// Hook invoked whenever any mutation fails, for app-wide reactions such
    /// as toasts. Delegates to [`QueryCache::on_mutation_error`].
    pub fn on_mutation_error<F>(&self, hook: F)
    where
        F: Fn(&AuthQueryError, &CacheKey) + Send + Sync + 'static,
    {
        self.cache.on_mutation_error(hook);
    }

    pub(crate) fn ensure_fetcher<F, Fut>(&self, key: &CacheKey, fetch: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, AuthQueryError>> + Send + 'static,
    {
        if !self.cache.has_fetcher(key) {
            self.cache.register_fetcher(key, fetch);
        }
    }

    /// Cached value for `key`, fetched through the registered fetcher on a
    /// miss.
    pub(crate) async fn load(&self, key: &CacheKey) -> Result<Option<Value>, AuthQueryError> {
        match self.cache.get(key) {
            Some(value) => Ok(Some(value)),
            None => self.cache.fetch(key).await,
        }
    }
}

pub(crate) fn from_cached<T: DeserializeOwned>(
    value: Option<Value>,
) -> Result<Option<T>, AuthQueryError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
    }
}

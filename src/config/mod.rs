use crate::cache::CacheKey;

/// Provider-scoped options: mutation toggles plus the cache key addressing
/// each resource collection.
#[derive(Debug, Clone)]
pub struct AuthQueryOptions {
    /// Apply the snapshot/rollback protocol before the remote call resolves.
    pub optimistic: bool,
    /// Force a cache refresh for the key once a mutation settles.
    pub refetch_on_mutate: bool,
    /// Propagate remote failures as `Err` instead of returning them inside
    /// the response wrapper.
    pub fail_on_error: bool,
    pub session_key: CacheKey,
    pub token_key: CacheKey,
    pub list_accounts_key: CacheKey,
    pub list_sessions_key: CacheKey,
    pub list_device_sessions_key: CacheKey,
    pub list_passkeys_key: CacheKey,
    pub list_api_keys_key: CacheKey,
}

impl Default for AuthQueryOptions {
    fn default() -> Self {
        Self {
            optimistic: true,
            refetch_on_mutate: true,
            fail_on_error: false,
            session_key: CacheKey::new(["session"]),
            token_key: CacheKey::new(["token"]),
            list_accounts_key: CacheKey::new(["list-accounts"]),
            list_sessions_key: CacheKey::new(["list-sessions"]),
            list_device_sessions_key: CacheKey::new(["list-device-sessions"]),
            list_passkeys_key: CacheKey::new(["list-passkeys"]),
            list_api_keys_key: CacheKey::new(["list-api-keys"]),
        }
    }
}

/// Per-call overrides, highest precedence in the merge chain
/// defaults < provider options < call overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct MutateOverrides {
    pub optimistic: Option<bool>,
    pub refetch_on_mutate: Option<bool>,
    pub fail_on_error: Option<bool>,
}

/// Effective toggles for one mutation attempt.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedMutateOptions {
    pub optimistic: bool,
    pub refetch_on_mutate: bool,
    pub fail_on_error: bool,
}

impl AuthQueryOptions {
    #[must_use]
    pub fn resolve(&self, overrides: Option<&MutateOverrides>) -> ResolvedMutateOptions {
        let overrides = overrides.copied().unwrap_or_default();

        ResolvedMutateOptions {
            optimistic: overrides.optimistic.unwrap_or(self.optimistic),
            refetch_on_mutate: overrides
                .refetch_on_mutate
                .unwrap_or(self.refetch_on_mutate),
            fail_on_error: overrides.fail_on_error.unwrap_or(self.fail_on_error),
        }
    }
}

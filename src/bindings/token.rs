use std::sync::PoisonError;

use super::{from_cached, AuthQueryClient};
use crate::error::AuthQueryError;
use crate::token::{decode_payload, is_expired, now_unix_ms, now_unix_secs, TokenPayload};
use crate::types::TokenResponse;

/// A usable cached credential with its decoded claims.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenData {
    pub token: String,
    pub payload: TokenPayload,
}

impl AuthQueryClient {
    fn register_token_fetcher(&self) {
        let client = self.client.clone();
        self.ensure_fetcher(&self.options.token_key, move || {
            let client = client.clone();
            async move { client.get_token().await }
        });
    }

    /// Short-lived credential for the current user.
    ///
    /// Gated on a signed-in session. A cached credential that is expired or
    /// was issued to a different subject than the current user is refetched
    /// once; a credential that is still unusable afterwards yields `None`.
    /// Every usable fetch (re)arms the expiry timer so the cache refreshes
    /// itself when the credential lapses.
    ///
    /// # Errors
    /// Returns an error if a required fetch fails.
    pub async fn token(&self) -> Result<Option<TokenData>, AuthQueryError> {
        let Some(session) = self.get_session().await? else {
            return Ok(None);
        };
        let user_id = session.user.id;

        self.register_token_fetcher();
        let key = self.options.token_key.clone();

        let (value, fresh) = match self.cache.get(&key) {
            Some(value) => (Some(value), false),
            None => (self.cache.fetch(&key).await?, true),
        };
        let mut token = from_cached::<TokenResponse>(value)?.map(|r| r.token);

        // Residual credential from a previous identity, or simply lapsed:
        // one authoritative refetch before giving up.
        if !fresh && is_expired(token.as_deref(), Some(&user_id), now_unix_secs()) {
            let value = self.cache.fetch(&key).await?;
            token = from_cached::<TokenResponse>(value)?.map(|r| r.token);
        }

        let Some(token) = token else {
            return Ok(None);
        };
        let Some(payload) = decode_payload(&token) else {
            return Ok(None);
        };

        if is_expired(Some(&token), Some(&user_id), now_unix_secs()) {
            return Ok(None);
        }

        // Only a usable credential arms the timer; an unusable one would
        // otherwise trigger an immediate pointless refetch.
        if let Some(exp) = payload.exp {
            let mut watcher = self
                .token_watcher
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            watcher.schedule(&self.cache, &key, exp.saturating_mul(1000), now_unix_ms());
        }

        Ok(Some(TokenData { token, payload }))
    }
}

use serde_json::Value;

use super::{from_cached, AuthQueryClient};
use crate::config::MutateOverrides;
use crate::error::AuthQueryError;
use crate::mutate::{mutate, RemoteResponse};
use crate::types::SessionData;

/// Merge the updated user fields into the cached session's user object.
fn merge_user_fields(params: &Value, previous: &Value) -> Value {
    let mut next = previous.clone();

    if let (Some(user), Some(update)) = (
        next.get_mut("user").and_then(Value::as_object_mut),
        params.as_object(),
    ) {
        for (field, value) in update {
            user.insert(field.clone(), value.clone());
        }
    }

    next
}

impl AuthQueryClient {
    fn register_session_fetcher(&self) {
        let client = self.client.clone();
        self.ensure_fetcher(&self.options.session_key, move || {
            let client = client.clone();
            async move { client.get_session().await }
        });
    }

    /// Current session with its user, `None` when signed out.
    ///
    /// # Errors
    /// Returns an error if the session has to be fetched and the request
    /// fails.
    pub async fn get_session(&self) -> Result<Option<SessionData>, AuthQueryError> {
        self.register_session_fetcher();

        let value = self.load(&self.options.session_key).await?;
        from_cached(value)
    }

    /// Fetch the session from the server and seed the cache, bypassing any
    /// cached value. Useful ahead of first render.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn prefetch_session(&self) -> Result<Option<SessionData>, AuthQueryError> {
        self.register_session_fetcher();

        let value = self.cache.fetch(&self.options.session_key).await?;
        from_cached(value)
    }

    /// Update the current user, optimistically merging the changed fields
    /// into the cached session.
    ///
    /// # Errors
    /// Remote failures are returned as `Err` only when `fail_on_error`
    /// resolves to true.
    pub async fn update_user(
        &self,
        update: Value,
        overrides: Option<&MutateOverrides>,
    ) -> Result<RemoteResponse, AuthQueryError> {
        self.register_session_fetcher();

        let client = self.client.clone();
        mutate(
            &self.cache,
            &self.options.session_key,
            update,
            move |params| async move { client.update_user(params).await },
            Some(&merge_user_fields),
            self.options.resolve(overrides),
        )
        .await
    }
}

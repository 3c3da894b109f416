use serde_json::{json, Value};

use super::{from_cached, AuthQueryClient};
use crate::config::MutateOverrides;
use crate::error::AuthQueryError;
use crate::mutate::{mutate, RemoteResponse};
use crate::types::Session;

/// Drop the session whose token matches `params.token` from the cached list.
fn without_session_token(params: &Value, previous: &Value) -> Value {
    let token = params.get("token").and_then(Value::as_str);

    match previous.as_array() {
        Some(sessions) => Value::Array(
            sessions
                .iter()
                .filter(|session| session.get("token").and_then(Value::as_str) != token)
                .cloned()
                .collect(),
        ),
        None => previous.clone(),
    }
}

impl AuthQueryClient {
    fn register_sessions_fetcher(&self) {
        let client = self.client.clone();
        self.ensure_fetcher(&self.options.list_sessions_key, move || {
            let client = client.clone();
            async move { client.list_sessions().await }
        });
    }

    /// Active sessions of the current user.
    ///
    /// # Errors
    /// Returns an error if the list has to be fetched and the request fails.
    pub async fn list_sessions(&self) -> Result<Vec<Session>, AuthQueryError> {
        self.register_sessions_fetcher();

        let value = self.load(&self.options.list_sessions_key).await?;
        Ok(from_cached(value)?.unwrap_or_default())
    }

    /// Revoke one session by its token, optimistically removing it from the
    /// cached list.
    ///
    /// # Errors
    /// Remote failures are returned as `Err` only when `fail_on_error`
    /// resolves to true.
    pub async fn revoke_session(
        &self,
        token: &str,
        overrides: Option<&MutateOverrides>,
    ) -> Result<RemoteResponse, AuthQueryError> {
        self.register_sessions_fetcher();

        let client = self.client.clone();
        mutate(
            &self.cache,
            &self.options.list_sessions_key,
            json!({ "token": token }),
            move |params| async move { client.revoke_session(params).await },
            Some(&without_session_token),
            self.options.resolve(overrides),
        )
        .await
    }

    /// Revoke every session of the current user.
    ///
    /// # Errors
    /// Remote failures are returned as `Err` only when `fail_on_error`
    /// resolves to true.
    pub async fn revoke_sessions(
        &self,
        overrides: Option<&MutateOverrides>,
    ) -> Result<RemoteResponse, AuthQueryError> {
        self.register_sessions_fetcher();

        let client = self.client.clone();
        mutate(
            &self.cache,
            &self.options.list_sessions_key,
            json!({}),
            move |params| async move { client.revoke_sessions(params).await },
            None,
            self.options.resolve(overrides),
        )
        .await
    }

    /// Revoke every session except the current one.
    ///
    /// # Errors
    /// Remote failures are returned as `Err` only when `fail_on_error`
    /// resolves to true.
    pub async fn revoke_other_sessions(
        &self,
        overrides: Option<&MutateOverrides>,
    ) -> Result<RemoteResponse, AuthQueryError> {
        self.register_sessions_fetcher();

        let client = self.client.clone();
        mutate(
            &self.cache,
            &self.options.list_sessions_key,
            json!({}),
            move |params| async move { client.revoke_other_sessions(params).await },
            None,
            self.options.resolve(overrides),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_removes_matching_token_only() {
        let previous = json!([
            {"id": "s1", "token": "sessA"},
            {"id": "s2", "token": "sessB"}
        ]);

        let next = without_session_token(&json!({"token": "sessA"}), &previous);
        assert_eq!(next, json!([{"id": "s2", "token": "sessB"}]));

        let next = without_session_token(&json!({"token": "unknown"}), &previous);
        assert_eq!(next, previous);
    }

    #[test]
    fn filter_leaves_non_list_values_alone() {
        let previous = json!({"unexpected": true});
        let next = without_session_token(&json!({"token": "sessA"}), &previous);
        assert_eq!(next, previous);
    }
}

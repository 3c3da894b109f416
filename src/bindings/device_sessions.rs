use serde_json::{json, Value};

use super::{from_cached, AuthQueryClient};
use crate::config::MutateOverrides;
use crate::error::AuthQueryError;
use crate::mutate::{mutate, RemoteResponse};
use crate::types::DeviceSession;

/// Drop the device session whose session token matches
/// `params.sessionToken` from the cached list.
fn without_device_session(params: &Value, previous: &Value) -> Value {
    let token = params.get("sessionToken").and_then(Value::as_str);

    match previous.as_array() {
        Some(device_sessions) => Value::Array(
            device_sessions
                .iter()
                .filter(|device| {
                    device
                        .get("session")
                        .and_then(|session| session.get("token"))
                        .and_then(Value::as_str)
                        != token
                })
                .cloned()
                .collect(),
        ),
        None => previous.clone(),
    }
}

impl AuthQueryClient {
    fn register_device_sessions_fetcher(&self) {
        let client = self.client.clone();
        self.ensure_fetcher(&self.options.list_device_sessions_key, move || {
            let client = client.clone();
            async move { client.list_device_sessions().await }
        });
    }

    /// Sessions signed in on this device.
    ///
    /// # Errors
    /// Returns an error if the list has to be fetched and the request fails.
    pub async fn list_device_sessions(&self) -> Result<Vec<DeviceSession>, AuthQueryError> {
        self.register_device_sessions_fetcher();

        let value = self.load(&self.options.list_device_sessions_key).await?;
        Ok(from_cached(value)?.unwrap_or_default())
    }

    /// Revoke one device session by its session token, optimistically
    /// removing it from the cached list.
    ///
    /// # Errors
    /// Remote failures are returned as `Err` only when `fail_on_error`
    /// resolves to true.
    pub async fn revoke_device_session(
        &self,
        session_token: &str,
        overrides: Option<&MutateOverrides>,
    ) -> Result<RemoteResponse, AuthQueryError> {
        self.register_device_sessions_fetcher();

        let client = self.client.clone();
        mutate(
            &self.cache,
            &self.options.list_device_sessions_key,
            json!({ "sessionToken": session_token }),
            move |params| async move { client.revoke_device_session(params).await },
            Some(&without_device_session),
            self.options.resolve(overrides),
        )
        .await
    }

    /// Revoke every session of the current user, settling the cached
    /// device-sessions list so it reflects the bulk revoke.
    ///
    /// # Errors
    /// Remote failures are returned as `Err` only when `fail_on_error`
    /// resolves to true.
    pub async fn revoke_device_sessions(
        &self,
        overrides: Option<&MutateOverrides>,
    ) -> Result<RemoteResponse, AuthQueryError> {
        self.register_device_sessions_fetcher();

        let client = self.client.clone();
        mutate(
            &self.cache,
            &self.options.list_device_sessions_key,
            json!({}),
            move |params| async move { client.revoke_sessions(params).await },
            None,
            self.options.resolve(overrides),
        )
        .await
    }
}

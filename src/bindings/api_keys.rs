use serde_json::{json, Value};

use super::{from_cached, AuthQueryClient};
use crate::config::MutateOverrides;
use crate::error::AuthQueryError;
use crate::mutate::{mutate, RemoteResponse};
use crate::types::ApiKey;

fn without_api_key(params: &Value, previous: &Value) -> Value {
    let key_id = params.get("keyId").and_then(Value::as_str);

    match previous.as_array() {
        Some(api_keys) => Value::Array(
            api_keys
                .iter()
                .filter(|api_key| api_key.get("id").and_then(Value::as_str) != key_id)
                .cloned()
                .collect(),
        ),
        None => previous.clone(),
    }
}

impl AuthQueryClient {
    fn register_api_keys_fetcher(&self) {
        let client = self.client.clone();
        self.ensure_fetcher(&self.options.list_api_keys_key, move || {
            let client = client.clone();
            async move { client.list_api_keys().await }
        });
    }

    /// API keys owned by the current user.
    ///
    /// # Errors
    /// Returns an error if the list has to be fetched and the request fails.
    pub async fn list_api_keys(&self) -> Result<Vec<ApiKey>, AuthQueryError> {
        self.register_api_keys_fetcher();

        let value = self.load(&self.options.list_api_keys_key).await?;
        Ok(from_cached(value)?.unwrap_or_default())
    }

    /// Delete an API key by id, optimistically removing it from the cached
    /// list.
    ///
    /// # Errors
    /// Remote failures are returned as `Err` only when `fail_on_error`
    /// resolves to true.
    pub async fn delete_api_key(
        &self,
        key_id: &str,
        overrides: Option<&MutateOverrides>,
    ) -> Result<RemoteResponse, AuthQueryError> {
        self.register_api_keys_fetcher();

        let client = self.client.clone();
        mutate(
            &self.cache,
            &self.options.list_api_keys_key,
            json!({ "keyId": key_id }),
            move |params| async move { client.delete_api_key(params).await },
            Some(&without_api_key),
            self.options.resolve(overrides),
        )
        .await
    }
}

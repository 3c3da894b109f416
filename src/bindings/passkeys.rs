use serde_json::{json, Value};

use super::{from_cached, AuthQueryClient};
use crate::config::MutateOverrides;
use crate::error::AuthQueryError;
use crate::mutate::{mutate, RemoteResponse};
use crate::types::Passkey;

fn without_passkey(params: &Value, previous: &Value) -> Value {
    let id = params.get("id").and_then(Value::as_str);

    match previous.as_array() {
        Some(passkeys) => Value::Array(
            passkeys
                .iter()
                .filter(|passkey| passkey.get("id").and_then(Value::as_str) != id)
                .cloned()
                .collect(),
        ),
        None => previous.clone(),
    }
}

impl AuthQueryClient {
    fn register_passkeys_fetcher(&self) {
        let client = self.client.clone();
        self.ensure_fetcher(&self.options.list_passkeys_key, move || {
            let client = client.clone();
            async move { client.list_passkeys().await }
        });
    }

    /// Passkeys registered by the current user.
    ///
    /// # Errors
    /// Returns an error if the list has to be fetched and the request fails.
    pub async fn list_passkeys(&self) -> Result<Vec<Passkey>, AuthQueryError> {
        self.register_passkeys_fetcher();

        let value = self.load(&self.options.list_passkeys_key).await?;
        Ok(from_cached(value)?.unwrap_or_default())
    }

    /// Delete a passkey by id, optimistically removing it from the cached
    /// list.
    ///
    /// # Errors
    /// Remote failures are returned as `Err` only when `fail_on_error`
    /// resolves to true.
    pub async fn delete_passkey(
        &self,
        id: &str,
        overrides: Option<&MutateOverrides>,
    ) -> Result<RemoteResponse, AuthQueryError> {
        self.register_passkeys_fetcher();

        let client = self.client.clone();
        mutate(
            &self.cache,
            &self.options.list_passkeys_key,
            json!({ "id": id }),
            move |params| async move { client.delete_passkey(params).await },
            Some(&without_passkey),
            self.options.resolve(overrides),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_removes_by_id() {
        let previous = json!([
            {"id": "pk1", "name": "laptop"},
            {"id": "pk2", "name": "phone"}
        ]);

        let next = without_passkey(&json!({"id": "pk1"}), &previous);
        assert_eq!(next, json!([{"id": "pk2", "name": "phone"}]));
    }
}

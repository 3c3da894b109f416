use serde_json::{json, Value};

use super::{from_cached, AuthQueryClient};
use crate::config::MutateOverrides;
use crate::error::AuthQueryError;
use crate::mutate::{mutate, RemoteResponse};
use crate::types::Account;

/// Drop the account matching `params.providerId` (and `params.accountId`
/// when given) from the cached list.
fn without_account(params: &Value, previous: &Value) -> Value {
    let provider = params.get("providerId").and_then(Value::as_str);
    let account_id = params.get("accountId").and_then(Value::as_str);

    match previous.as_array() {
        Some(accounts) => Value::Array(
            accounts
                .iter()
                .filter(|account| {
                    let provider_matches =
                        account.get("provider").and_then(Value::as_str) == provider;
                    let account_matches = account_id.is_none()
                        || account.get("accountId").and_then(Value::as_str) == account_id;
                    !(provider_matches && account_matches)
                })
                .cloned()
                .collect(),
        ),
        None => previous.clone(),
    }
}

impl AuthQueryClient {
    fn register_accounts_fetcher(&self) {
        let client = self.client.clone();
        self.ensure_fetcher(&self.options.list_accounts_key, move || {
            let client = client.clone();
            async move { client.list_accounts().await }
        });
    }

    /// Provider accounts linked to the current user.
    ///
    /// # Errors
    /// Returns an error if the list has to be fetched and the request fails.
    pub async fn list_accounts(&self) -> Result<Vec<Account>, AuthQueryError> {
        self.register_accounts_fetcher();

        let value = self.load(&self.options.list_accounts_key).await?;
        Ok(from_cached(value)?.unwrap_or_default())
    }

    /// Unlink a provider account, optimistically removing it from the cached
    /// list. `account_id` narrows the unlink when the same provider is
    /// linked more than once.
    ///
    /// # Errors
    /// Remote failures are returned as `Err` only when `fail_on_error`
    /// resolves to true.
    pub async fn unlink_account(
        &self,
        provider_id: &str,
        account_id: Option<&str>,
        overrides: Option<&MutateOverrides>,
    ) -> Result<RemoteResponse, AuthQueryError> {
        self.register_accounts_fetcher();

        let mut params = json!({ "providerId": provider_id });
        if let Some(account_id) = account_id {
            params["accountId"] = json!(account_id);
        }

        let client = self.client.clone();
        mutate(
            &self.cache,
            &self.options.list_accounts_key,
            params,
            move |params| async move { client.unlink_account(params).await },
            Some(&without_account),
            self.options.resolve(overrides),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_by_provider_removes_all_of_that_provider() {
        let previous = json!([
            {"id": "a1", "provider": "github", "accountId": "gh-1"},
            {"id": "a2", "provider": "github", "accountId": "gh-2"},
            {"id": "a3", "provider": "google", "accountId": "go-1"}
        ]);

        let next = without_account(&json!({"providerId": "github"}), &previous);
        assert_eq!(
            next,
            json!([{"id": "a3", "provider": "google", "accountId": "go-1"}])
        );
    }

    #[test]
    fn account_id_narrows_the_filter() {
        let previous = json!([
            {"id": "a1", "provider": "github", "accountId": "gh-1"},
            {"id": "a2", "provider": "github", "accountId": "gh-2"}
        ]);

        let next = without_account(
            &json!({"providerId": "github", "accountId": "gh-2"}),
            &previous,
        );
        assert_eq!(
            next,
            json!([{"id": "a1", "provider": "github", "accountId": "gh-1"}])
        );
    }
}

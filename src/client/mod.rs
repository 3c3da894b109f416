//! HTTP adapter for the auth server.
//!
//! Thin wrapper around `reqwest`: every operation resolves to the server's
//! JSON body or to [`AuthQueryError::RemoteStatus`] carrying the server's
//! message. Transport-level retries and request signing are the server
//! client's own concern, not this crate's.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, info_span, Instrument};
use url::Url;

use crate::error::AuthQueryError;

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

fn remote_error_message(json_response: &Value) -> &str {
    json_response
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| {
            json_response
                .get("error")
                .and_then(|v| v.get("message"))
                .and_then(Value::as_str)
        })
        .unwrap_or("")
}

/// Normalize `base` + `path` into an absolute endpoint URL.
///
/// # Errors
///
/// Returns an error if `base` cannot be parsed, has no host, or uses an
/// unsupported scheme.
pub fn endpoint_url(base: &str, path: &str) -> Result<String, AuthQueryError> {
    let url = Url::parse(base)?;

    let scheme = url.scheme();

    let host = url.host().ok_or(AuthQueryError::MissingHost)?.to_owned();

    let port = match url.port() {
        Some(p) => p,
        None => match scheme {
            "http" => 80,
            "https" => 443,
            _ => return Err(AuthQueryError::UnsupportedScheme(scheme.to_string())),
        },
    };

    let base_path = url.path().trim_end_matches('/');
    let endpoint_url = format!("{scheme}://{host}:{port}{base_path}{path}");

    debug!("endpoint URL: {}", endpoint_url);

    Ok(endpoint_url)
}

/// Auth server client. `base_url` includes the server's auth mount point
/// (e.g. `https://app.example.com/api/auth`); the session credential, when
/// set, is sent as a bearer token.
#[derive(Clone)]
pub struct AuthClient {
    base_url: String,
    bearer_token: Option<SecretString>,
    client: Client,
}

impl AuthClient {
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, AuthQueryError> {
        let client = Client::builder().user_agent(APP_USER_AGENT).build()?;

        Ok(Self {
            base_url: base_url.into(),
            bearer_token: None,
            client,
        })
    }

    #[must_use]
    pub fn with_bearer_token(mut self, token: SecretString) -> Self {
        self.bearer_token = Some(token);
        self
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.header(
                "Authorization",
                format!("Bearer {}", token.expose_secret()),
            ),
            None => request,
        }
    }

    async fn get(&self, path: &str) -> Result<Value, AuthQueryError> {
        let url = endpoint_url(&self.base_url, path)?;

        let span = info_span!(
            "auth.get",
            http.method = "GET",
            url = %url
        );
        let response = self
            .apply_auth(self.client.get(&url))
            .send()
            .instrument(span)
            .await?;

        Self::into_json(url, response).await
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<Value, AuthQueryError> {
        let url = endpoint_url(&self.base_url, path)?;

        let span = info_span!(
            "auth.post",
            http.method = "POST",
            url = %url
        );
        let response = self
            .apply_auth(self.client.post(&url))
            .json(payload)
            .send()
            .instrument(span)
            .await?;

        Self::into_json(url, response).await
    }

    async fn into_json(url: String, response: reqwest::Response) -> Result<Value, AuthQueryError> {
        if !response.status().is_success() {
            let status = response.status();
            let json_response: Value = response.json().await.unwrap_or(Value::Null);

            return Err(AuthQueryError::RemoteStatus {
                url,
                status: status.as_u16(),
                message: remote_error_message(&json_response).to_string(),
            });
        }

        Ok(response.json().await?)
    }

    /// Current session with its user, `null` when signed out.
    ///
    /// # Errors
    /// Returns an error if the request fails or the server returns a
    /// non-success status.
    pub async fn get_session(&self) -> Result<Value, AuthQueryError> {
        self.get("/get-session").await
    }

    /// # Errors
    /// Returns an error if the request fails or the server returns a
    /// non-success status.
    pub async fn list_sessions(&self) -> Result<Value, AuthQueryError> {
        self.get("/list-sessions").await
    }

    /// # Errors
    /// Returns an error if the request fails or the server returns a
    /// non-success status.
    pub async fn list_accounts(&self) -> Result<Value, AuthQueryError> {
        self.get("/list-accounts").await
    }

    /// # Errors
    /// Returns an error if the request fails or the server returns a
    /// non-success status.
    pub async fn list_device_sessions(&self) -> Result<Value, AuthQueryError> {
        self.get("/multi-session/list-device-sessions").await
    }

    /// # Errors
    /// Returns an error if the request fails or the server returns a
    /// non-success status.
    pub async fn list_passkeys(&self) -> Result<Value, AuthQueryError> {
        self.get("/passkey/list-user-passkeys").await
    }

    /// # Errors
    /// Returns an error if the request fails or the server returns a
    /// non-success status.
    pub async fn list_api_keys(&self) -> Result<Value, AuthQueryError> {
        self.get("/api-key/list").await
    }

    /// Short-lived credential for the current session.
    ///
    /// # Errors
    /// Returns an error if the request fails or the server returns a
    /// non-success status.
    pub async fn get_token(&self) -> Result<Value, AuthQueryError> {
        self.get("/token").await
    }

    /// # Errors
    /// Returns an error if the request fails or the server returns a
    /// non-success status.
    pub async fn revoke_session(&self, params: Value) -> Result<Value, AuthQueryError> {
        self.post("/revoke-session", &params).await
    }

    /// # Errors
    /// Returns an error if the request fails or the server returns a
    /// non-success status.
    pub async fn revoke_sessions(&self, params: Value) -> Result<Value, AuthQueryError> {
        self.post("/revoke-sessions", &params).await
    }

    /// # Errors
    /// Returns an error if the request fails or the server returns a
    /// non-success status.
    pub async fn revoke_other_sessions(&self, params: Value) -> Result<Value, AuthQueryError> {
        self.post("/revoke-other-sessions", &params).await
    }

    /// # Errors
    /// Returns an error if the request fails or the server returns a
    /// non-success status.
    pub async fn update_user(&self, params: Value) -> Result<Value, AuthQueryError> {
        self.post("/update-user", &params).await
    }

    /// # Errors
    /// Returns an error if the request fails or the server returns a
    /// non-success status.
    pub async fn unlink_account(&self, params: Value) -> Result<Value, AuthQueryError> {
        self.post("/unlink-account", &params).await
    }

    /// # Errors
    /// Returns an error if the request fails or the server returns a
    /// non-success status.
    pub async fn revoke_device_session(&self, params: Value) -> Result<Value, AuthQueryError> {
        self.post("/multi-session/revoke", &params).await
    }

    /// # Errors
    /// Returns an error if the request fails or the server returns a
    /// non-success status.
    pub async fn delete_passkey(&self, params: Value) -> Result<Value, AuthQueryError> {
        self.post("/passkey/delete-passkey", &params).await
    }

    /// # Errors
    /// Returns an error if the request fails or the server returns a
    /// non-success status.
    pub async fn delete_api_key(&self, params: Value) -> Result<Value, AuthQueryError> {
        self.post("/api-key/delete", &params).await
    }
}

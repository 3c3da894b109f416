use thiserror::Error;

/// Errors surfaced by queries, mutations and the HTTP adapter.
#[derive(Debug, Error)]
pub enum AuthQueryError {
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the auth server, carrying its message.
    #[error("{url} - {status}, {message}")]
    RemoteStatus {
        url: String,
        status: u16,
        message: String,
    },

    #[error("invalid json")]
    Json(#[from] serde_json::Error),

    /// Remote operation failed without an HTTP status, e.g. a fake remote
    /// operation injected in tests or a wrapped client error.
    #[error("remote operation failed: {0}")]
    Remote(String),
}

impl AuthQueryError {
    /// Status code of the failure, when the server produced one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteStatus { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

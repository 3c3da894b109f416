pub mod watcher;

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Decoded claims of a short-lived credential. Derived from the cached token
/// string on every read, never stored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenPayload {
    pub exp: Option<i64>,
    pub sub: Option<String>,
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

/// Decode the claims segment of a JWT-shaped credential.
///
/// Returns `None` for anything that is not three dot-separated segments with
/// a base64url JSON payload in the middle. Callers treat `None` as "no usable
/// claims", which marks the credential expired.
#[must_use]
pub fn decode_payload(token: &str) -> Option<TokenPayload> {
    let mut parts = token.split('.');
    let _header = parts.next()?;
    let claims = parts.next()?;
    let _signature = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let bytes = Base64UrlUnpadded::decode_vec(claims).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Whether the cached credential is unusable: missing, undecodable, past its
/// expiry, or issued to a different subject than the current one.
///
/// The subject check guards against an identity change (sign-out followed by
/// sign-in as someone else) letting the old party's residual cached
/// credential through.
#[must_use]
pub fn is_expired(token: Option<&str>, current_subject: Option<&str>, now_secs: i64) -> bool {
    let Some(token) = token else {
        return true;
    };
    let Some(payload) = decode_payload(token) else {
        return true;
    };
    let Some(exp) = payload.exp else {
        return true;
    };

    if exp <= now_secs {
        return true;
    }

    if let Some(current) = current_subject {
        return payload.sub.as_deref() != Some(current);
    }

    false
}

pub(crate) fn now_unix_secs() -> i64 {
    i64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
    )
    .unwrap_or(i64::MAX)
}

pub(crate) fn now_unix_ms() -> i64 {
    i64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis(),
    )
    .unwrap_or(i64::MAX)
}

//! Cache-backed query and mutation bindings for an auth client.
//!
//! The crate sits between an auth server's HTTP client and a key-addressed
//! [`cache::QueryCache`]: each resource collection (session, sessions,
//! accounts, device sessions, passkeys, API keys, token) is exposed as a
//! cached query plus mutations that apply an optimistic update before the
//! remote call resolves and reconcile the cache once it settles. The cached
//! short-lived credential additionally carries an expiry watcher that
//! refetches it the moment it lapses.
//!
//! ```no_run
//! use auth_query::{AuthClient, AuthQueryClient};
//!
//! # async fn run() -> Result<(), auth_query::AuthQueryError> {
//! let client = AuthClient::new("https://app.example.com/api/auth")?;
//! let auth = AuthQueryClient::new(client);
//!
//! let sessions = auth.list_sessions().await?;
//! if let Some(session) = sessions.first() {
//!     // Cached list shrinks immediately, rolls back if the server refuses.
//!     auth.revoke_session(&session.token, None).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod bindings;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod mutate;
pub mod token;
pub mod types;

pub use bindings::{AuthQueryClient, TokenData};
pub use cache::{CacheKey, QueryCache};
pub use client::AuthClient;
pub use config::{AuthQueryOptions, MutateOverrides, ResolvedMutateOptions};
pub use error::AuthQueryError;
pub use mutate::{mutate, OptimisticUpdate, RemoteError, RemoteResponse};
pub use token::watcher::TokenWatcher;
pub use token::{decode_payload, is_expired, TokenPayload};

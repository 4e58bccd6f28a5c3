//! Authenticated session layer for the Wanderlog travel journal client
//!
//! This crate owns everything between "the user typed a password" and "an
//! authenticated request reached the API": the stored credential pair, the
//! dispatch of API calls, token refresh on expiry, idle sign-out and the
//! cached profile of the signed-in user.
//!
//! # Request Flow
//!
//! 1. [`ApiClient::send`] attaches the stored access token
//! 2. A `401` answer parks the request behind a single shared refresh
//! 3. The refresh posts the refresh token (never the access token)
//! 4. On success every parked request is replayed once with the new token
//! 5. On failure the session is torn down and every parked request fails
//!
//! Any other error status is returned to the caller untouched.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wl_session::{ApiClient, IdleMonitor, RestoreOutcome, SessionConfig, SessionContext};
//!
//! #[tokio::main]
//! async fn main() -> wl_session::Result<()> {
//!     let config = SessionConfig::for_base_url("http://localhost:8000")?;
//!     let ctx = Arc::new(SessionContext::in_memory());
//!     let client = ApiClient::new(config.clone(), Arc::clone(&ctx))?;
//!
//!     if let RestoreOutcome::SignedOut = client.restore_session().await? {
//!         client.login("ana@example.com", "hunter2").await?;
//!     }
//!
//!     // Sign out after 30 minutes without activity
//!     let idle = IdleMonitor::from_config(Arc::clone(&ctx), &config).start();
//!     let activity = idle.listener();
//!
//!     for journal in client.feed().await? {
//!         println!("{}", journal.title);
//!     }
//!     activity.record(wl_session::ActivitySignal::Scroll);
//!
//!     idle.cancel();
//!     client.logout().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Credential Storage
//!
//! ## In-Memory Storage (Testing)
//!
//! ```
//! use wl_session::{Credential, CredentialStore, MemoryCredentialStore};
//!
//! let store = MemoryCredentialStore::new();
//! store.set(Credential::new("access", Some("refresh".to_string())));
//! assert_eq!(store.access_token().as_deref(), Some("access"));
//!
//! store.clear();
//! assert!(store.get().is_none());
//! ```
//!
//! ## File-Based Encrypted Storage (Production)
//!
//! ```no_run
//! use std::sync::Arc;
//! use wl_session::file_store::default_storage_dir;
//! use wl_session::{EnvSecretProvider, FileCredentialStore, FileSnapshotStore, SessionContext};
//! use wl_session::config::DEFAULT_CREDENTIAL_RETENTION;
//!
//! # async fn example() -> wl_session::Result<()> {
//! let dir = default_storage_dir()?;
//! // Vault key comes from the OS keyring, or from WANDERLOG_VAULT_PASSPHRASE
//! let credentials = FileCredentialStore::open(
//!     &dir,
//!     Arc::new(EnvSecretProvider::default()),
//!     DEFAULT_CREDENTIAL_RETENTION,
//! )
//! .await?;
//! let snapshots = FileSnapshotStore::new(&dir)?;
//!
//! let ctx = SessionContext::new(Arc::new(credentials), Arc::new(snapshots));
//! # Ok(())
//! # }
//! # tokio_test::block_on(example()).unwrap();
//! ```
//!
//! # Important Notes
//!
//! - Tokens and passwords are never logged
//! - A request is retried at most once; a second `401` ends the session
//! - Teardown always clears the credential and the cached profile together

pub mod account;
pub mod api;
pub mod cache;
pub mod config;
pub mod context;
pub mod credential;
pub mod dispatcher;
pub mod errors;
pub mod file_store;
pub mod idle;
pub mod models;
mod refresh;
pub mod request;
pub mod secret;
pub mod vault;

// Re-export main types
pub use account::RestoreOutcome;
pub use cache::{MemorySnapshotStore, SessionCache, SnapshotStore};
pub use config::{EndpointPaths, HttpTimeouts, SessionConfig};
pub use context::{Generation, SessionContext, SessionEvent, TeardownReason};
pub use credential::{Credential, CredentialStore, MemoryCredentialStore};
pub use dispatcher::ApiClient;
pub use errors::{FatalSession, Result, SessionError};
pub use file_store::{FileCredentialStore, FileSnapshotStore};
pub use idle::{ActivityListener, ActivitySignal, IdleHandle, IdleMonitor};
pub use models::{
    FollowStatus, Journal, JournalEdit, JournalLink, MediaFile, NewAccount, NewJournal, Page,
    ProfileUpdate, PublicProfile, UserProfile,
};
pub use request::{ApiRequest, RequestBody, UploadPart};
pub use secret::{EnvSecretProvider, NoSecretProvider, SecretProvider, StaticSecretProvider};

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Bearer credential pair issued by the server.
///
/// Tokens are opaque; nothing here inspects their shape. Access-token expiry is
/// enforced by the server only.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// When this pair was stored on the client, for the retention window
    pub stored_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            stored_at: Utc::now(),
        }
    }

    /// Same refresh token, new access token.
    ///
    /// The copy is stamped with the current time, so every successful refresh
    /// starts a fresh retention window for the stored pair.
    pub fn with_access(&self, access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: self.refresh_token.clone(),
            stored_at: Utc::now(),
        }
    }

    /// Whether the client-side retention window has elapsed.
    ///
    /// A retention reaching past the representable date range never expires.
    pub fn is_stale(&self, retention: std::time::Duration) -> bool {
        let Ok(retention) = Duration::from_std(retention) else {
            return false;
        };
        match self.stored_at.checked_add_signed(retention) {
            Some(expires_at) => Utc::now() >= expires_at,
            None => false,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("stored_at", &self.stored_at)
            .finish()
    }
}

/// Holds at most one credential pair.
///
/// Mutation is synchronous and visible to the next `get`; `set` replaces the
/// whole pair at once.
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Option<Credential>;

    fn set(&self, credential: Credential);

    fn clear(&self);

    /// Current access token, if any
    fn access_token(&self) -> Option<String> {
        self.get().map(|c| c.access_token)
    }
}

/// In-memory credential store for tests and ephemeral sessions
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    slot: Arc<RwLock<Option<Credential>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Some(credential))),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Option<Credential> {
        self.slot.read().ok()?.clone()
    }

    fn set(&self, credential: Credential) {
        match self.slot.write() {
            Ok(mut slot) => *slot = Some(credential),
            Err(poisoned) => *poisoned.into_inner() = Some(credential),
        }
    }

    fn clear(&self) {
        match self.slot.write() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_whole_pair() {
        let store = MemoryCredentialStore::new();
        assert!(store.get().is_none());

        store.set(Credential::new("a1", Some("r1".to_string())));
        store.set(Credential::new("a2", None));

        let current = store.get().unwrap();
        assert_eq!(current.access_token, "a2");
        assert_eq!(current.refresh_token, None);
    }

    #[test]
    fn clear_removes_credential() {
        let store = MemoryCredentialStore::with_credential(Credential::new("a", None));
        assert_eq!(store.access_token().as_deref(), Some("a"));
        store.clear();
        assert!(store.get().is_none());
    }

    #[test]
    fn with_access_keeps_refresh_token() {
        let old = Credential::new("old", Some("refresh".to_string()));
        let new = old.with_access("new");
        assert_eq!(new.access_token, "new");
        assert_eq!(new.refresh_token.as_deref(), Some("refresh"));
    }

    #[test]
    fn staleness_follows_retention() {
        let mut credential = Credential::new("a", None);
        assert!(!credential.is_stale(std::time::Duration::from_secs(60)));

        credential.stored_at = Utc::now() - Duration::days(8);
        assert!(credential.is_stale(std::time::Duration::from_secs(7 * 24 * 3600)));
    }

    #[test]
    fn huge_retention_never_expires() {
        let credential = Credential::new("a", None);
        assert!(!credential.is_stale(std::time::Duration::from_secs(1_000_000_000 * 86_400)));
        assert!(!credential.is_stale(std::time::Duration::MAX));
    }

    #[test]
    fn refresh_restarts_retention_window() {
        let mut credential = Credential::new("old", Some("r".to_string()));
        credential.stored_at = Utc::now() - Duration::days(6);

        let refreshed = credential.with_access("new");
        assert!(refreshed.stored_at > credential.stored_at);
        assert!(!refreshed.is_stale(std::time::Duration::from_secs(24 * 3600)));
    }

    #[test]
    fn debug_redacts_tokens() {
        let credential = Credential::new("secret-access", Some("secret-refresh".to_string()));
        let printed = format!("{credential:?}");
        assert!(!printed.contains("secret-access"));
        assert!(!printed.contains("secret-refresh"));
    }
}

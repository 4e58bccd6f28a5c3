use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cache::{MemorySnapshotStore, SessionCache, SnapshotStore};
use crate::credential::{Credential, CredentialStore, MemoryCredentialStore};
use crate::errors::FatalSession;
use crate::models::UserProfile;

const EVENT_CAPACITY: usize = 16;

/// Why a session was torn down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownReason {
    LoggedOut,
    IdleTimeout,
    SessionExpired(FatalSession),
    AccountBlocked,
    ProfileUnavailable,
}

/// Session lifecycle notifications.
///
/// `Ended` is the cue to send the user back to an unauthenticated entry point.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SignedIn(UserProfile),
    Ended(TeardownReason),
}

/// Counter bumped by every teardown and every sign-in.
///
/// Work that started under one generation must not write session state back
/// once the generation has moved on. A refresh begun for an old session can
/// therefore neither patch nor tear down a session signed in after it.
pub type Generation = u64;

/// Explicit owner of the session state: credential store, session cache and
/// the teardown generation.
///
/// Teardown and credential write-back both run under the generation lock, so
/// a teardown can never interleave with a write-back.
pub struct SessionContext {
    credentials: Arc<dyn CredentialStore>,
    cache: SessionCache,
    generation: Mutex<Generation>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionContext {
    pub fn new(credentials: Arc<dyn CredentialStore>, snapshots: Arc<dyn SnapshotStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            credentials,
            cache: SessionCache::new(snapshots),
            generation: Mutex::new(0),
            events,
        }
    }

    /// Context backed only by memory
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MemorySnapshotStore::new()),
        )
    }

    pub fn credentials(&self) -> &dyn CredentialStore {
        self.credentials.as_ref()
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.cache.current()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn generation(&self) -> Generation {
        *self.lock_generation()
    }

    /// Current credential and generation, read together
    pub(crate) fn credential_with_generation(&self) -> (Option<Credential>, Generation) {
        let generation = self.lock_generation();
        (self.credentials.get(), *generation)
    }

    /// Store a freshly issued credential pair (login).
    ///
    /// The new pair replaces the old one whole and starts a new generation,
    /// so work still running for the previous session is fenced off.
    pub fn sign_in(&self, credential: Credential) {
        let mut generation = self.lock_generation();
        *generation += 1;
        self.credentials.set(credential);
        debug!(generation = *generation, "Credential pair stored");
    }

    /// Adopt a validated profile and announce it
    pub fn adopt(&self, user: UserProfile) {
        self.cache.adopt(user.clone());
        let _ = self.events.send(SessionEvent::SignedIn(user));
    }

    /// Replace the access token if the session is still the one of `generation`.
    ///
    /// Returns false (and writes nothing) when the session was torn down or
    /// replaced by a sign-in in the meantime, or no credential is left.
    pub fn replace_access_token(&self, generation: Generation, access_token: &str) -> bool {
        let current = self.lock_generation();
        if *current != generation {
            warn!("Discarding refreshed token: session changed while refreshing");
            return false;
        }
        match self.credentials.get() {
            Some(credential) => {
                self.credentials.set(credential.with_access(access_token));
                true
            }
            None => false,
        }
    }

    /// Clear credential and cache, bump the generation and publish `Ended`
    pub fn teardown(&self, reason: TeardownReason) {
        let mut generation = self.lock_generation();
        self.teardown_locked(&mut generation, reason);
    }

    /// Tear down only if the session is still the one of `generation`.
    ///
    /// One bad-credential episode may be observed by many requests; only the
    /// first one tears the session down. Returns whether it did.
    pub fn teardown_episode(&self, generation: Generation, reason: TeardownReason) -> bool {
        let mut current = self.lock_generation();
        if *current != generation {
            return false;
        }
        self.teardown_locked(&mut current, reason);
        true
    }

    fn teardown_locked(&self, generation: &mut MutexGuard<'_, Generation>, reason: TeardownReason) {
        **generation += 1;
        self.credentials.clear();
        self.cache.clear();
        info!(?reason, generation = **generation, "Session torn down");
        let _ = self.events.send(SessionEvent::Ended(reason));
    }

    fn lock_generation(&self) -> MutexGuard<'_, Generation> {
        self.generation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("signed_in", &self.credentials.get().is_some())
            .field("cache", &self.cache)
            .field("generation", &self.generation())
            .finish()
    }
}

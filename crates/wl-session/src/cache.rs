use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::errors::Result;
use crate::models::UserProfile;

/// Persistence for the last-known session snapshot
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<Option<UserProfile>>;

    fn save(&self, user: &UserProfile) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

/// Snapshot store that only lives as long as the process
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    snapshot: Arc<RwLock<Option<UserProfile>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeded store, as if a previous run had persisted `user`
    pub fn with_snapshot(user: UserProfile) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(Some(user))),
        }
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<UserProfile>> {
        Ok(self.snapshot.read().map(|s| s.clone()).unwrap_or_default())
    }

    fn save(&self, user: &UserProfile) -> Result<()> {
        if let Ok(mut snapshot) = self.snapshot.write() {
            *snapshot = Some(user.clone());
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if let Ok(mut snapshot) = self.snapshot.write() {
            *snapshot = None;
        }
        Ok(())
    }
}

/// Single source of truth for who is signed in.
///
/// `adopt` and `clear` are the only mutations. Both write through to the
/// snapshot store; a persistence failure is logged and never blocks the
/// in-memory update.
pub struct SessionCache {
    current: RwLock<Option<UserProfile>>,
    persistence: Arc<dyn SnapshotStore>,
}

impl SessionCache {
    pub fn new(persistence: Arc<dyn SnapshotStore>) -> Self {
        Self {
            current: RwLock::new(None),
            persistence,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySnapshotStore::new()))
    }

    /// Restore the last persisted snapshot into memory.
    ///
    /// The restored user is provisional until the startup re-validation
    /// adopts or clears it.
    pub fn rehydrate(&self) -> Option<UserProfile> {
        let snapshot = match self.persistence.load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to load session snapshot: {}", e);
                None
            }
        };
        debug!(present = snapshot.is_some(), "Rehydrated session snapshot");
        self.replace(snapshot.clone());
        snapshot
    }

    pub fn adopt(&self, user: UserProfile) {
        if let Err(e) = self.persistence.save(&user) {
            warn!("Failed to persist session snapshot: {}", e);
        }
        self.replace(Some(user));
    }

    pub fn clear(&self) {
        if let Err(e) = self.persistence.clear() {
            warn!("Failed to clear session snapshot: {}", e);
        }
        self.replace(None);
    }

    pub fn current(&self) -> Option<UserProfile> {
        self.current.read().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn is_present(&self) -> bool {
        self.current.read().map(|c| c.is_some()).unwrap_or(false)
    }

    fn replace(&self, value: Option<UserProfile>) {
        match self.current.write() {
            Ok(mut current) => *current = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("present", &self.is_present())
            .finish()
    }
}

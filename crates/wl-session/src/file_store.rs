use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use fs2::FileExt;
use tracing::{debug, error, warn};

use crate::cache::SnapshotStore;
use crate::credential::{Credential, CredentialStore};
use crate::errors::{Result, SessionError};
use crate::models::UserProfile;
use crate::secret::SecretProvider;
use crate::vault::{self, SealedBlob, VaultKey};

const CREDENTIAL_FILE: &str = "credential.json";
const SNAPSHOT_FILE: &str = "snapshot.json";
const LOCK_FILE: &str = "lock";
const CREDENTIAL_LABEL: &str = "credential";

/// Default directory for persisted session state
pub fn default_storage_dir() -> Result<PathBuf> {
    let project_dirs = directories::ProjectDirs::from("com", "wanderlog", "wanderlog")
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine the data directory",
            )
        })?;
    Ok(project_dirs.data_dir().join("session"))
}

fn ensure_private_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// Write `contents` to `path` through a synced temp file and a rename
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600))?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Credential store sealed on disk.
///
/// Reads are served from memory; writes update memory first and then the
/// sealed file, so `get` right after `set` never waits on the disk. A
/// credential past the retention window is purged on the next read.
///
/// # Directory Structure
/// ```text
/// ~/.local/share/wanderlog/session/
/// ├── vault.json         # Vault metadata (passphrase salt)
/// ├── lock               # Advisory lock file
/// ├── credential.json    # Sealed credential pair
/// └── snapshot.json      # Last signed-in user (FileSnapshotStore)
/// ```
pub struct FileCredentialStore {
    credential_path: PathBuf,
    lock_path: PathBuf,
    key: VaultKey,
    retention: Duration,
    cached: RwLock<Option<Credential>>,
    // Keeps the memory and disk updates of one `set`/`clear` together
    writes: Mutex<()>,
}

impl FileCredentialStore {
    /// Open the store, resolving the vault key through the keyring or `secret_provider`
    pub async fn open(
        storage_dir: impl AsRef<Path>,
        secret_provider: Arc<dyn SecretProvider>,
        retention: Duration,
    ) -> Result<Self> {
        let storage_dir = storage_dir.as_ref();
        ensure_private_dir(storage_dir)?;
        let key = vault::load_key(storage_dir, &secret_provider).await?;
        Self::with_key(storage_dir, key, retention)
    }

    /// Open the store with an already known vault key
    pub fn with_key(storage_dir: impl AsRef<Path>, key: VaultKey, retention: Duration) -> Result<Self> {
        let storage_dir = storage_dir.as_ref();
        ensure_private_dir(storage_dir)?;

        let store = Self {
            credential_path: storage_dir.join(CREDENTIAL_FILE),
            lock_path: storage_dir.join(LOCK_FILE),
            key,
            retention,
            cached: RwLock::new(None),
            writes: Mutex::new(()),
        };

        let loaded = match store.read_sealed() {
            Ok(loaded) => loaded,
            Err(SessionError::CorruptedStore) => {
                warn!("Stored credential cannot be opened, discarding it");
                store.remove_sealed()?;
                None
            }
            Err(e) => return Err(e),
        };
        if let Ok(mut cached) = store.cached.write() {
            *cached = loaded;
        }
        Ok(store)
    }

    fn acquire_lock(&self) -> Result<File> {
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        lock.try_lock_exclusive()
            .map_err(|_| SessionError::LockTimeout)?;
        Ok(lock)
    }

    fn read_sealed(&self) -> Result<Option<Credential>> {
        let content = match fs::read_to_string(&self.credential_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let blob: SealedBlob =
            serde_json::from_str(&content).map_err(|_| SessionError::CorruptedStore)?;
        let plaintext = zeroize::Zeroizing::new(vault::open(&self.key, &blob, CREDENTIAL_LABEL)?);
        let credential =
            serde_json::from_slice(&plaintext).map_err(|_| SessionError::CorruptedStore)?;
        Ok(Some(credential))
    }

    fn write_sealed(&self, credential: &Credential) -> Result<()> {
        let _lock = self.acquire_lock()?;
        let plaintext = zeroize::Zeroizing::new(serde_json::to_vec(credential)?);
        let blob = vault::seal(&self.key, &plaintext, CREDENTIAL_LABEL)?;
        write_atomic(&self.credential_path, serde_json::to_string_pretty(&blob)?.as_bytes())
    }

    fn remove_sealed(&self) -> Result<()> {
        let _lock = self.acquire_lock()?;
        remove_if_exists(&self.credential_path)
    }

    fn replace_cached(&self, value: Option<Credential>) {
        match self.cached.write() {
            Ok(mut cached) => *cached = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Option<Credential> {
        let credential = self.cached.read().ok()?.clone()?;
        if credential.is_stale(self.retention) {
            debug!("Stored credential is past its retention window");
            self.clear();
            return None;
        }
        Some(credential)
    }

    fn set(&self, credential: Credential) {
        let _writes = self.writes.lock().unwrap_or_else(|p| p.into_inner());
        self.replace_cached(Some(credential.clone()));
        if let Err(e) = self.write_sealed(&credential) {
            error!("Failed to persist credential: {}", e);
        }
    }

    fn clear(&self) {
        let _writes = self.writes.lock().unwrap_or_else(|p| p.into_inner());
        self.replace_cached(None);
        if let Err(e) = self.remove_sealed() {
            error!("Failed to remove persisted credential: {}", e);
        }
    }
}

impl std::fmt::Debug for FileCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCredentialStore")
            .field("credential_path", &self.credential_path)
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

/// Session snapshot kept as plain JSON (it holds no secrets)
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(storage_dir: impl AsRef<Path>) -> Result<Self> {
        let storage_dir = storage_dir.as_ref();
        ensure_private_dir(storage_dir)?;
        Ok(Self {
            path: storage_dir.join(SNAPSHOT_FILE),
        })
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<UserProfile>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, user: &UserProfile) -> Result<()> {
        write_atomic(&self.path, serde_json::to_string_pretty(user)?.as_bytes())
    }

    fn clear(&self) -> Result<()> {
        remove_if_exists(&self.path)
    }
}

//! At-rest sealing of credentials.
//!
//! Credentials are sealed with AES-256-GCM. The vault key lives in the OS
//! keyring when available; otherwise it is derived from a passphrase with
//! Argon2id, the salt being kept next to the sealed data in `vault.json`.

use std::path::Path;
use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{Result, SessionError};
use crate::secret::SecretProvider;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const SALT_LEN: usize = 16;
const SEAL_VERSION: &str = "v1";

#[cfg(feature = "keyring-support")]
const KEYRING_SERVICE: &str = "wanderlog";
#[cfg(feature = "keyring-support")]
const KEYRING_USER: &str = "credential-vault:v1";

/// 256-bit vault key, wiped on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey([u8; KEY_LEN]);

impl VaultKey {
    pub fn generate() -> Result<Self> {
        let mut key = [0u8; KEY_LEN];
        fill_random(&mut key)?;
        Ok(Self(key))
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Derive a key from a passphrase with Argon2id (m=64MiB, t=3, p=1)
    pub fn derive(passphrase: &[u8], salt: &[u8]) -> Result<Self> {
        let params = Params::new(65536, 3, 1, Some(KEY_LEN))
            .map_err(|e| SessionError::Crypto(format!("invalid Argon2 params: {}", e)))?;
        let mut key = [0u8; KEY_LEN];
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(passphrase, salt, &mut key)
            .map_err(|e| SessionError::Crypto(format!("key derivation failed: {}", e)))?;
        Ok(Self(key))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey([REDACTED])")
    }
}

/// Ciphertext plus what is needed to open it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedBlob {
    pub version: String,
    pub nonce: String,
    pub ciphertext: String,
}

fn associated_data(version: &str, label: &str) -> String {
    format!("wanderlog|{}|{}", version, label)
}

/// Seal `plaintext`, binding it to `label` so blobs cannot be swapped between slots
pub fn seal(key: &VaultKey, plaintext: &[u8], label: &str) -> Result<SealedBlob> {
    let mut nonce = [0u8; NONCE_LEN];
    fill_random(&mut nonce)?;

    let aad = associated_data(SEAL_VERSION, label);
    let ciphertext = key
        .cipher()
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|e| SessionError::Crypto(format!("sealing failed: {}", e)))?;

    Ok(SealedBlob {
        version: SEAL_VERSION.to_string(),
        nonce: URL_SAFE_NO_PAD.encode(nonce),
        ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
    })
}

/// Open a blob produced by [`seal`] with the same key and label
pub fn open(key: &VaultKey, blob: &SealedBlob, label: &str) -> Result<Vec<u8>> {
    let nonce = URL_SAFE_NO_PAD
        .decode(&blob.nonce)
        .map_err(|_| SessionError::CorruptedStore)?;
    if nonce.len() != NONCE_LEN {
        return Err(SessionError::CorruptedStore);
    }
    let ciphertext = URL_SAFE_NO_PAD
        .decode(&blob.ciphertext)
        .map_err(|_| SessionError::CorruptedStore)?;

    let aad = associated_data(&blob.version, label);
    key.cipher()
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &ciphertext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| SessionError::CorruptedStore)
}

fn fill_random(buf: &mut [u8]) -> Result<()> {
    getrandom::fill(buf).map_err(|e| SessionError::Crypto(format!("no randomness: {}", e)))
}

/// Vault metadata persisted beside the sealed credential
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VaultMeta {
    version: u32,
    created_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    passphrase_salt: Option<String>,
}

impl Default for VaultMeta {
    fn default() -> Self {
        Self {
            version: 1,
            created_at: chrono::Utc::now(),
            passphrase_salt: None,
        }
    }
}

/// Resolve the vault key for `storage_dir`.
///
/// Keyring first. On a fresh vault with an empty keyring a random key is
/// minted there. Otherwise the key is derived from the provider's passphrase
/// and, when possible, saved into the keyring for the next start.
pub async fn load_key(
    storage_dir: &Path,
    secret_provider: &Arc<dyn SecretProvider>,
) -> Result<VaultKey> {
    let meta_path = storage_dir.join("vault.json");
    let mut meta = if tokio::fs::try_exists(&meta_path).await? {
        let content = tokio::fs::read_to_string(&meta_path).await?;
        serde_json::from_str(&content).map_err(|_| SessionError::CorruptedStore)?
    } else {
        VaultMeta::default()
    };

    #[cfg(feature = "keyring-support")]
    let key = {
        let lookup = keyring_lookup();
        let minted = if keyring_can_mint(&lookup, &meta) {
            match mint_keyring_key() {
                Ok(key) => {
                    tracing::info!("Generated a new vault key in the OS keyring");
                    Some(key)
                }
                Err(e) => {
                    tracing::debug!("Keyring did not keep a new key ({}), using passphrase", e);
                    None
                }
            }
        } else {
            None
        };

        match (lookup, minted) {
            (_, Some(key)) => key,
            (KeyringLookup::Found(key), None) => {
                tracing::debug!("Loaded vault key from OS keyring");
                key
            }
            (lookup, None) => {
                if let KeyringLookup::Unavailable(reason) = &lookup {
                    tracing::debug!("Keyring unavailable ({}), falling back to passphrase", reason);
                }
                let key = passphrase_key(&mut meta, secret_provider).await?;
                if let Err(e) = store_keyring_key(&key) {
                    tracing::warn!("Failed to save vault key to keyring: {}", e);
                }
                key
            }
        }
    };

    #[cfg(not(feature = "keyring-support"))]
    let key = passphrase_key(&mut meta, secret_provider).await?;

    tokio::fs::write(&meta_path, serde_json::to_string_pretty(&meta)?).await?;
    Ok(key)
}

async fn passphrase_key(
    meta: &mut VaultMeta,
    secret_provider: &Arc<dyn SecretProvider>,
) -> Result<VaultKey> {
    let salt = match meta.passphrase_salt.as_deref() {
        Some(encoded) => STANDARD
            .decode(encoded)
            .map_err(|_| SessionError::CorruptedStore)?,
        None => {
            let mut salt = vec![0u8; SALT_LEN];
            fill_random(&mut salt)?;
            meta.passphrase_salt = Some(STANDARD.encode(&salt));
            salt
        }
    };

    let passphrase = secret_provider
        .get_passphrase("Passphrase for the wanderlog credential vault")
        .await
        .ok_or(SessionError::UserCancelled)?;

    VaultKey::derive(passphrase.as_bytes(), &salt)
}

#[cfg(feature = "keyring-support")]
enum KeyringLookup {
    Found(VaultKey),
    Empty,
    Unavailable(String),
}

#[cfg(feature = "keyring-support")]
fn keyring_lookup() -> KeyringLookup {
    let entry = match keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER) {
        Ok(entry) => entry,
        Err(e) => return KeyringLookup::Unavailable(e.to_string()),
    };
    match entry.get_password() {
        Ok(encoded) => match decode_key(&encoded) {
            Some(key) => KeyringLookup::Found(key),
            None => KeyringLookup::Unavailable("stored vault key is malformed".to_string()),
        },
        Err(keyring::Error::NoEntry) => KeyringLookup::Empty,
        Err(e) => KeyringLookup::Unavailable(e.to_string()),
    }
}

/// A random key may only be minted for a vault that never used a passphrase;
/// anything already sealed under a derived key must stay readable.
#[cfg(feature = "keyring-support")]
fn keyring_can_mint(lookup: &KeyringLookup, meta: &VaultMeta) -> bool {
    matches!(lookup, KeyringLookup::Empty) && meta.passphrase_salt.is_none()
}

/// Store a fresh key and read it back through a new entry. Keyring backends
/// that do not persist across entries are reported as failures.
#[cfg(feature = "keyring-support")]
fn mint_keyring_key() -> Result<VaultKey> {
    let key = VaultKey::generate()?;
    store_keyring_key(&key)?;
    match keyring_lookup() {
        KeyringLookup::Found(stored) if stored.0 == key.0 => Ok(key),
        _ => Err(SessionError::Keyring(
            "vault key was not kept by the keyring".to_string(),
        )),
    }
}

#[cfg_attr(not(feature = "keyring-support"), allow(dead_code))]
fn decode_key(encoded: &str) -> Option<VaultKey> {
    let bytes: [u8; KEY_LEN] = STANDARD.decode(encoded).ok()?.try_into().ok()?;
    Some(VaultKey::from_bytes(bytes))
}

#[cfg(feature = "keyring-support")]
fn store_keyring_key(key: &VaultKey) -> Result<()> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)
        .map_err(|e| SessionError::Keyring(e.to_string()))?;
    entry
        .set_password(&STANDARD.encode(key.0))
        .map_err(|e| SessionError::Keyring(e.to_string()))
}

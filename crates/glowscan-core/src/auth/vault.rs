//! Durable, encrypted-at-rest backing for the credential store.
//!
//! `EncryptedFileVault` seals the serialized credential set with
//! ChaCha20-Poly1305. The key is derived with Argon2 from a passphrase and a
//! random salt kept in the file header:
//!
//! ```text
//! "GSV1" | salt (16 bytes) | nonce (12 bytes) | ciphertext
//! ```
//!
//! The passphrase itself lives in the OS keychain (see [`vault_passphrase`]).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use argon2::Argon2;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use keyring::Entry;
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use thiserror::Error;
use tracing::{debug, warn};

const MAGIC: &[u8; 4] = b"GSV1";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = MAGIC.len() + SALT_LEN;

const KEYRING_SERVICE: &str = "glowscan";
const KEYRING_USER: &str = "vault-passphrase";
const PASSPHRASE_LEN: usize = 48;

/// Overrides the keychain passphrase, e.g. on headless machines.
pub const PASSPHRASE_ENV: &str = "GLOWSCAN_VAULT_PASSPHRASE";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("Encryption error: {0}")]
    Crypto(String),

    #[error("Keychain error: {0}")]
    Keychain(String),
}

/// Where the credential store keeps its bytes.
pub trait SecretBackend: Send + Sync {
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError>;
    fn store(&self, bytes: &[u8]) -> Result<(), StorageError>;
    fn erase(&self) -> Result<(), StorageError>;
}

/// In-process backend. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryVault {
    bytes: Mutex<Option<Vec<u8>>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretBackend for MemoryVault {
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.bytes.lock().clone())
    }

    fn store(&self, bytes: &[u8]) -> Result<(), StorageError> {
        *self.bytes.lock() = Some(bytes.to_vec());
        Ok(())
    }

    fn erase(&self) -> Result<(), StorageError> {
        *self.bytes.lock() = None;
        Ok(())
    }
}

pub struct EncryptedFileVault {
    path: PathBuf,
    salt: [u8; SALT_LEN],
    cipher: ChaCha20Poly1305,
}

impl EncryptedFileVault {
    /// Open the vault at `path`, reusing the salt of an existing file.
    pub fn open(path: impl AsRef<Path>, passphrase: &str) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let salt = match Self::read_salt(&path)? {
            Some(salt) => salt,
            None => {
                let mut salt = [0u8; SALT_LEN];
                rand::thread_rng().fill_bytes(&mut salt);
                salt
            }
        };

        let mut key = [0u8; 32];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), &salt, &mut key)
            .map_err(|e| StorageError::Crypto(format!("key derivation failed: {}", e)))?;

        Ok(Self {
            path,
            salt,
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_salt(path: &Path) -> Result<Option<[u8; SALT_LEN]>, StorageError> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path).map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
            warn!(path = %path.display(), "Vault header unrecognized, a new salt will be used");
            return Ok(None);
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[MAGIC.len()..HEADER_LEN]);
        Ok(Some(salt))
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SecretBackend for EncryptedFileVault {
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path).map_err(|e| self.io_error(e))?;
        if bytes.len() < HEADER_LEN + NONCE_LEN || &bytes[..MAGIC.len()] != MAGIC {
            return Err(StorageError::Corrupt("vault header".to_string()));
        }
        if bytes[MAGIC.len()..HEADER_LEN] != self.salt {
            return Err(StorageError::Corrupt("vault salt changed since open".to_string()));
        }

        let nonce = Nonce::from_slice(&bytes[HEADER_LEN..HEADER_LEN + NONCE_LEN]);
        let plaintext = self
            .cipher
            .decrypt(nonce, &bytes[HEADER_LEN + NONCE_LEN..])
            .map_err(|_| StorageError::Crypto("failed to decrypt vault (wrong passphrase?)".to_string()))?;
        Ok(Some(plaintext))
    }

    fn store(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, bytes)
            .map_err(|e| StorageError::Crypto(format!("failed to encrypt vault: {}", e)))?;

        let mut out = Vec::with_capacity(HEADER_LEN + NONCE_LEN + ciphertext.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);

        write_private(&self.path, &out).map_err(|e| self.io_error(e))?;
        debug!(path = %self.path.display(), "Vault written");
        Ok(())
    }

    fn erase(&self) -> Result<(), StorageError> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| self.io_error(e))?;
        }
        Ok(())
    }
}

/// Write `bytes` to `path` through an owner-only temp file and a rename.
/// Readers only ever see a complete file.
pub(crate) fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(&tmp)?;
    // A stale temp file keeps its old mode through `open`.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)
}

/// Passphrase for the vault: `GLOWSCAN_VAULT_PASSPHRASE`, else the OS
/// keychain, generating and storing a random one on first use.
pub fn vault_passphrase() -> Result<String, StorageError> {
    if let Ok(passphrase) = std::env::var(PASSPHRASE_ENV) {
        if !passphrase.is_empty() {
            return Ok(passphrase);
        }
    }

    let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER).map_err(keychain_error)?;
    keychain_passphrase(&entry)
}

/// Read the passphrase from `entry`, creating it only when the entry does
/// not exist. Any other keychain failure is returned so an existing vault
/// is never orphaned by a fresh passphrase.
fn keychain_passphrase(entry: &Entry) -> Result<String, StorageError> {
    match entry.get_password() {
        Ok(passphrase) if !passphrase.is_empty() => Ok(passphrase),
        Ok(_) | Err(keyring::Error::NoEntry) => {
            let passphrase: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(PASSPHRASE_LEN)
                .map(char::from)
                .collect();
            entry.set_password(&passphrase).map_err(keychain_error)?;
            debug!("Generated new vault passphrase");
            Ok(passphrase)
        }
        Err(e) => Err(keychain_error(e)),
    }
}

fn keychain_error(err: keyring::Error) -> StorageError {
    StorageError::Keychain(err.to_string())
}

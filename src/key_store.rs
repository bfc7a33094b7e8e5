//! Where the local identity key lives.
//!
//! The flows never open the key file themselves; they are handed a
//! [`KeyStore`] and reload the key from it on every operation.

use rsa::RsaPrivateKey;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use zeroize::Zeroizing;

use crate::crypt::{self, CryptoError};

pub trait KeyStore {
    /// Loads the stored private key.
    ///
    /// Fails with [`CryptoError::MissingPrivateKey`] when no key was stored or
    /// the stored key cannot be parsed.
    fn load_private_key(&self) -> Result<RsaPrivateKey, CryptoError>;

    /// Replaces the stored private key. Any previous key is lost.
    fn store_private_key(&self, key: &RsaPrivateKey) -> Result<(), CryptoError>;
}

/// Generates a new identity, stores its private half and returns the public
/// half as PEM, ready to be published.
pub fn generate_key_pair(store: &impl KeyStore) -> Result<String, CryptoError> {
    let private_key = crypt::generate_private_key()?;
    store.store_private_key(&private_key)?;
    tracing::debug!("stored new {}-bit private key", crypt::KEY_BITS);
    crypt::public_key_to_pem(&private_key.to_public_key())
}

/// PEM of the public half of the stored key.
pub fn export_public_key(store: &impl KeyStore) -> Result<String, CryptoError> {
    let private_key = store.load_private_key()?;
    crypt::public_key_to_pem(&private_key.to_public_key())
}

// --

/// Private key kept as a single PEM file.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileKeyStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyStore for FileKeyStore {
    fn load_private_key(&self) -> Result<RsaPrivateKey, CryptoError> {
        let pem = match fs::read_to_string(&self.path) {
            Ok(pem) => Zeroizing::new(pem),
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!("failed to read {}: {}", self.path.display(), e);
                }
                return Err(CryptoError::MissingPrivateKey);
            }
        };
        crypt::private_key_from_pem(&pem)
    }

    /// Writes to a temporary file next to the key and renames it over the old
    /// one, so readers see either the old key or the new one in full.
    fn store_private_key(&self, key: &RsaPrivateKey) -> Result<(), CryptoError> {
        let pem = crypt::private_key_to_pem(key)?;
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(pem.as_bytes())?;
        tmp.as_file().sync_all()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))?;
        }
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Keeps the PEM in memory. Used where touching the filesystem is unwanted.
#[derive(Default)]
pub struct MemoryKeyStore {
    pem: Mutex<Option<Zeroizing<String>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: &RsaPrivateKey) -> Result<Self, CryptoError> {
        let store = Self::new();
        store.store_private_key(key)?;
        Ok(store)
    }
}

impl KeyStore for MemoryKeyStore {
    fn load_private_key(&self) -> Result<RsaPrivateKey, CryptoError> {
        let pem = self.pem.lock().map_err(|_| CryptoError::MissingPrivateKey)?;
        match pem.as_ref() {
            Some(pem) => crypt::private_key_from_pem(pem),
            None => Err(CryptoError::MissingPrivateKey),
        }
    }

    fn store_private_key(&self, key: &RsaPrivateKey) -> Result<(), CryptoError> {
        let encoded = crypt::private_key_to_pem(key)?;
        let mut pem = self.pem.lock().map_err(|_| CryptoError::OperationFailed)?;
        *pem = Some(encoded);
        Ok(())
    }
}

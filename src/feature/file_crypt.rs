//! File-level sign / encrypt / decrypt flows over a workspace.
//!
//! These wrap the in-memory primitives of [`crate::crypt`] with the local
//! state they need: the identity key, the pending signatures, and the
//! directory used to find other users' public keys. The command-level
//! sequences (sign, resolve, encrypt) live in [`crate::feature::files`].

use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::config::Workspace;
use crate::crypt::{self, CryptoError};
use crate::directory::KeyDirectory;
use crate::key_store::{FileKeyStore, KeyStore};
use crate::signature_store::SignatureStore;

/// How the receiver expects an envelope to have been produced. Envelopes
/// carry no marker of their own, so the caller has to say.
#[derive(Debug, Clone, Copy)]
pub enum Origin<'a> {
    /// Signed by `source_id`; the signature is split off and verified.
    Signed { source_id: &'a str },
    /// Encrypted without a signature; the whole payload is returned.
    Unsigned,
}

pub struct FileCrypt<K> {
    key_store: K,
    signatures: SignatureStore,
    encrypted_dir: PathBuf,
}

impl FileCrypt<FileKeyStore> {
    pub fn from_workspace(workspace: &Workspace) -> Self {
        FileCrypt::new(
            FileKeyStore::new(workspace.private_key_path()),
            SignatureStore::new(workspace.signed_dir()),
            workspace.encrypted_dir(),
        )
    }
}

impl<K: KeyStore> FileCrypt<K> {
    pub fn new(key_store: K, signatures: SignatureStore, encrypted_dir: impl Into<PathBuf>) -> Self {
        FileCrypt {
            key_store,
            signatures,
            encrypted_dir: encrypted_dir.into(),
        }
    }

    pub fn key_store(&self) -> &K {
        &self.key_store
    }

    //
    // Signing
    //

    /// Signs the file at `path` and leaves the signature pending for the
    /// next encryption of a file with the same name.
    pub fn sign_file(&self, path: &Path) -> Result<PathBuf, CryptoError> {
        let content = read_source(path)?;
        let private_key = self.key_store.load_private_key()?;
        let signature = crypt::sign(&content, &private_key)?;
        let slot = self.signatures.save(&file_name(path)?, &signature)?;
        tracing::debug!("signed {} ({} bytes)", path.display(), content.len());
        Ok(slot)
    }

    //
    // Encryption
    //

    /// Looks up and parses the recipient's public key.
    pub async fn resolve_recipient<D: KeyDirectory>(
        &self,
        directory: &D,
        dest_id: &str,
    ) -> Result<RsaPublicKey, CryptoError> {
        resolve_public_key(directory, dest_id)
            .await
            .ok_or_else(|| CryptoError::RecipientKeyUnavailable(dest_id.to_string()))
    }

    /// Encrypts the file at `path` for `recipient` and writes the envelope
    /// to the encrypted-files directory under the same name.
    ///
    /// A signature pending for the file is merged in front of the content
    /// and removed once the envelope is on disk. The envelope appears under
    /// its final name only once it is complete; on failure the signature
    /// stays pending.
    ///
    /// Callers resolve `recipient` before calling this, so an unknown
    /// recipient never gets as far as reading the file.
    pub fn encrypt_file_for(
        &self,
        path: &Path,
        recipient: &RsaPublicKey,
    ) -> Result<PathBuf, CryptoError> {
        let content = read_source(path)?;
        let name = file_name(path)?;
        let pending = self.signatures.pending(&name)?;

        let envelope = crypt::encrypt_envelope(&content, pending.as_deref(), recipient)?;

        fs::create_dir_all(&self.encrypted_dir)?;
        let out = self.encrypted_dir.join(&name);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.encrypted_dir)?;
        tmp.write_all(&envelope.to_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&out).map_err(|e| e.error)?;
        if pending.is_some() {
            self.signatures.discard(&name)?;
        }
        tracing::debug!(
            "encrypted {} into {} ({} bytes, signed: {})",
            path.display(),
            out.display(),
            envelope.encoded_len(),
            pending.is_some()
        );
        Ok(out)
    }

    //
    // Decryption
    //

    pub fn load_private_key(&self) -> Result<RsaPrivateKey, CryptoError> {
        self.key_store.load_private_key()
    }

    /// Looks up and parses the sender's public key.
    pub async fn resolve_sender<D: KeyDirectory>(
        &self,
        directory: &D,
        source_id: &str,
    ) -> Result<RsaPublicKey, CryptoError> {
        resolve_public_key(directory, source_id)
            .await
            .ok_or_else(|| CryptoError::SignerKeyUnavailable(source_id.to_string()))
    }

    /// Opens envelope bytes addressed to the local key.
    ///
    /// With [`Origin::Signed`] the sender's key is resolved first and the
    /// message is only returned if its signature verifies.
    pub async fn decrypt<D: KeyDirectory>(
        &self,
        envelope: &[u8],
        origin: Origin<'_>,
        directory: &D,
    ) -> Result<Vec<u8>, CryptoError> {
        let private_key = self.load_private_key()?;
        match origin {
            Origin::Signed { source_id } => {
                let sender = self.resolve_sender(directory, source_id).await?;
                crypt::decrypt_envelope(envelope, &sender, &private_key)
            }
            Origin::Unsigned => crypt::decrypt_envelope_unsigned(envelope, &private_key),
        }
    }
}

// --

async fn resolve_public_key<D: KeyDirectory>(directory: &D, user_id: &str) -> Option<RsaPublicKey> {
    let pem = match directory.lookup_public_key(user_id).await {
        Ok(pem) => pem,
        Err(e) => {
            tracing::warn!("public key lookup for '{}' failed: {}", user_id, e);
            return None;
        }
    };
    let key = crypt::public_key_from_pem(&pem);
    if key.is_none() {
        tracing::warn!("public key published for '{}' is not a valid RSA key", user_id);
    }
    key
}

fn read_source(path: &Path) -> Result<Vec<u8>, CryptoError> {
    fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::IsADirectory => {
            CryptoError::SourceNotFound(path.display().to_string())
        }
        _ => CryptoError::Io(e),
    })
}

fn file_name(path: &Path) -> Result<String, CryptoError> {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| CryptoError::SourceNotFound(path.display().to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::crypt::tests::{alice, bob, mallory};
    use crate::directory::LookupError;
    use crate::key_store::MemoryKeyStore;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Directory backed by a map, standing in for the server.
    pub(crate) struct MapDirectory(pub(crate) HashMap<String, String>);

    impl MapDirectory {
        pub(crate) fn new(entries: &[(&str, &RsaPrivateKey)]) -> Self {
            MapDirectory(
                entries
                    .iter()
                    .map(|(id, key)| {
                        (
                            id.to_string(),
                            crypt::public_key_to_pem(&key.to_public_key()).unwrap(),
                        )
                    })
                    .collect(),
            )
        }

        /// Alice and Bob, both published.
        pub(crate) fn pair() -> Self {
            MapDirectory::new(&[("alice", alice()), ("bob", bob())])
        }
    }

    impl KeyDirectory for MapDirectory {
        async fn lookup_public_key(&self, user_id: &str) -> Result<String, LookupError> {
            self.0.get(user_id).cloned().ok_or(LookupError::NoPublicKey)
        }
    }

    pub(crate) fn party(
        dir: &TempDir,
        name: &str,
        key: Option<&RsaPrivateKey>,
    ) -> FileCrypt<MemoryKeyStore> {
        let store = match key {
            Some(key) => MemoryKeyStore::with_key(key).unwrap(),
            None => MemoryKeyStore::new(),
        };
        let workspace = Workspace::new(dir.path().join(name));
        FileCrypt::new(store, SignatureStore::new(workspace.signed_dir()), workspace.encrypted_dir())
    }

    pub(crate) fn write_source(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    impl FileCrypt<MemoryKeyStore> {
        pub(crate) fn has_pending_signature(&self, file_name: &str) -> bool {
            self.signatures.pending(file_name).unwrap().is_some()
        }

        pub(crate) fn encrypted_dir(&self) -> &Path {
            &self.encrypted_dir
        }
    }

    #[test]
    fn test_signature_is_consumed_once() {
        let dir = tempfile::tempdir().unwrap();
        let sender = party(&dir, "alice", Some(alice()));
        let source = write_source(&dir, "report.txt", b"quarterly numbers");
        let bob_public = bob().to_public_key();

        sender.sign_file(&source).unwrap();
        assert!(sender.has_pending_signature("report.txt"));

        let first = fs::read(sender.encrypt_file_for(&source, &bob_public).unwrap()).unwrap();
        assert!(!sender.has_pending_signature("report.txt"));

        // The second envelope no longer carries a signature.
        let second = fs::read(sender.encrypt_file_for(&source, &bob_public).unwrap()).unwrap();

        let alice_public = alice().to_public_key();
        assert_eq!(
            crypt::decrypt_envelope(&first, &alice_public, bob()).unwrap(),
            b"quarterly numbers"
        );
        assert!(matches!(
            crypt::decrypt_envelope(&second, &alice_public, bob()),
            Err(CryptoError::InvalidSignature)
        ));
        assert_eq!(
            crypt::decrypt_envelope_unsigned(&second, bob()).unwrap(),
            b"quarterly numbers"
        );
    }

    #[test]
    fn test_failed_envelope_write_keeps_signature() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryKeyStore::with_key(alice()).unwrap();
        let blocked = dir.path().join("encrypted_files");
        fs::write(&blocked, b"not a directory").unwrap();
        let sender = FileCrypt::new(store, SignatureStore::new(dir.path().join("signed")), &blocked);
        let source = write_source(&dir, "a.txt", b"a");

        sender.sign_file(&source).unwrap();
        let result = sender.encrypt_file_for(&source, &bob().to_public_key());
        assert!(matches!(result, Err(CryptoError::Io(_))));
        assert!(sender.has_pending_signature("a.txt"));
        assert_eq!(fs::read(&blocked).unwrap(), b"not a directory");
    }

    #[test]
    fn test_envelope_write_leaves_no_temporaries() {
        let dir = tempfile::tempdir().unwrap();
        let sender = party(&dir, "alice", Some(alice()));
        let source = write_source(&dir, "a.txt", b"a");
        let bob_public = bob().to_public_key();

        sender.encrypt_file_for(&source, &bob_public).unwrap();
        sender.encrypt_file_for(&source, &bob_public).unwrap();

        let entries: Vec<_> = fs::read_dir(sender.encrypted_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("a.txt")]);
    }

    #[tokio::test]
    async fn test_resolve_rejects_unusable_keys() {
        let dir = tempfile::tempdir().unwrap();
        let sender = party(&dir, "alice", Some(alice()));
        let mut directory = MapDirectory::pair();
        directory.0.insert("eve".to_string(), "not a key".to_string());

        assert!(matches!(
            sender.resolve_recipient(&directory, "eve").await,
            Err(CryptoError::RecipientKeyUnavailable(id)) if id == "eve"
        ));
        assert!(matches!(
            sender.resolve_recipient(&directory, "carol").await,
            Err(CryptoError::RecipientKeyUnavailable(id)) if id == "carol"
        ));
        assert!(matches!(
            sender.resolve_sender(&directory, "carol").await,
            Err(CryptoError::SignerKeyUnavailable(id)) if id == "carol"
        ));
        assert!(sender.resolve_recipient(&directory, "bob").await.is_ok());
    }

    #[test]
    fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let sender = party(&dir, "alice", Some(alice()));
        let missing = dir.path().join("missing.txt");

        assert!(matches!(
            sender.sign_file(&missing),
            Err(CryptoError::SourceNotFound(_))
        ));
        assert!(matches!(
            sender.encrypt_file_for(&missing, &bob().to_public_key()),
            Err(CryptoError::SourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_decrypt_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let sender = party(&dir, "alice", Some(alice()));
        let source = write_source(&dir, "secret.txt", b"for bob");
        sender.sign_file(&source).unwrap();
        let envelope = sender.encrypt_file_for(&source, &bob().to_public_key()).unwrap();
        let envelope = fs::read(envelope).unwrap();

        let directory = MapDirectory::pair();
        let signed = Origin::Signed { source_id: "alice" };

        let receiver = party(&dir, "bob", Some(bob()));
        assert_eq!(
            receiver.decrypt(&envelope, signed, &directory).await.unwrap(),
            b"for bob"
        );

        let eavesdropper = party(&dir, "mallory", Some(mallory()));
        assert!(matches!(
            eavesdropper.decrypt(&envelope, signed, &directory).await,
            Err(CryptoError::WrongRecipient)
        ));

        let impostor = MapDirectory::new(&[("alice", mallory())]);
        assert!(matches!(
            receiver.decrypt(&envelope, signed, &impostor).await,
            Err(CryptoError::InvalidSignature)
        ));

        assert!(matches!(
            receiver
                .decrypt(&envelope, Origin::Signed { source_id: "carol" }, &directory)
                .await,
            Err(CryptoError::SignerKeyUnavailable(id)) if id == "carol"
        ));

        let keyless = party(&dir, "keyless", None);
        assert!(matches!(
            keyless.decrypt(&envelope, signed, &directory).await,
            Err(CryptoError::MissingPrivateKey)
        ));
    }
}

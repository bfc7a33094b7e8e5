//! File commands: the local sign / encrypt / decrypt steps and their
//! round trips through the server.

use colored::*;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::client::SealClient;
use crate::api::types::files;
use crate::directory::KeyDirectory;
use crate::feature::file_crypt::{FileCrypt, Origin};
use crate::key_store::KeyStore;
use crate::term::Step;

/// Name used for a download whose advertised name has no usable component.
const FALLBACK_DOWNLOAD_NAME: &str = "download.bin";

pub fn sign<K: KeyStore>(crypt: &FileCrypt<K>, path: &Path) -> Result<PathBuf, Box<dyn Error>> {
    Ok(Step::start("Signing file")?.finish(crypt.sign_file(path))?)
}

/// Encrypts `path` for `dest_id`, signing it first when `signed` is set.
///
/// When signing, a failure stops everything before the recipient is looked
/// up. Otherwise the recipient is resolved before the file is read, so an
/// unknown recipient leaves no trace.
pub async fn encrypt<K: KeyStore, D: KeyDirectory>(
    crypt: &FileCrypt<K>,
    directory: &D,
    path: &Path,
    dest_id: &str,
    signed: bool,
) -> Result<PathBuf, Box<dyn Error>> {
    if signed {
        sign(crypt, path)?;
    }
    let recipient = Step::start(&format!("Looking up public key of '{}'", dest_id))?
        .finish(crypt.resolve_recipient(directory, dest_id).await)?;
    let out = Step::start("Encrypting file")?.finish(crypt.encrypt_file_for(path, &recipient))?;
    Ok(out)
}

async fn open<K: KeyStore, D: KeyDirectory>(
    crypt: &FileCrypt<K>,
    directory: &D,
    envelope: &[u8],
    origin: Origin<'_>,
) -> Result<Vec<u8>, Box<dyn Error>> {
    let label = match origin {
        Origin::Signed { source_id } => format!("Decrypting and verifying file from '{}'", source_id),
        Origin::Unsigned => "Decrypting file".to_string(),
    };
    Ok(Step::start(&label)?.finish(crypt.decrypt(envelope, origin, directory).await)?)
}

/// Decrypts a local envelope file into `out`.
pub async fn decrypt<K: KeyStore, D: KeyDirectory>(
    crypt: &FileCrypt<K>,
    directory: &D,
    envelope_path: &Path,
    origin: Origin<'_>,
    out: &Path,
) -> Result<(), Box<dyn Error>> {
    let envelope = fs::read(envelope_path)
        .map_err(|e| format!("cannot read '{}': {}", envelope_path.display(), e))?;
    let plaintext = open(crypt, directory, &envelope, origin).await?;
    fs::write(out, &plaintext)?;
    println!("{} bytes written to {}", plaintext.len(), out.display());
    Ok(())
}

//
// Server round trips
//

/// Signs, encrypts and uploads `path`. The local envelope is removed once the
/// server has accepted it. Returns the server's file id.
pub async fn upload<K: KeyStore, D: KeyDirectory>(
    client: &SealClient,
    crypt: &FileCrypt<K>,
    directory: &D,
    path: &Path,
    dest_id: &str,
) -> Result<String, Box<dyn Error>> {
    let envelope_path = encrypt(crypt, directory, path, dest_id, true).await?;
    let envelope = fs::read(&envelope_path)?;
    let file_name = envelope_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| format!("'{}' is not a file", envelope_path.display()))?;

    let result =
        Step::start("Uploading file")?.finish(client.files_upload(&file_name, envelope).await)?;
    fs::remove_file(&envelope_path)?;
    println!("File uploaded with ID {}", result.file_id.bold());
    Ok(result.file_id)
}

/// Downloads `file_id`, decrypts it and stores the plaintext under the
/// original file name in `downloaded_dir`.
pub async fn download<K: KeyStore, D: KeyDirectory>(
    client: &SealClient,
    crypt: &FileCrypt<K>,
    directory: &D,
    downloaded_dir: &Path,
    file_id: &str,
    origin: Origin<'_>,
) -> Result<PathBuf, Box<dyn Error>> {
    let downloaded = Step::start("Downloading file")?.finish(
        client
            .files_download(files::FilesDownloadArg {
                file_id: file_id.to_string(),
            })
            .await,
    )?;
    println!("{} bytes downloaded", downloaded.contents.len());

    let plaintext = open(crypt, directory, &downloaded.contents, origin).await?;

    fs::create_dir_all(downloaded_dir)?;
    let out = downloaded_dir.join(local_file_name(&downloaded.file_name));
    fs::write(&out, &plaintext)?;
    println!("File saved to {}", out.display());
    Ok(out)
}

pub async fn list_files(client: &SealClient) -> Result<(), Box<dyn Error>> {
    let result = Step::start("Listing files")?.finish(client.files_list().await)?;
    println!("{} files found:", result.num_files);
    for (i, file) in result.files_list.iter().enumerate() {
        println!("[{}] File: {}, ID: {}", i + 1, file.file_name, file.file_id);
    }
    Ok(())
}

pub async fn delete_file(client: &SealClient, file_id: &str) -> Result<(), Box<dyn Error>> {
    let result = Step::start(&format!("Deleting file {}", file_id))?.finish(
        client
            .files_delete(files::FilesDeleteArg {
                file_id: file_id.to_string(),
            })
            .await,
    )?;
    println!("File {} deleted", result.file_id);
    Ok(())
}

/// Keeps only the last component of a server-provided name.
fn local_file_name(advertised: &str) -> String {
    Path::new(advertised)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_DOWNLOAD_NAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::tests::serve_once;
    use crate::config::Workspace;
    use crate::crypt::tests::{alice, bob};
    use crate::crypt::{self, CryptoError};
    use crate::directory::PinnedKey;
    use crate::key_store::MemoryKeyStore;
    use crate::feature::file_crypt::tests::{MapDirectory, party as bare_party, write_source};
    use crate::signature_store::SignatureStore;
    use rsa::RsaPrivateKey;

    fn party(root: &Path, key: &RsaPrivateKey) -> (Workspace, FileCrypt<MemoryKeyStore>) {
        let workspace = Workspace::new(root);
        let crypt = FileCrypt::new(
            MemoryKeyStore::with_key(key).unwrap(),
            SignatureStore::new(workspace.signed_dir()),
            workspace.encrypted_dir(),
        );
        (workspace, crypt)
    }

    fn pinned(key: &RsaPrivateKey) -> PinnedKey {
        PinnedKey::new(crypt::public_key_to_pem(&key.to_public_key()).unwrap())
    }

    #[test]
    fn test_local_file_name() {
        assert_eq!(local_file_name("notes.txt"), "notes.txt");
        assert_eq!(local_file_name("../../etc/passwd"), "passwd");
        assert_eq!(local_file_name(".."), FALLBACK_DOWNLOAD_NAME);
        assert_eq!(local_file_name(""), FALLBACK_DOWNLOAD_NAME);
    }

    #[tokio::test]
    async fn test_ten_byte_file_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let sender = bare_party(&dir, "alice", Some(alice()));
        let receiver = bare_party(&dir, "bob", Some(bob()));
        let source = write_source(&dir, "ten.bin", b"0123456789");
        let directory = MapDirectory::pair();

        let envelope_path = encrypt(&sender, &directory, &source, "bob", true)
            .await
            .unwrap();
        assert!(envelope_path.ends_with("alice/encrypted_files/ten.bin"));
        assert!(!sender.has_pending_signature("ten.bin"));

        let envelope = fs::read(&envelope_path).unwrap();
        assert_eq!(envelope.len(), 16 + 256 + 272);

        let plaintext = receiver
            .decrypt(&envelope, Origin::Signed { source_id: "alice" }, &directory)
            .await
            .unwrap();
        assert_eq!(plaintext, b"0123456789");
    }

    #[tokio::test]
    async fn test_unknown_recipient_fails_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let sender = bare_party(&dir, "alice", Some(alice()));
        let missing = dir.path().join("missing.txt");

        let err = encrypt(&sender, &MapDirectory::pair(), &missing, "carol", false)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CryptoError>(),
            Some(CryptoError::RecipientKeyUnavailable(id)) if id == "carol"
        ));
    }

    #[tokio::test]
    async fn test_invalid_published_key_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sender = bare_party(&dir, "alice", Some(alice()));
        let source = write_source(&dir, "a.txt", b"a");
        let mut directory = MapDirectory::pair();
        directory.0.insert("eve".to_string(), "not a key".to_string());

        let err = encrypt(&sender, &directory, &source, "eve", false)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CryptoError>(),
            Some(CryptoError::RecipientKeyUnavailable(_))
        ));
        assert!(!sender.encrypted_dir().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_enc_sign_aborts_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let sender = bare_party(&dir, "nokey", None);
        let source = write_source(&dir, "a.txt", b"a");

        let err = encrypt(&sender, &MapDirectory::pair(), &source, "bob", true)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CryptoError>(),
            Some(CryptoError::MissingPrivateKey)
        ));
        assert!(!sender.encrypted_dir().exists());
        assert!(!sender.has_pending_signature("a.txt"));
    }

    #[tokio::test]
    async fn test_upload_removes_local_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let (workspace, crypt) = party(&dir.path().join("alice"), alice());
        let source = dir.path().join("notes.txt");
        fs::write(&source, b"meet at noon").unwrap();

        let body = br#"{"file_id": "f-1", "file_size": 304}"#.to_vec();
        let (base_url, request) = serve_once("200 OK", &[], body).await;

        let file_id = upload(&SealClient::new(&base_url), &crypt, &pinned(bob()), &source, "bob")
            .await
            .unwrap();
        assert_eq!(file_id, "f-1");
        assert!(!workspace.encrypted_dir().join("notes.txt").exists());

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /api/files/upload "));
        assert!(request.contains(r#"name="ufile"; filename="notes.txt""#));
    }

    #[tokio::test]
    async fn test_download_decrypts_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let (_, sender) = party(&dir.path().join("alice"), alice());
        let (workspace, receiver) = party(&dir.path().join("bob"), bob());
        let source = dir.path().join("notes.txt");
        fs::write(&source, b"meet at noon").unwrap();

        let envelope_path = encrypt(&sender, &pinned(bob()), &source, "bob", true)
            .await
            .unwrap();
        let envelope = fs::read(envelope_path).unwrap();

        let (base_url, _request) = serve_once(
            "200 OK",
            &[("Content-Disposition", r#"attachment; filename="notes.txt""#)],
            envelope,
        )
        .await;

        let out = download(
            &SealClient::new(&base_url),
            &receiver,
            &pinned(alice()),
            &workspace.downloaded_dir(),
            "f-1",
            Origin::Signed { source_id: "alice" },
        )
        .await
        .unwrap();
        assert_eq!(out, workspace.downloaded_dir().join("notes.txt"));
        assert_eq!(fs::read(out).unwrap(), b"meet at noon");
    }

    #[tokio::test]
    async fn test_download_with_bad_signature_saves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (_, sender) = party(&dir.path().join("alice"), alice());
        let (workspace, receiver) = party(&dir.path().join("bob"), bob());
        let source = dir.path().join("notes.txt");
        fs::write(&source, b"meet at noon").unwrap();

        // Encrypted without a signature, but downloaded as signed.
        let envelope_path = encrypt(&sender, &pinned(bob()), &source, "bob", false)
            .await
            .unwrap();
        let envelope = fs::read(envelope_path).unwrap();
        let (base_url, _request) = serve_once(
            "200 OK",
            &[("Content-Disposition", r#"attachment; filename="notes.txt""#)],
            envelope,
        )
        .await;

        let result = download(
            &SealClient::new(&base_url),
            &receiver,
            &pinned(alice()),
            &workspace.downloaded_dir(),
            "f-1",
            Origin::Signed { source_id: "alice" },
        )
        .await;
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CryptoError>(),
            Some(CryptoError::InvalidSignature)
        ));
        assert!(!workspace.downloaded_dir().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_decrypt_local_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let (_, sender) = party(&dir.path().join("alice"), alice());
        let (_, receiver) = party(&dir.path().join("bob"), bob());
        let source = dir.path().join("notes.txt");
        fs::write(&source, b"meet at noon").unwrap();

        let envelope_path = encrypt(&sender, &pinned(bob()), &source, "bob", false)
            .await
            .unwrap();
        let out = dir.path().join("plain.txt");
        decrypt(&receiver, &pinned(alice()), &envelope_path, Origin::Unsigned, &out)
            .await
            .unwrap();
        assert_eq!(fs::read(out).unwrap(), b"meet at noon");
    }

    #[tokio::test]
    async fn test_list_files() {
        let body = br#"{"num_files": 1, "files_list": [{"fileName": "a.txt", "fileID": "x1"}]}"#.to_vec();
        let (base_url, request) = serve_once("200 OK", &[], body).await;
        list_files(&SealClient::new(&base_url)).await.unwrap();
        assert!(request.await.unwrap().starts_with("POST /api/files/list "));
    }
}

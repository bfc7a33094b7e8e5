//! Detached signatures waiting to be merged into an envelope.
//!
//! `sign` leaves the signature here under the signed file's name and the next
//! `encrypt` of a file with that name picks it up. A signature is used for one
//! envelope only.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SignatureStore {
    dir: PathBuf,
}

impl SignatureStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        SignatureStore { dir: dir.into() }
    }

    /// Signatures are keyed by file name only, so `a/notes.txt` and
    /// `b/notes.txt` share a slot.
    fn slot(&self, file_name: &str) -> PathBuf {
        let name = Path::new(file_name)
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| file_name.into());
        self.dir.join(name)
    }

    pub fn save(&self, file_name: &str, signature: &[u8]) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.slot(file_name);
        fs::write(&path, signature)?;
        Ok(path)
    }

    /// Returns the pending signature for `file_name` without consuming it.
    pub fn pending(&self, file_name: &str) -> std::io::Result<Option<Vec<u8>>> {
        match fs::read(self.slot(file_name)) {
            Ok(signature) => Ok(Some(signature)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Drops the pending signature once an envelope has consumed it.
    pub fn discard(&self, file_name: &str) -> std::io::Result<()> {
        match fs::remove_file(self.slot(file_name)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

//! Resolving a user identifier to the public key published for it.

use std::fs;
use std::path::Path;

use crate::api::client::{RequestError, SealClient};
use crate::api::types::users;

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("user has no public key")]
    NoPublicKey,

    #[error("{0}")]
    Request(#[from] RequestError),
}

#[allow(async_fn_in_trait)]
pub trait KeyDirectory {
    /// Returns the PEM public key registered for `user_id`.
    async fn lookup_public_key(&self, user_id: &str) -> Result<String, LookupError>;
}

impl KeyDirectory for SealClient {
    async fn lookup_public_key(&self, user_id: &str) -> Result<String, LookupError> {
        let result = self
            .users_get_public_key(users::UsersGetPublicKeyArg {
                user_id: user_id.to_string(),
            })
            .await?;
        result.public_key.ok_or(LookupError::NoPublicKey)
    }
}

/// A public key read from disk, answered for whichever identifier is asked.
///
/// Lets two users exchange envelopes without a directory server, once they
/// have swapped public keys some other way.
#[derive(Debug, Clone)]
pub struct PinnedKey {
    pem: String,
}

impl PinnedKey {
    pub fn new(pem: impl Into<String>) -> Self {
        PinnedKey { pem: pem.into() }
    }

    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        Ok(Self::new(fs::read_to_string(path)?))
    }
}

impl KeyDirectory for PinnedKey {
    async fn lookup_public_key(&self, _user_id: &str) -> Result<String, LookupError> {
        Ok(self.pem.clone())
    }
}

/// The directory a command resolves keys with.
pub enum Directory {
    Remote(SealClient),
    Pinned(PinnedKey),
}

impl KeyDirectory for Directory {
    async fn lookup_public_key(&self, user_id: &str) -> Result<String, LookupError> {
        match self {
            Directory::Remote(client) => client.lookup_public_key(user_id).await,
            Directory::Pinned(key) => key.lookup_public_key(user_id).await,
        }
    }
}

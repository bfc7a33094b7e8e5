//! This module provides the cryptographic core: RSA key generation, detached
//! signing/verification, and the hybrid envelope encryption used to exchange
//! files.
//!
//! It uses RSA-2048 for identities, PKCS#1 v1.5 over SHA-256 for signatures,
//! RSA-OAEP for wrapping session keys, and AES-256-CBC with PKCS#7 padding for
//! the payload.
//!
//! Everything here is synchronous and works on in-memory bytes. Reading files,
//! looking up keys and persisting results is left to the callers in
//! `feature::file_crypt`.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::envelope::{Envelope, IV_LEN};

/// Every identity uses the same modulus size. The envelope and signature
/// widths other peers expect are derived from it.
pub const KEY_BITS: usize = 2048;

/// AES-256 session key size.
pub const SESSION_KEY_LEN: usize = 32;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

// --

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("no private key available; generate one first")]
    MissingPrivateKey,

    #[error("file not found: {0}")]
    SourceNotFound(String),

    #[error("no public key available for recipient '{0}'")]
    RecipientKeyUnavailable(String),

    #[error("no public key available for sender '{0}'")]
    SignerKeyUnavailable(String),

    #[error("wrong private key, this message is not for you")]
    WrongRecipient,

    #[error("corrupted message or wrong symmetric key")]
    CorruptedOrWrongKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("cryptographic operation failed")]
    OperationFailed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

//
// Key Types
//

/// 256-bit AES key used for a single envelope.
pub struct SessionKey(Zeroizing<[u8; SESSION_KEY_LEN]>);

impl SessionKey {
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; SESSION_KEY_LEN]);
        OsRng.fill_bytes(&mut key[..]);
        SessionKey(key)
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.0
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != SESSION_KEY_LEN {
            return None;
        }
        let mut key = Zeroizing::new([0u8; SESSION_KEY_LEN]);
        key.copy_from_slice(bytes);
        Some(SessionKey(key))
    }
}

/// Generates a fresh RSA key pair at [`KEY_BITS`].
pub fn generate_private_key() -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::new(&mut OsRng, KEY_BITS).map_err(|_| CryptoError::OperationFailed)
}

//
// Key Serialization
//

/// Encodes a private key for storage (PKCS#1 PEM, "RSA PRIVATE KEY").
pub fn private_key_to_pem(key: &RsaPrivateKey) -> Result<Zeroizing<String>, CryptoError> {
    key.to_pkcs1_pem(LineEnding::LF)
        .map_err(|_| CryptoError::OperationFailed)
}

/// Parses a stored private key. Both PKCS#1 and PKCS#8 PEM are accepted.
pub fn private_key_from_pem(pem: &str) -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
        .map_err(|_| CryptoError::MissingPrivateKey)
}

/// Encodes a public key the way it is published in the directory
/// (SubjectPublicKeyInfo PEM, "PUBLIC KEY").
pub fn public_key_to_pem(key: &RsaPublicKey) -> Result<String, CryptoError> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|_| CryptoError::OperationFailed)
}

/// Parses a public key in SubjectPublicKeyInfo or PKCS#1 PEM.
///
/// Returns `None` when the text is not a usable RSA public key; callers turn
/// that into the error that fits their side of the exchange.
pub fn public_key_from_pem(pem: &str) -> Option<RsaPublicKey> {
    let pem = pem.trim();
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .ok()
}

/// Short, human-comparable identifier of a public key (e.g. "8f3a2b7c01d4e5f6").
///
/// Hex of the first 8 bytes of SHA-256 over the DER encoding.
pub fn key_fingerprint(key: &RsaPublicKey) -> Result<String, CryptoError> {
    let der = key
        .to_public_key_der()
        .map_err(|_| CryptoError::OperationFailed)?;
    let digest = Sha256::digest(der.as_bytes());
    Ok(hex::encode(&digest[..8]))
}

//
// Signing & Verification
//

/// Creates a detached signature over `content`.
///
/// The content is hashed with SHA-256 and the digest signed with PKCS#1 v1.5
/// padding. The result is exactly as wide as the key's modulus (256 bytes for
/// a 2048-bit key), which is what lets the receiver split it back off the
/// decrypted payload.
pub fn sign(content: &[u8], private_key: &RsaPrivateKey) -> Result<Vec<u8>, CryptoError> {
    let digest = Sha256::digest(content);
    private_key
        .sign_with_rng(&mut OsRng, Pkcs1v15Sign::new::<Sha256>(), &digest)
        .map_err(|_| CryptoError::OperationFailed)
}

/// Verifies a detached signature produced by [`sign`].
///
/// # Returns
///
/// * `Ok(())` - The signature was made over `content` by the holder of the
///   private half of `public_key`
/// * `Err(CryptoError::InvalidSignature)` - Wrong signer, modified content or
///   modified signature
pub fn verify(
    content: &[u8],
    signature: &[u8],
    public_key: &RsaPublicKey,
) -> Result<(), CryptoError> {
    let digest = Sha256::digest(content);
    public_key
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
        .map_err(|_| CryptoError::InvalidSignature)
}

//
// Session Key Wrapping
//

// OAEP is parameterised with SHA-1 and MGF1-SHA-1, the default of the other
// clients that exchange envelopes with this one.
fn oaep() -> Oaep {
    Oaep::new::<sha1::Sha1>()
}

pub fn wrap_session_key(
    key: &SessionKey,
    recipient: &RsaPublicKey,
) -> Result<Vec<u8>, CryptoError> {
    recipient
        .encrypt(&mut OsRng, oaep(), key.as_bytes())
        .map_err(|_| CryptoError::OperationFailed)
}

/// Recovers a session key wrapped by [`wrap_session_key`].
///
/// The private-key operation is blinded with a fresh random factor.
///
/// All failures, including a key of the wrong length, collapse into
/// [`CryptoError::WrongRecipient`].
pub fn unwrap_session_key(
    wrapped: &[u8],
    private_key: &RsaPrivateKey,
) -> Result<SessionKey, CryptoError> {
    let bytes = Zeroizing::new(
        private_key
            .decrypt_blinded(&mut OsRng, oaep(), wrapped)
            .map_err(|_| CryptoError::WrongRecipient)?,
    );
    SessionKey::from_bytes(&bytes).ok_or(CryptoError::WrongRecipient)
}

//
// Content Encryption/Decryption
//

pub fn encrypt_content(plaintext: &[u8], key: &SessionKey, iv: &[u8; IV_LEN]) -> Vec<u8> {
    // Key and IV lengths are fixed by their types.
    Aes256CbcEnc::new(
        GenericArray::from_slice(key.as_bytes()),
        GenericArray::from_slice(iv),
    )
    .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypts and unpads a CBC ciphertext.
///
/// A bad padding block is the only signal CBC gives for a wrong key or a
/// modified ciphertext, and it is reported as
/// [`CryptoError::CorruptedOrWrongKey`].
pub fn decrypt_content(
    ciphertext: &[u8],
    key: &SessionKey,
    iv: &[u8; IV_LEN],
) -> Result<Vec<u8>, CryptoError> {
    Aes256CbcDec::new(
        GenericArray::from_slice(key.as_bytes()),
        GenericArray::from_slice(iv),
    )
    .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
    .map_err(|_| CryptoError::CorruptedOrWrongKey)
}

//
// Hybrid Envelopes
//

/// Builds an envelope for `recipient`.
///
/// # Algorithm
///
/// 1. **Merge**: `signature ++ content` when a signature is pending, otherwise
///    `content` alone. Nothing in the envelope records which case applies.
/// 2. **Fresh secrets**: random 16-byte IV and 256-bit AES key from `OsRng`
/// 3. **Encrypt**: AES-256-CBC with PKCS#7 padding over the merged message
/// 4. **Wrap**: the AES key with RSA-OAEP under `recipient`
/// 5. **Package**: `iv ++ wrapped_key ++ ciphertext`
///
/// The wrapped key is as wide as the recipient's modulus, independent of the
/// content length.
pub fn encrypt_envelope(
    content: &[u8],
    signature: Option<&[u8]>,
    recipient: &RsaPublicKey,
) -> Result<Envelope, CryptoError> {
    let message = match signature {
        Some(signature) => {
            let mut merged = Vec::with_capacity(signature.len() + content.len());
            merged.extend_from_slice(signature);
            merged.extend_from_slice(content);
            Zeroizing::new(merged)
        }
        None => Zeroizing::new(content.to_vec()),
    };

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let session_key = SessionKey::generate();

    let ciphertext = encrypt_content(&message, &session_key, &iv);
    let wrapped_key = wrap_session_key(&session_key, recipient)?;

    Ok(Envelope {
        iv,
        wrapped_key,
        ciphertext,
    })
}

/// Opens an envelope and returns its payload without looking for a signature.
///
/// Use this only when the caller knows the sender did not sign. The payload
/// of a signed envelope comes back with the signature still in front.
pub fn decrypt_envelope_unsigned(
    envelope: &[u8],
    private_key: &RsaPrivateKey,
) -> Result<Vec<u8>, CryptoError> {
    let envelope = Envelope::from_bytes(envelope, private_key.size())?;
    let session_key = unwrap_session_key(&envelope.wrapped_key, private_key)?;
    decrypt_content(&envelope.ciphertext, &session_key, &envelope.iv)
}

/// Opens a signed envelope and verifies it came from `sender`.
///
/// # Algorithm
///
/// 1. **Parse**: IV, then a wrapped key as wide as `private_key`'s modulus,
///    then the ciphertext
/// 2. **Unwrap**: the session key with OAEP (`WrongRecipient` on failure)
/// 3. **Decrypt**: AES-256-CBC and unpad (`CorruptedOrWrongKey` on failure)
/// 4. **Split**: the first `sender.size()` bytes are the signature, the rest
///    is the message
/// 5. **Verify**: SHA-256/PKCS#1 v1.5 against `sender` (`InvalidSignature`)
///
/// Nothing is returned unless every step succeeds.
pub fn decrypt_envelope(
    envelope: &[u8],
    sender: &RsaPublicKey,
    private_key: &RsaPrivateKey,
) -> Result<Vec<u8>, CryptoError> {
    let mut payload = decrypt_envelope_unsigned(envelope, private_key)?;

    let signature_len = sender.size();
    if payload.len() < signature_len {
        return Err(CryptoError::InvalidSignature);
    }
    let message = payload.split_off(signature_len);
    verify(&message, &payload, sender)?;
    Ok(message)
}

//! Binary layout of the envelope exchanged with other users.
//!
//! ```text
//! [iv (16 bytes)][wrapped session key (W bytes)][AES-256-CBC ciphertext]
//! ```
//!
//! Fields are positional and carry no length prefix. `W` is the byte width of
//! the RSA modulus the session key was wrapped with (256 for 2048-bit keys),
//! so the reader must know it out of band. The decrypting side takes it from
//! its own private key.

use crate::crypt::CryptoError;

/// Size of the CBC initialization vector.
pub const IV_LEN: usize = 16;

/// AES block size. The ciphertext is always a non-empty multiple of it.
pub const BLOCK_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub iv: [u8; IV_LEN],

    /// Session key encrypted under the recipient's RSA public key (OAEP).
    pub wrapped_key: Vec<u8>,

    /// `signature ++ plaintext` (or just `plaintext`) encrypted with the
    /// session key and padded to the block size.
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.wrapped_key);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Splits raw envelope bytes at the fixed offsets.
    ///
    /// Anything that cannot be a valid envelope for a `wrapped_key_len`-byte
    /// key is reported as [`CryptoError::CorruptedOrWrongKey`]; the reader
    /// learns nothing more specific than that.
    pub fn from_bytes(bytes: &[u8], wrapped_key_len: usize) -> Result<Self, CryptoError> {
        let header_len = IV_LEN + wrapped_key_len;
        if bytes.len() < header_len + BLOCK_LEN {
            return Err(CryptoError::CorruptedOrWrongKey);
        }
        let ciphertext = &bytes[header_len..];
        if ciphertext.len() % BLOCK_LEN != 0 {
            return Err(CryptoError::CorruptedOrWrongKey);
        }

        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&bytes[..IV_LEN]);
        Ok(Envelope {
            iv,
            wrapped_key: bytes[IV_LEN..header_len].to_vec(),
            ciphertext: ciphertext.to_vec(),
        })
    }

    /// Size of [`Envelope::to_bytes`]; never zero.
    pub fn encoded_len(&self) -> usize {
        IV_LEN + self.wrapped_key.len() + self.ciphertext.len()
    }
}

//! AES-256-GCM encryption and decryption for secret payloads.
//!
//! Wire layout of every encrypted blob: `nonce (12) || ciphertext || tag (16)`.
//! A fresh random nonce is drawn for each call to [`encrypt`].

use crate::crypto::{CryptoError, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
/// Smallest blob [`decrypt`] will look at: a nonce and a tag over empty plaintext.
pub const MIN_BLOB_LEN: usize = NONCE_LEN + TAG_LEN;

/// The symmetric key every secret is sealed under.
///
/// Derived from the master password and the account salt, never transmitted.
/// Wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey {
    key: [u8; KEY_LEN],
}

impl VaultKey {
    /// Generate a random key (tests and tooling; real keys come from the KDF)
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        Self { key: key.into() }
    }

    pub fn from_bytes(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_LEN,
            got: bytes.len(),
        })?;
        Ok(Self { key })
    }

    /// Raw key bytes (use sparingly)
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

impl PartialEq for VaultKey {
    fn eq(&self, other: &Self) -> bool {
        self.key.ct_eq(&other.key).into()
    }
}

impl Eq for VaultKey {}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultKey(<redacted>)")
    }
}

/// Seal `plaintext` under `key`.
///
/// Empty plaintext is allowed and yields a blob of exactly [`MIN_BLOB_LEN`] bytes.
pub fn encrypt(key: &VaultKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    // AES-GCM appends the 16-byte tag to the ciphertext
    let sealed = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
    blob.extend_from_slice(nonce.as_slice());
    blob.extend_from_slice(&sealed);
    Ok(blob)
}

/// Open a blob produced by [`encrypt`].
///
/// Truncated input and failed tag verification return the same
/// [`CryptoError::Integrity`] so callers cannot tell them apart.
pub fn decrypt(key: &VaultKey, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if blob.len() < MIN_BLOB_LEN {
        return Err(CryptoError::Integrity);
    }

    let (nonce, sealed) = blob.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::Integrity)
}

//! Cryptographic primitives for the vault.
//!
//! This module provides:
//! - PBKDF2-HMAC-SHA256 key derivation
//! - AES-256-GCM encryption/decryption of secret payloads
//! - Account salt generation

pub mod cipher;
pub mod kdf;

pub use cipher::{decrypt, encrypt, VaultKey, KEY_LEN, MIN_BLOB_LEN, NONCE_LEN, TAG_LEN};
pub use kdf::{derive_key, derive_key_with, generate_salt, KdfParams, Salt, PBKDF2_ROUNDS, SALT_LEN};

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KdfFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Short blob, wrong key and tampered ciphertext all map here.
    #[error("Integrity check failed - data may be corrupted, tampered with, or the key is wrong")]
    Integrity,

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Invalid salt: {0}")]
    InvalidSalt(String),

    #[error("Random number generation failed: {0}")]
    RandomFailed(String),
}

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;

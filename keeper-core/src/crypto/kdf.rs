//! PBKDF2-HMAC-SHA256 key derivation for the master password.
//!
//! Uses:
//! - 100,000 iterations (minimum accepted)
//! - 16-byte account salt, issued by the server at registration
//! - 32-byte output, used directly as the AES-256-GCM key

use crate::crypto::{CryptoError, Result, VaultKey, KEY_LEN};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroize;

pub const PBKDF2_ROUNDS: u32 = 100_000;
pub const SALT_LEN: usize = 16;

/// Parameters for PBKDF2 key derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Number of HMAC-SHA256 iterations
    pub rounds: u32,

    /// Output length in bytes
    pub output_length: usize,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            rounds: PBKDF2_ROUNDS,
            output_length: KEY_LEN,
        }
    }
}

impl KdfParams {
    /// Verify that parameters are within acceptable ranges
    pub fn validate(&self) -> Result<()> {
        if self.rounds < PBKDF2_ROUNDS {
            return Err(CryptoError::KdfFailed(format!(
                "Iteration count too low (minimum: {})",
                PBKDF2_ROUNDS
            )));
        }
        if self.output_length != KEY_LEN {
            return Err(CryptoError::KdfFailed(format!(
                "Output length must be {} bytes",
                KEY_LEN
            )));
        }
        Ok(())
    }
}

/// A per-account salt. Hex-encoded whenever it leaves the process.
#[derive(Clone, PartialEq, Eq)]
pub struct Salt([u8; SALT_LEN]);

impl Salt {
    pub fn from_bytes(bytes: [u8; SALT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidSalt(format!("not hex: {}", e)))?;
        let array: [u8; SALT_LEN] = bytes.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidSalt(format!("expected {} bytes, got {}", SALT_LEN, bytes.len()))
        })?;
        Ok(Self(array))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_LEN] {
        &self.0
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Salt({})", self.to_hex())
    }
}

/// Draw a fresh salt from the OS RNG.
pub fn generate_salt() -> Result<Salt> {
    let mut bytes = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::RandomFailed(e.to_string()))?;
    Ok(Salt(bytes))
}

/// Derive the vault key from the master password with default parameters.
pub fn derive_key(password: &[u8], salt: &Salt) -> Result<VaultKey> {
    derive_key_with(password, salt, &KdfParams::default())
}

/// Derive the vault key with explicit parameters.
///
/// Deterministic: the same password, salt and parameters always produce the same key.
pub fn derive_key_with(password: &[u8], salt: &Salt, params: &KdfParams) -> Result<VaultKey> {
    params.validate()?;

    let mut output = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt.as_bytes(), params.rounds, &mut output);

    let key = VaultKey::from_bytes(output);
    output.zeroize();
    Ok(key)
}

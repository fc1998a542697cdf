//! Keeper Core Library
//!
//! Local encrypted secret storage and the client half of the sync protocol:
//! key derivation and AEAD encryption, the on-disk key envelope, the SQLite
//! secret repository, the vault service that ties them together, and the
//! last-write-wins sync engine.

pub mod clock;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod models;
pub mod payload;
pub mod platform;
pub mod store;
pub mod sync;
pub mod vault;

pub use config::ClientConfig;
pub use crypto::{decrypt, derive_key, encrypt, generate_salt, CryptoError, KdfParams, Salt, VaultKey};
pub use envelope::KeyEnvelopeStore;
pub use models::{AuthTokenPair, LastSync, SecretKind, SecretRecord};
pub use payload::{BinarySecret, CardSecret, LoginSecret, SecretPayload};
pub use store::{Database, MergeReport, SecretRepository, TokenStore};
pub use vault::{Secret, VaultService};

use thiserror::Error;

/// Result type for keeper operations
pub type Result<T> = std::result::Result<T, KeeperError>;

/// Storage-layer failures
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database lock poisoned during {0}")]
    LockPoisoned(String),
}

/// General error type for keeper operations
#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// No usable key envelope or token pair; the user has to log in again.
    #[error("Not authenticated: log in to continue")]
    NotAuthenticated,

    #[error("Corrupted data: {0}")]
    Corruption(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Duplicate(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for KeeperError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::Sqlite(e))
    }
}

//! On-disk home of the derived vault key.
//!
//! The envelope is a small JSON document holding the key and a SHA-256
//! digest of it. It is only readable by the owning user and always replaced
//! atomically, so a crash mid-write leaves the previous envelope intact.

use crate::crypto::{derive_key, Salt, VaultKey};
use crate::models::base64_bytes;
use crate::{KeeperError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use subtle::ConstantTimeEq;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const ENVELOPE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct EnvelopeFile {
    version: u32,
    #[serde(with = "base64_bytes")]
    derived_key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    integrity_digest: Vec<u8>,
}

/// Persists the vault key between invocations.
#[derive(Debug, Clone)]
pub struct KeyEnvelopeStore {
    path: PathBuf,
}

impl KeyEnvelopeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write `key` and its digest, replacing any previous envelope.
    pub fn save(&self, key: &VaultKey) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let envelope = EnvelopeFile {
            version: ENVELOPE_VERSION,
            derived_key: key.as_bytes().to_vec(),
            integrity_digest: Sha256::digest(key.as_bytes()).to_vec(),
        };
        let encoded = Zeroizing::new(serde_json::to_vec(&envelope)?);

        let mut tmp = NamedTempFile::new_in(dir)?;
        restrict_permissions(tmp.as_file())?;
        tmp.write_all(&encoded)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| KeeperError::Io(e.error))?;
        sync_dir(dir);

        info!(path = %self.path.display(), "Saved key envelope");
        Ok(())
    }

    /// Read the envelope back and verify its digest.
    ///
    /// A missing file means the user has to log in again; anything unreadable
    /// or inconsistent is reported as corruption.
    pub fn load(&self) -> Result<VaultKey> {
        let raw = match fs::read(&self.path) {
            Ok(bytes) => Zeroizing::new(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No key envelope");
                return Err(KeeperError::NotAuthenticated);
            }
            Err(e) => return Err(e.into()),
        };

        let envelope: EnvelopeFile = serde_json::from_slice(&raw)
            .map_err(|e| KeeperError::Corruption(format!("key envelope is unreadable: {}", e)))?;

        if envelope.version != ENVELOPE_VERSION {
            return Err(KeeperError::Corruption(format!(
                "unsupported key envelope version {}",
                envelope.version
            )));
        }

        let key = VaultKey::from_slice(&envelope.derived_key)
            .map_err(|e| KeeperError::Corruption(format!("key envelope: {}", e)))?;

        let digest = Sha256::digest(key.as_bytes());
        if !bool::from(digest.as_slice().ct_eq(&envelope.integrity_digest)) {
            return Err(KeeperError::Corruption(
                "key envelope failed its integrity check".to_string(),
            ));
        }

        Ok(key)
    }

    /// Remove the envelope. Removing a missing envelope succeeds.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Removed key envelope");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Derive the key from the master password and account salt, then persist it.
    pub fn derive_and_save(&self, password: &[u8], salt: &Salt) -> Result<VaultKey> {
        let key = derive_key(password, salt)?;
        self.save(&key)?;
        Ok(key)
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &File) -> io::Result<()> {
    Ok(())
}

// Makes the rename durable. Not every platform can open a directory.
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}

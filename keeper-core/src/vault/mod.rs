//! Vault service: the only layer that handles plaintext.
//!
//! Every write seals the payload under the key from the envelope store and
//! every read opens it again. The key is loaded per operation and dropped
//! (zeroized) as soon as the operation returns. Any record that fails to
//! open aborts the whole call.

use crate::clock;
use crate::crypto::{self, VaultKey};
use crate::envelope::KeyEnvelopeStore;
use crate::models::SecretRecord;
use crate::payload::SecretPayload;
use crate::store::SecretRepository;
use crate::{KeeperError, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// A decrypted secret as presented to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    pub uid: String,
    pub description: String,
    pub payload: SecretPayload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct VaultService {
    repo: SecretRepository,
    envelope: KeyEnvelopeStore,
}

impl VaultService {
    pub fn new(repo: SecretRepository, envelope: KeyEnvelopeStore) -> Self {
        Self { repo, envelope }
    }

    pub fn repository(&self) -> &SecretRepository {
        &self.repo
    }

    pub fn envelope(&self) -> &KeyEnvelopeStore {
        &self.envelope
    }

    fn key(&self) -> Result<VaultKey> {
        self.envelope.load()
    }

    /// Fails with `NotAuthenticated` or `Corruption` unless a usable key is stored.
    fn ensure_unlocked(&self) -> Result<()> {
        self.key().map(drop)
    }

    /// Add a secret under a fresh random uid.
    pub fn add(&self, description: &str, payload: &SecretPayload) -> Result<Secret> {
        self.add_with_uid(&Uuid::new_v4().to_string(), description, payload)
    }

    pub fn add_with_uid(&self, uid: &str, description: &str, payload: &SecretPayload) -> Result<Secret> {
        let key = self.key()?;
        let plaintext = payload.to_bytes()?;
        let now = clock::now();

        let record = SecretRecord {
            uid: uid.to_string(),
            kind: payload.kind(),
            ciphertext: crypto::encrypt(&key, &plaintext)?,
            description: description.to_string(),
            created_at: now,
            updated_at: now,
            is_deleted: false,
        };
        self.repo.insert(&record)?;
        info!(uid, kind = %record.kind, "Added secret");

        Ok(Secret {
            uid: record.uid,
            description: record.description,
            payload: payload.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get(&self, uid: &str) -> Result<Secret> {
        let key = self.key()?;
        let record = self.repo.get(uid)?;
        open(&key, record)
    }

    /// All live secrets, oldest first.
    pub fn list(&self) -> Result<Vec<Secret>> {
        let key = self.key()?;
        self.repo
            .list_active()?
            .into_iter()
            .map(|record| open(&key, record))
            .collect()
    }

    /// Replace the payload, and the description when one is given.
    ///
    /// The payload kind must match the stored kind.
    pub fn update(
        &self,
        uid: &str,
        description: Option<&str>,
        payload: &SecretPayload,
    ) -> Result<Secret> {
        let key = self.key()?;
        let mut record = self.repo.get(uid)?;
        if record.kind != payload.kind() {
            return Err(KeeperError::InvalidInput(format!(
                "secret {} is a {} secret, not {}",
                uid,
                record.kind,
                payload.kind()
            )));
        }

        let plaintext = payload.to_bytes()?;
        record.ciphertext = crypto::encrypt(&key, &plaintext)?;
        if let Some(description) = description {
            record.description = description.to_string();
        }
        record.updated_at = self.repo.update(&record)?;
        info!(uid, "Updated secret");

        Ok(Secret {
            uid: record.uid,
            description: record.description,
            payload: payload.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    pub fn delete(&self, uid: &str) -> Result<()> {
        self.ensure_unlocked()?;
        self.repo.soft_delete(uid)?;
        info!(uid, "Deleted secret");
        Ok(())
    }

    /// Write a binary secret's content into `dir` under its stored file name.
    pub fn export_file(&self, uid: &str, dir: &Path) -> Result<PathBuf> {
        let secret = self.get(uid)?;
        let SecretPayload::Binary(file) = &secret.payload else {
            return Err(KeeperError::InvalidInput(format!(
                "secret {} is a {} secret, not a file",
                uid,
                secret.payload.kind()
            )));
        };

        let name = Path::new(&file.name);
        let is_plain_name = name.file_name().map(|n| n == name.as_os_str()).unwrap_or(false);
        if !is_plain_name {
            return Err(KeeperError::InvalidInput(format!(
                "refusing to export to unsafe file name '{}'",
                file.name
            )));
        }

        fs::create_dir_all(dir)?;
        let target = dir.join(name);
        fs::write(&target, &file.content)?;
        info!(uid, path = %target.display(), "Exported file secret");
        Ok(target)
    }
}

fn open(key: &VaultKey, record: SecretRecord) -> Result<Secret> {
    let plaintext = crypto::decrypt(key, &record.ciphertext)?;
    let payload = SecretPayload::from_bytes(record.kind, &plaintext)?;
    Ok(Secret {
        uid: record.uid,
        description: record.description,
        payload,
        created_at: record.created_at,
        updated_at: record.updated_at,
    })
}

//! Per-user record storage and the server half of a sync exchange.

use crate::auth::Identity;
use crate::error::ServerError;
use crate::storage::ServerStorage;
use chrono::{DateTime, Utc};
use keeper_core::clock;
use keeper_core::models::{SecretRecord, SECRET_COLUMNS};
use keeper_core::sync::{ConflictResolver, Resolution};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Result of one `save_items` exchange.
#[derive(Debug, Default)]
pub struct SaveOutcome {
    pub written: usize,
    pub dropped: usize,
    /// Records the device has not seen yet, minus the ones it just sent.
    pub outbound: Vec<SecretRecord>,
}

impl ServerStorage {
    /// The device's watermark. A device that never synced reports the epoch.
    pub fn device_last_sync(&self, identity: Identity) -> Result<DateTime<Utc>, ServerError> {
        let conn = self.conn()?;
        let last_sync: Option<Option<i64>> = conn
            .query_row(
                "SELECT last_sync FROM devices WHERE device_id = ?1 AND user_id = ?2",
                params![identity.device_id, identity.user_id],
                |row| row.get(0),
            )
            .optional()?;

        match last_sync {
            Some(millis) => Ok(millis.map(clock::from_millis).unwrap_or_else(clock::epoch)),
            None => Err(ServerError::NotFound("Unknown device".to_string())),
        }
    }

    /// Apply an incoming batch and return the device's delta, atomically.
    pub fn save_items(
        &self,
        identity: Identity,
        records: &[SecretRecord],
    ) -> Result<SaveOutcome, ServerError> {
        for record in records {
            record.validate()?;
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut outcome = SaveOutcome::default();
        let mut written = HashSet::new();

        for record in records {
            let existing: Option<(i64, i64)> = tx
                .query_row(
                    "SELECT user_id, updated_at FROM secrets WHERE uid = ?1",
                    [&record.uid],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let current = match existing {
                Some((owner, _)) if owner != identity.user_id => {
                    warn!(uid = %record.uid, user_id = identity.user_id, "Rejected write to a record owned by another user");
                    outcome.dropped += 1;
                    continue;
                }
                Some((_, updated_at)) => Some(clock::from_millis(updated_at)),
                None => None,
            };

            match ConflictResolver::resolve_existing(current, record) {
                Resolution::AcceptRemote => {
                    tx.execute(
                        "INSERT INTO secrets (uid, user_id, kind, ciphertext, description, created_at, updated_at, is_deleted)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                         ON CONFLICT(uid) DO UPDATE SET
                            kind = excluded.kind,
                            ciphertext = excluded.ciphertext,
                            description = excluded.description,
                            updated_at = excluded.updated_at,
                            is_deleted = excluded.is_deleted",
                        params![
                            record.uid,
                            identity.user_id,
                            record.kind,
                            record.ciphertext,
                            record.description,
                            clock::to_millis(record.created_at),
                            clock::to_millis(record.updated_at),
                            record.is_deleted,
                        ],
                    )?;
                    written.insert(record.uid.clone());
                    outcome.written += 1;
                }
                Resolution::KeepLocal => {
                    debug!(uid = %record.uid, "Dropped stale write");
                    outcome.dropped += 1;
                }
            }
        }

        let last_sync: i64 = tx
            .query_row(
                "SELECT COALESCE(last_sync, 0) FROM devices WHERE device_id = ?1 AND user_id = ?2",
                params![identity.device_id, identity.user_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| ServerError::NotFound("Unknown device".to_string()))?;

        {
            let mut stmt = tx.prepare(&format!(
                "SELECT {SECRET_COLUMNS} FROM secrets
                 WHERE user_id = ?1 AND updated_at > ?2
                 ORDER BY updated_at, uid"
            ))?;
            let rows = stmt.query_map(params![identity.user_id, last_sync], SecretRecord::from_row)?;
            for row in rows {
                let record = row?;
                if !written.contains(&record.uid) {
                    outcome.outbound.push(record);
                }
            }
        }

        tx.execute(
            "UPDATE devices SET last_sync = MAX(COALESCE(last_sync, 0), ?1) WHERE device_id = ?2",
            params![clock::to_millis(clock::now()), identity.device_id],
        )?;
        tx.commit()?;

        info!(
            user_id = identity.user_id,
            device_id = identity.device_id,
            written = outcome.written,
            dropped = outcome.dropped,
            outbound = outcome.outbound.len(),
            "Sync exchange complete"
        );
        Ok(outcome)
    }
}

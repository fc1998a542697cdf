//! Secret records and the local sync state.
//!
//! The repository never sees plaintext. Timestamps bump with
//! `MAX(now, previous + 1ms)` so every local write strictly advances
//! `updated_at`, even twice within one millisecond.
//!
//! Local writes also mark the row `pending` until that exact version has
//! been accepted by a sync exchange. A write that lands while a run is in
//! flight can end up below the next server watermark, and the flag keeps it
//! in the outbound set anyway.

use crate::clock;
use crate::models::{SecretRecord, SECRET_COLUMNS};
use crate::store::Database;
use crate::sync::conflict::{ConflictResolver, Resolution};
use crate::{DatabaseError, KeeperError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Outcome of applying an inbound batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Records written locally.
    pub applied: usize,
    /// Records skipped because the local copy was as new or newer.
    pub dropped: usize,
}

/// CRUD over [`SecretRecord`] plus the device's sync bookkeeping.
#[derive(Clone)]
pub struct SecretRepository {
    db: Arc<Mutex<Database>>,
}

impl SecretRepository {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    /// The shared handle, for building a [`crate::TokenStore`] on the same database.
    pub fn database(&self) -> Arc<Mutex<Database>> {
        Arc::clone(&self.db)
    }

    fn lock(&self, operation: &str) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| DatabaseError::LockPoisoned(operation.to_string()).into())
    }

    /// Store a new record. Fails with `Duplicate` if the uid was ever used here.
    pub fn insert(&self, record: &SecretRecord) -> Result<()> {
        record.validate()?;
        let db = self.lock("insert")?;
        let conn = db.conn();

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM secrets WHERE uid = ?1)",
            [&record.uid],
            |row| row.get(0),
        )?;
        if exists {
            return Err(KeeperError::Duplicate(record.uid.clone()));
        }

        conn.execute(
            "INSERT INTO secrets (uid, kind, ciphertext, description, created_at, updated_at, is_deleted, pending)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
            params![
                record.uid,
                record.kind,
                record.ciphertext,
                record.description,
                clock::to_millis(record.created_at),
                clock::to_millis(record.updated_at),
                record.is_deleted,
            ],
        )?;
        debug!(uid = %record.uid, kind = %record.kind, "Inserted secret");
        Ok(())
    }

    /// Fetch a live record. Tombstones are reported as `NotFound`.
    pub fn get(&self, uid: &str) -> Result<SecretRecord> {
        let db = self.lock("get")?;
        db.conn()
            .query_row(
                &format!("SELECT {SECRET_COLUMNS} FROM secrets WHERE uid = ?1 AND is_deleted = 0"),
                [uid],
                SecretRecord::from_row,
            )
            .optional()?
            .ok_or_else(|| KeeperError::NotFound(uid.to_string()))
    }

    /// All live records, oldest first.
    pub fn list_active(&self) -> Result<Vec<SecretRecord>> {
        let db = self.lock("list")?;
        let mut stmt = db.conn().prepare(&format!(
            "SELECT {SECRET_COLUMNS} FROM secrets WHERE is_deleted = 0 ORDER BY created_at, uid"
        ))?;
        let records = stmt
            .query_map([], SecretRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Replace ciphertext and description of a live record.
    ///
    /// Returns the bumped `updated_at`.
    pub fn update(&self, record: &SecretRecord) -> Result<DateTime<Utc>> {
        let db = self.lock("update")?;
        let updated_at: Option<i64> = db
            .conn()
            .query_row(
                "UPDATE secrets
                 SET ciphertext = ?2, description = ?3, updated_at = MAX(?4, updated_at + 1), pending = 1
                 WHERE uid = ?1 AND is_deleted = 0
                 RETURNING updated_at",
                params![
                    record.uid,
                    record.ciphertext,
                    record.description,
                    clock::to_millis(clock::now()),
                ],
                |row| row.get(0),
            )
            .optional()?;

        let updated_at = updated_at.ok_or_else(|| KeeperError::NotFound(record.uid.clone()))?;
        debug!(uid = %record.uid, "Updated secret");
        Ok(clock::from_millis(updated_at))
    }

    /// Turn a record into a tombstone. Deleting a tombstone again is a no-op.
    pub fn soft_delete(&self, uid: &str) -> Result<()> {
        let db = self.lock("delete")?;
        let conn = db.conn();

        let changed = conn.execute(
            "UPDATE secrets SET is_deleted = 1, updated_at = MAX(?2, updated_at + 1), pending = 1
             WHERE uid = ?1 AND is_deleted = 0",
            params![uid, clock::to_millis(clock::now())],
        )?;
        if changed > 0 {
            debug!(uid, "Deleted secret");
            return Ok(());
        }

        let tombstoned: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM secrets WHERE uid = ?1)",
            [uid],
            |row| row.get(0),
        )?;
        if tombstoned {
            Ok(())
        } else {
            Err(KeeperError::NotFound(uid.to_string()))
        }
    }

    /// Every record, tombstones included, changed strictly after `since`.
    pub fn list_changed_since(&self, since: DateTime<Utc>) -> Result<Vec<SecretRecord>> {
        let db = self.lock("list changes")?;
        let mut stmt = db.conn().prepare(&format!(
            "SELECT {SECRET_COLUMNS} FROM secrets WHERE updated_at > ?1 ORDER BY updated_at, uid"
        ))?;
        let records = stmt
            .query_map([clock::to_millis(since)], SecretRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// The outbound batch for a sync run: everything changed after `since`
    /// plus every local write not yet accepted by the server.
    pub fn list_outbound(&self, since: DateTime<Utc>) -> Result<Vec<SecretRecord>> {
        let db = self.lock("list outbound")?;
        let mut stmt = db.conn().prepare(&format!(
            "SELECT {SECRET_COLUMNS} FROM secrets
             WHERE updated_at > ?1 OR pending = 1
             ORDER BY updated_at, uid"
        ))?;
        let records = stmt
            .query_map([clock::to_millis(since)], SecretRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Clear `pending` for the versions the server just accepted.
    ///
    /// A row written again since it was collected keeps its flag.
    pub fn mark_pushed(&self, records: &[SecretRecord]) -> Result<usize> {
        let mut db = self.lock("mark pushed")?;
        let tx = db
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut cleared = 0;
        for record in records {
            cleared += tx.execute(
                "UPDATE secrets SET pending = 0
                 WHERE uid = ?1 AND updated_at = ?2 AND pending = 1",
                params![record.uid, clock::to_millis(record.updated_at)],
            )?;
        }
        tx.commit()?;
        Ok(cleared)
    }

    /// Whether a local write to `uid` is still waiting for the server.
    pub fn is_pending(&self, uid: &str) -> Result<bool> {
        let db = self.lock("pending")?;
        let pending = db
            .conn()
            .query_row("SELECT pending FROM secrets WHERE uid = ?1", [uid], |row| row.get(0))
            .optional()?;
        pending.ok_or_else(|| KeeperError::NotFound(uid.to_string()))
    }

    /// Apply records received from the server with last-write-wins.
    ///
    /// Runs as one transaction: either the whole batch is considered or none of it.
    pub fn merge_remote(&self, records: &[SecretRecord]) -> Result<MergeReport> {
        for record in records {
            record.validate()?;
        }

        let mut db = self.lock("merge")?;
        let tx = db
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut report = MergeReport::default();

        for record in records {
            let local: Option<i64> = tx
                .query_row(
                    "SELECT updated_at FROM secrets WHERE uid = ?1",
                    [&record.uid],
                    |row| row.get(0),
                )
                .optional()?;

            match ConflictResolver::resolve_existing(local.map(clock::from_millis), record) {
                Resolution::AcceptRemote => {
                    tx.execute(
                        "INSERT INTO secrets (uid, kind, ciphertext, description, created_at, updated_at, is_deleted, pending)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)
                         ON CONFLICT(uid) DO UPDATE SET
                            kind = excluded.kind,
                            ciphertext = excluded.ciphertext,
                            description = excluded.description,
                            updated_at = excluded.updated_at,
                            is_deleted = excluded.is_deleted,
                            pending = 0",
                        params![
                            record.uid,
                            record.kind,
                            record.ciphertext,
                            record.description,
                            clock::to_millis(record.created_at),
                            clock::to_millis(record.updated_at),
                            record.is_deleted,
                        ],
                    )?;
                    report.applied += 1;
                }
                Resolution::KeepLocal => {
                    debug!(uid = %record.uid, "Dropped remote write, local copy is newer");
                    report.dropped += 1;
                }
            }
        }

        tx.commit()?;
        if !records.is_empty() {
            info!(applied = report.applied, dropped = report.dropped, "Merged remote changes");
        }
        Ok(report)
    }

    /// Stable identifier this store presents to the server as its device name.
    pub fn device_id(&self) -> Result<String> {
        let db = self.lock("device id")?;
        let id = db
            .conn()
            .query_row("SELECT device_id FROM sync_state WHERE id = 1", [], |row| row.get(0))?;
        Ok(id)
    }

    /// When this store last completed a sync run, if ever.
    pub fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>> {
        let db = self.lock("last sync")?;
        let millis: Option<i64> = db.conn().query_row(
            "SELECT last_synced_at FROM sync_state WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(millis.map(clock::from_millis))
    }

    pub fn record_sync(&self, at: DateTime<Utc>) -> Result<()> {
        let db = self.lock("record sync")?;
        db.conn().execute(
            "UPDATE sync_state SET last_synced_at = ?1 WHERE id = 1",
            [clock::to_millis(at)],
        )?;
        Ok(())
    }
}

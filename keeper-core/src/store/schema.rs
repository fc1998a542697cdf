//! Database schema and connection management.

use crate::{DatabaseError, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// How long a writer waits for another process (e.g. a scheduled sync) to
/// release the database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Local database connection and schema manager
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` and initialize the schema
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(DatabaseError::Sqlite)?;
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")
            .map_err(DatabaseError::Sqlite)?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(DatabaseError::Sqlite)?;

        let db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Create a new in-memory database for testing
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::Sqlite)?;
        conn.execute("PRAGMA foreign_keys = ON", [])
            .map_err(DatabaseError::Sqlite)?;

        let db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Wrap for sharing between the vault, the token store and the sync engine
    pub fn shared(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }

    fn initialize_schema(&self) -> Result<()> {
        self.create_secrets_table()?;
        self.create_sync_state_table()?;
        self.create_auth_tokens_table()?;
        Ok(())
    }

    fn create_secrets_table(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS secrets (
                    uid TEXT PRIMARY KEY,
                    kind TEXT NOT NULL,
                    ciphertext BLOB NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    is_deleted INTEGER NOT NULL DEFAULT 0,
                    -- set by local writes, cleared once that exact version reached the server
                    pending INTEGER NOT NULL DEFAULT 0,
                    CHECK (updated_at >= created_at)
                );
                CREATE INDEX IF NOT EXISTS idx_secrets_pending ON secrets(pending) WHERE pending = 1;
                CREATE INDEX IF NOT EXISTS idx_secrets_updated_at ON secrets(updated_at);
                CREATE INDEX IF NOT EXISTS idx_secrets_created_at ON secrets(created_at);",
            )
            .map_err(DatabaseError::Sqlite)?;
        Ok(())
    }

    /// Single row: this device's identity and when it last completed a sync.
    fn create_sync_state_table(&self) -> Result<()> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS sync_state (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    device_id TEXT NOT NULL,
                    last_synced_at INTEGER
                )",
                [],
            )
            .map_err(DatabaseError::Sqlite)?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO sync_state (id, device_id) VALUES (1, ?1)",
                [Uuid::new_v4().to_string()],
            )
            .map_err(DatabaseError::Sqlite)?;
        Ok(())
    }

    fn create_auth_tokens_table(&self) -> Result<()> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS auth_tokens (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    access_token TEXT NOT NULL,
                    refresh_token TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                )",
                [],
            )
            .map_err(DatabaseError::Sqlite)?;
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let db = Database::in_memory().unwrap();
        db.initialize_schema().unwrap();

        let rows: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM sync_state", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn device_id_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("vault.db");

        let read_id = |db: &Database| -> String {
            db.conn()
                .query_row("SELECT device_id FROM sync_state WHERE id = 1", [], |row| row.get(0))
                .unwrap()
        };

        let first = read_id(&Database::open(&path).unwrap());
        let second = read_id(&Database::open(&path).unwrap());
        assert_eq!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
    }
}

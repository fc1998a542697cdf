//! Persisted server tokens.
//!
//! Tokens are stored in plain columns: they are not vault secrets and must
//! be usable before the vault key is available.

use crate::clock;
use crate::models::AuthTokenPair;
use crate::store::Database;
use crate::{DatabaseError, KeeperError, Result};
use rusqlite::{params, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub struct TokenStore {
    db: Arc<Mutex<Database>>,
}

impl TokenStore {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    fn lock(&self, operation: &str) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| DatabaseError::LockPoisoned(operation.to_string()).into())
    }

    /// The current pair, or `NotAuthenticated` if the user never logged in.
    pub fn load(&self) -> Result<AuthTokenPair> {
        let db = self.lock("load tokens")?;
        db.conn()
            .query_row(
                "SELECT access_token, refresh_token FROM auth_tokens WHERE id = 1",
                [],
                |row| {
                    Ok(AuthTokenPair {
                        access_token: row.get(0)?,
                        refresh_token: row.get(1)?,
                    })
                },
            )
            .optional()?
            .ok_or(KeeperError::NotAuthenticated)
    }

    /// Replace both tokens at once.
    pub fn save(&self, pair: &AuthTokenPair) -> Result<()> {
        let db = self.lock("save tokens")?;
        db.conn().execute(
            "INSERT INTO auth_tokens (id, access_token, refresh_token, updated_at)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                updated_at = excluded.updated_at",
            params![
                pair.access_token,
                pair.refresh_token,
                clock::to_millis(clock::now())
            ],
        )?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let db = self.lock("clear tokens")?;
        db.conn().execute("DELETE FROM auth_tokens", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(access: &str, refresh: &str) -> AuthTokenPair {
        AuthTokenPair {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
        }
    }

    #[test]
    fn empty_store_is_not_authenticated() {
        let store = TokenStore::new(Database::in_memory().unwrap().shared());
        assert!(matches!(store.load(), Err(KeeperError::NotAuthenticated)));
    }

    #[test]
    fn save_replaces_wholesale() {
        let store = TokenStore::new(Database::in_memory().unwrap().shared());
        store.save(&pair("a1", "r1")).unwrap();
        store.save(&pair("a2", "r2")).unwrap();
        assert_eq!(store.load().unwrap(), pair("a2", "r2"));

        store.clear().unwrap();
        assert!(matches!(store.load(), Err(KeeperError::NotAuthenticated)));
    }
}

//! Users, their devices and the current refresh token per device.

use crate::auth::{token_digest, Identity, IssuedTokens};
use crate::error::ServerError;
use crate::storage::ServerStorage;
use chrono::{DateTime, Utc};
use keeper_core::clock;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user_id: i64,
    pub password_hash: String,
    /// Hex-encoded key derivation salt handed to clients.
    pub salt: String,
}

impl ServerStorage {
    /// Create an account. A taken login is a `Conflict`.
    pub fn create_user(
        &self,
        login: &str,
        password_hash: &str,
        salt: &str,
    ) -> Result<i64, ServerError> {
        let conn = self.conn()?;
        insert_user(&conn, login, password_hash, salt)
    }

    /// Create the user, its first device and that device's refresh token as
    /// one unit. `issue` mints the tokens once the identity is known; any
    /// failure leaves no trace of the account.
    pub fn create_account<F>(
        &self,
        login: &str,
        password_hash: &str,
        salt: &str,
        device: &str,
        issue: F,
    ) -> Result<IssuedTokens, ServerError>
    where
        F: FnOnce(Identity) -> Result<IssuedTokens, ServerError>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let user_id = insert_user(&tx, login, password_hash, salt)?;
        let device_id = upsert_device(&tx, user_id, device)?;
        let tokens = issue(Identity { user_id, device_id })?;
        upsert_refresh_token(
            &tx,
            device_id,
            &token_digest(&tokens.refresh_token),
            tokens.refresh_expires_at,
        )?;

        tx.commit()?;
        Ok(tokens)
    }

    pub fn find_user(&self, login: &str) -> Result<Option<UserRecord>, ServerError> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT user_id, password_hash, salt FROM users WHERE login = ?1",
                [login],
                |row| {
                    Ok(UserRecord {
                        user_id: row.get(0)?,
                        password_hash: row.get(1)?,
                        salt: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    pub fn user_salt(&self, user_id: i64) -> Result<String, ServerError> {
        let conn = self.conn()?;
        conn.query_row("SELECT salt FROM users WHERE user_id = ?1", [user_id], |row| {
            row.get(0)
        })
        .optional()?
        .ok_or_else(|| ServerError::NotFound("Unknown user".to_string()))
    }

    /// The device row for `(user_id, name)`, created on first use.
    pub fn ensure_device(&self, user_id: i64, name: &str) -> Result<i64, ServerError> {
        let conn = self.conn()?;
        upsert_device(&conn, user_id, name)
    }

    /// Record the one valid refresh token for a device, replacing the previous one.
    pub fn store_refresh_token(
        &self,
        device_id: i64,
        digest: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), ServerError> {
        let conn = self.conn()?;
        upsert_refresh_token(&conn, device_id, digest, expires_at)
    }

    /// Swap the device's live refresh token for a new one, in a single
    /// statement. Returns false when `current` is not the live, unexpired
    /// token of the identity's device, in which case nothing changes.
    pub fn rotate_refresh_token(
        &self,
        identity: Identity,
        current: &str,
        next: &str,
        next_expires_at: DateTime<Utc>,
    ) -> Result<bool, ServerError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE refresh_tokens SET token_digest = ?3, expires_at = ?4
             WHERE device_id = ?1 AND token_digest = ?2 AND expires_at > ?5
               AND EXISTS(SELECT 1 FROM devices d WHERE d.device_id = ?1 AND d.user_id = ?6)",
            params![
                identity.device_id,
                current,
                next,
                clock::to_millis(next_expires_at),
                clock::to_millis(clock::now()),
                identity.user_id
            ],
        )?;
        Ok(changed == 1)
    }

    pub fn prune_expired_refresh_tokens(&self, now: DateTime<Utc>) -> Result<usize, ServerError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM refresh_tokens WHERE expires_at <= ?1",
            [clock::to_millis(now)],
        )?;
        Ok(removed)
    }
}

fn insert_user(
    conn: &Connection,
    login: &str,
    password_hash: &str,
    salt: &str,
) -> Result<i64, ServerError> {
    let inserted = conn.execute(
        "INSERT INTO users (login, password_hash, salt, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![login, password_hash, salt, clock::to_millis(clock::now())],
    );
    match inserted {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(ServerError::Conflict("Login already registered".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

fn upsert_device(conn: &Connection, user_id: i64, name: &str) -> Result<i64, ServerError> {
    conn.execute(
        "INSERT INTO devices (user_id, name, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id, name) DO NOTHING",
        params![user_id, name, clock::to_millis(clock::now())],
    )?;
    let device_id = conn.query_row(
        "SELECT device_id FROM devices WHERE user_id = ?1 AND name = ?2",
        params![user_id, name],
        |row| row.get(0),
    )?;
    Ok(device_id)
}

fn upsert_refresh_token(
    conn: &Connection,
    device_id: i64,
    digest: &str,
    expires_at: DateTime<Utc>,
) -> Result<(), ServerError> {
    conn.execute(
        "INSERT INTO refresh_tokens (device_id, token_digest, expires_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(device_id) DO UPDATE SET
            token_digest = excluded.token_digest,
            expires_at = excluded.expires_at",
        params![device_id, digest, clock::to_millis(expires_at)],
    )?;
    Ok(())
}

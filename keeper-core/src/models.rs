//! Record types shared by local storage, the sync wire format and the server.

use crate::KeeperError;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which plaintext schema a secret's ciphertext decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretKind {
    Login,
    Text,
    Binary,
    Card,
}

impl SecretKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Card => "card",
        }
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecretKind {
    type Err = KeeperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login" => Ok(Self::Login),
            "text" => Ok(Self::Text),
            "binary" => Ok(Self::Binary),
            "card" => Ok(Self::Card),
            other => Err(KeeperError::InvalidInput(format!(
                "unknown secret kind '{}'",
                other
            ))),
        }
    }
}

impl ToSql for SecretKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SecretKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: KeeperError| FromSqlError::Other(e.to_string().into()))
    }
}

/// Column list matching [`SecretRecord::from_row`].
pub const SECRET_COLUMNS: &str =
    "uid, kind, ciphertext, description, created_at, updated_at, is_deleted";

/// One vault entry as storage and sync see it: metadata plus opaque ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub uid: String,
    pub kind: SecretKind,
    /// `nonce || ciphertext || tag`
    #[serde(rename = "data", with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl SecretRecord {
    /// Map a row selected with [`SECRET_COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            uid: row.get(0)?,
            kind: row.get(1)?,
            ciphertext: row.get(2)?,
            description: row.get(3)?,
            created_at: crate::clock::from_millis(row.get(4)?),
            updated_at: crate::clock::from_millis(row.get(5)?),
            is_deleted: row.get(6)?,
        })
    }

    /// Structural checks applied before a record is stored.
    pub fn validate(&self) -> crate::Result<()> {
        if self.uid.trim().is_empty() {
            return Err(KeeperError::InvalidInput("record uid is empty".to_string()));
        }
        if self.updated_at < self.created_at {
            return Err(KeeperError::InvalidInput(format!(
                "record {} was updated before it was created",
                self.uid
            )));
        }
        Ok(())
    }
}

/// Access and refresh tokens for the sync server, replaced together.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for AuthTokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthTokenPair { .. }")
    }
}

/// Server-side watermark for the calling device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSync {
    pub updated_at: DateTime<Utc>,
}

pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

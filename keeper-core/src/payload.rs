//! Plaintext schemas for each secret kind.
//!
//! Text secrets are stored as raw UTF-8; the structured kinds are JSON.
//! The bytes produced here are what gets sealed, so they are held in
//! zeroizing buffers.

use crate::models::{base64_bytes, SecretKind};
use crate::{KeeperError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginSecret {
    pub login: String,
    pub password: String,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSecret {
    pub number: String,
    pub expiry: String,
    pub ccv: String,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinarySecret {
    /// Original file name, used when the secret is exported.
    pub name: String,
    pub size: u64,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
}

impl BinarySecret {
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size: content.len() as u64,
            content,
        }
    }
}

/// Decrypted content of a secret. The variant fixes the record's kind.
#[derive(Clone, PartialEq, Eq)]
pub enum SecretPayload {
    Login(LoginSecret),
    Text(String),
    Card(CardSecret),
    Binary(BinarySecret),
}

impl SecretPayload {
    pub fn kind(&self) -> SecretKind {
        match self {
            Self::Login(_) => SecretKind::Login,
            Self::Text(_) => SecretKind::Text,
            Self::Card(_) => SecretKind::Card,
            Self::Binary(_) => SecretKind::Binary,
        }
    }

    pub fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>> {
        let bytes = match self {
            Self::Text(text) => text.as_bytes().to_vec(),
            Self::Login(login) => serde_json::to_vec(login)?,
            Self::Card(card) => serde_json::to_vec(card)?,
            Self::Binary(file) => serde_json::to_vec(file)?,
        };
        Ok(Zeroizing::new(bytes))
    }

    pub fn from_bytes(kind: SecretKind, bytes: &[u8]) -> Result<Self> {
        let invalid = |e: String| {
            KeeperError::Corruption(format!("{} secret does not decode: {}", kind, e))
        };
        match kind {
            SecretKind::Text => std::str::from_utf8(bytes)
                .map(|text| Self::Text(text.to_string()))
                .map_err(|e| invalid(e.to_string())),
            SecretKind::Login => serde_json::from_slice(bytes)
                .map(Self::Login)
                .map_err(|e| invalid(e.to_string())),
            SecretKind::Card => serde_json::from_slice(bytes)
                .map(Self::Card)
                .map_err(|e| invalid(e.to_string())),
            SecretKind::Binary => serde_json::from_slice(bytes)
                .map(Self::Binary)
                .map_err(|e| invalid(e.to_string())),
        }
    }
}

impl fmt::Debug for SecretPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretPayload::{}(<redacted>)", self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_raw_utf8() {
        let payload = SecretPayload::Text("hello".to_string());
        assert_eq!(payload.to_bytes().unwrap().as_slice(), b"hello");
    }

    #[test]
    fn login_is_json() {
        let payload = SecretPayload::Login(LoginSecret {
            login: "alice".to_string(),
            password: "hunter2".to_string(),
        });
        let bytes = payload.to_bytes().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["login"], "alice");
        assert_eq!(json["password"], "hunter2");

        let decoded = SecretPayload::from_bytes(SecretKind::Login, &bytes).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn binary_tracks_size() {
        let file = BinarySecret::new("id.pem", vec![0u8; 42]);
        assert_eq!(file.size, 42);

        let payload = SecretPayload::Binary(file);
        let bytes = payload.to_bytes().unwrap();
        let decoded = SecretPayload::from_bytes(SecretKind::Binary, &bytes).unwrap();
        assert_eq!(decoded.kind(), SecretKind::Binary);
        assert_eq!(decoded, payload);
    }

    #[test]
    fn wrong_schema_is_corruption() {
        let bytes = SecretPayload::Text("not json".to_string()).to_bytes().unwrap();
        assert!(matches!(
            SecretPayload::from_bytes(SecretKind::Card, &bytes),
            Err(KeeperError::Corruption(_))
        ));
        assert!(matches!(
            SecretPayload::from_bytes(SecretKind::Text, &[0xff, 0xfe]),
            Err(KeeperError::Corruption(_))
        ));
    }

    #[test]
    fn debug_hides_content() {
        let payload = SecretPayload::Card(CardSecret {
            number: "4111111111111111".to_string(),
            expiry: "12/30".to_string(),
            ccv: "123".to_string(),
        });
        let printed = format!("{:?}", payload);
        assert!(!printed.contains("4111"));
        assert!(printed.contains("card"));
    }
}

//! Request and response bodies of the account endpoints.
//!
//! The sync endpoints carry [`crate::SecretRecord`] and [`crate::LastSync`] directly.

use crate::{KeeperError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

pub const LOGIN_LENGTH: RangeInclusive<usize> = 2..=20;
pub const PASSWORD_LENGTH: RangeInclusive<usize> = 5..=100;

/// Register and login body. `device` names the calling device for the account.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
    pub device: String,
}

impl Credentials {
    pub fn validate(&self) -> Result<()> {
        let login_len = self.login.chars().count();
        if !LOGIN_LENGTH.contains(&login_len) {
            return Err(KeeperError::InvalidInput(format!(
                "login must be {}-{} characters",
                LOGIN_LENGTH.start(),
                LOGIN_LENGTH.end()
            )));
        }
        let password_len = self.password.chars().count();
        if !PASSWORD_LENGTH.contains(&password_len) {
            return Err(KeeperError::InvalidInput(format!(
                "password must be {}-{} characters",
                PASSWORD_LENGTH.start(),
                PASSWORD_LENGTH.end()
            )));
        }
        if self.device.trim().is_empty() {
            return Err(KeeperError::InvalidInput("device name is empty".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

/// Returned by register, login and refresh. `salt` is hex.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub salt: String,
}

impl fmt::Debug for AuthResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthResponse")
            .field("salt", &self.salt)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub token: String,
}

/// Error body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(login: &str, password: &str) -> Credentials {
        Credentials {
            login: login.to_string(),
            password: password.to_string(),
            device: "laptop".to_string(),
        }
    }

    #[test]
    fn accepts_bounds() {
        assert!(creds("ab", "12345").validate().is_ok());
        assert!(creds(&"a".repeat(20), &"p".repeat(100)).validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(creds("a", "12345").validate().is_err());
        assert!(creds(&"a".repeat(21), "12345").validate().is_err());
        assert!(creds("alice", "1234").validate().is_err());
        assert!(creds("alice", &"p".repeat(101)).validate().is_err());
    }

    #[test]
    fn rejects_blank_device() {
        let mut c = creds("alice", "secret");
        c.device = "  ".to_string();
        assert!(c.validate().is_err());
    }

    #[test]
    fn debug_omits_password() {
        let printed = format!("{:?}", creds("alice", "hunter22"));
        assert!(printed.contains("alice"));
        assert!(!printed.contains("hunter22"));
    }
}

//! Last-Write-Wins conflict resolution.
//!
//! Shared by the client merge and the server upsert so both sides settle a
//! conflict the same way.

use crate::models::SecretRecord;
use chrono::{DateTime, Utc};

/// Conflict resolution outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Write the incoming record (it is strictly newer, or there is no copy yet).
    AcceptRemote,
    /// Keep the stored record (it is newer or equally new).
    KeepLocal,
}

pub struct ConflictResolver;

impl ConflictResolver {
    /// Resolve an incoming write against the stored copy's `updated_at`.
    ///
    /// Strictly newer wins; a tie keeps the stored copy.
    pub fn resolve(local_updated_at: DateTime<Utc>, remote: &SecretRecord) -> Resolution {
        if remote.updated_at > local_updated_at {
            Resolution::AcceptRemote
        } else {
            Resolution::KeepLocal
        }
    }

    /// Like [`ConflictResolver::resolve`], accepting anything that has no stored copy.
    pub fn resolve_existing(
        local_updated_at: Option<DateTime<Utc>>,
        remote: &SecretRecord,
    ) -> Resolution {
        match local_updated_at {
            Some(local) => Self::resolve(local, remote),
            None => Resolution::AcceptRemote,
        }
    }
}

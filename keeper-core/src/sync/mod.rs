//! Client side of the sync protocol.
//!
//! - Last-write-wins conflict resolution on `updated_at`
//! - Tombstones propagate like any other write
//! - The server owns each device's watermark; the client asks for it at
//!   the start of every run

pub mod conflict;
pub mod models;

#[cfg(feature = "sync")]
pub mod client;
#[cfg(feature = "sync")]
pub mod engine;

pub use conflict::{ConflictResolver, Resolution};
pub use models::{AuthResponse, Credentials, RefreshRequest};

#[cfg(feature = "sync")]
pub use client::SyncClient;
#[cfg(feature = "sync")]
pub use engine::{RemoteVault, SyncEngine, SyncReport};

//! Keeper Sync Server
//!
//! Authoritative store for every account's encrypted records. Clients push
//! their changes and receive everything they have not seen yet; conflicts
//! are settled by last-write-wins on `updated_at`. The server only ever
//! holds ciphertext.

pub mod auth;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod storage;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::{build_router, AppState};
pub use storage::ServerStorage;

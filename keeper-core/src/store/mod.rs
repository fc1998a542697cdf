//! Local SQLite storage.
//!
//! All handles share one `Arc<Mutex<Database>>`, so vault operations, token
//! updates and sync merges never interleave within a process.

pub mod repository;
pub mod schema;
pub mod tokens;

pub use repository::{MergeReport, SecretRepository};
pub use schema::Database;
pub use tokens::TokenStore;

//! Durable mirror for call sessions, backed by `SQLite`.
//!
//! | Module          | Purpose                                        |
//! |-----------------|------------------------------------------------|
//! | [`connection`]  | r2d2 pool construction, pragmas                |
//! | [`migrations`]  | versioned schema via `PRAGMA user_version`     |
//! | [`repositories`]| stateless SQL, one repo per table              |
//! | [`store`]       | [`CallStore`] — busy-retried high-level API    |
//! | [`write_behind`]| bounded queue keeping disk off the call path   |
//!
//! The live registry owns in-flight call state; this crate persists it
//! for history, restarts, and retention pruning.

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repositories;
pub mod row_types;
pub mod store;
pub mod write_behind;

pub use connection::{ConnectionConfig, new_in_memory, new_pool};
pub use errors::{Result, StoreError};
pub use migrations::run_migrations;
pub use store::CallStore;
pub use write_behind::{StoreOp, WriteBehindQueue, WriteFailure, spawn_writer};

use std::path::PathBuf;
use std::sync::Arc;

/// Open a file-backed store at `path`, running migrations.
pub fn open(path: &PathBuf) -> Result<Arc<CallStore>> {
    let pool = new_pool(path, &ConnectionConfig::default())?;
    {
        let conn = pool.get()?;
        run_migrations(&conn)?;
    }
    Ok(Arc::new(CallStore::new(pool)))
}

/// Open an in-memory store, running migrations. For tests.
pub fn open_in_memory() -> Result<Arc<CallStore>> {
    let pool = new_in_memory(&ConnectionConfig::default())?;
    {
        let conn = pool.get()?;
        run_migrations(&conn)?;
    }
    Ok(Arc::new(CallStore::new(pool)))
}

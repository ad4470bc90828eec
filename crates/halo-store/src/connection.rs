//! SQLite connection pool construction.

use std::path::PathBuf;
use std::time::Duration;

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::errors::Result;

/// r2d2 pool of `SQLite` connections.
pub type ConnectionPool = r2d2::Pool<SqliteConnectionManager>;
/// One pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool construction options.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Maximum pool size.
    pub max_size: u32,
    /// How long to wait for a free connection.
    pub connection_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_size: 4,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

/// Per-connection pragmas applied on checkout.
fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
}

#[derive(Copy, Clone, Debug)]
struct PragmaCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> rusqlite::Result<()> {
        apply_pragmas(conn)
    }
}

/// Open (creating if needed) a file-backed pool at `path`.
pub fn new_pool(path: &PathBuf, config: &ConnectionConfig) -> Result<ConnectionPool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| crate::errors::StoreError::Internal(e.to_string()))?;
    }
    let manager = SqliteConnectionManager::file(path);
    let pool = r2d2::Pool::builder()
        .max_size(config.max_size)
        .connection_timeout(config.connection_timeout)
        .connection_customizer(Box::new(PragmaCustomizer))
        .build(manager)?;
    Ok(pool)
}

/// In-memory pool for tests.
///
/// Pool size is forced to 1 — each in-memory connection is its own
/// database, so sharing a pool of them would show disjoint state.
pub fn new_in_memory(config: &ConnectionConfig) -> Result<ConnectionPool> {
    let manager = SqliteConnectionManager::memory();
    let pool = r2d2::Pool::builder()
        .max_size(1)
        .connection_timeout(config.connection_timeout)
        .connection_customizer(Box::new(PragmaCustomizer))
        .build(manager)?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_pool_opens() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
        assert_eq!(one, 1);
    }

    #[test]
    fn file_pool_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("halo.db");
        let pool = new_pool(&path, &ConnectionConfig::default()).unwrap();
        let _conn = pool.get().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn pragmas_applied() {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }
}

//! Store errors.

use thiserror::Error;

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying `SQLite` error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool exhausted or broken.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Session row not present in the mirror.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Anything else.
    #[error("internal store error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let e = StoreError::SessionNotFound("sess_9".into());
        assert!(e.to_string().contains("sess_9"));
    }
}

//! Schema migrations, versioned via `PRAGMA user_version`.
//!
//! Each migration runs exactly once, in order, inside a transaction.
//! The live session registry is authoritative while a call is in flight;
//! these tables are the durable mirror read back for history and restarts.

use rusqlite::Connection;

use crate::errors::Result;

/// Current schema version. Bump when adding a migration below.
const SCHEMA_VERSION: i64 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version < 1 {
        conn.execute_batch(
            "BEGIN;
             CREATE TABLE IF NOT EXISTS sessions (
                 id               TEXT PRIMARY KEY,
                 user_id          TEXT NOT NULL,
                 owner_id         TEXT,
                 domain           TEXT NOT NULL,
                 page_url         TEXT NOT NULL,
                 status           TEXT NOT NULL,
                 started_at       TEXT NOT NULL,
                 escalated_at     TEXT,
                 ai_ended_at      TEXT,
                 ended_at         TEXT,
                 end_reason       TEXT,
                 duration_secs    INTEGER,
                 metadata         TEXT NOT NULL DEFAULT '{}'
             );
             CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
             CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);

             CREATE TABLE IF NOT EXISTS call_events (
                 id          TEXT PRIMARY KEY,
                 session_id  TEXT NOT NULL,
                 kind        TEXT NOT NULL,
                 timestamp   TEXT NOT NULL,
                 data        TEXT NOT NULL DEFAULT '{}'
             );
             CREATE INDEX IF NOT EXISTS idx_call_events_session
                 ON call_events(session_id, timestamp);

             PRAGMA user_version = 1;
             COMMIT;",
        )?;
    }

    if version < 2 {
        conn.execute_batch(
            "BEGIN;
             CREATE TABLE IF NOT EXISTS device_tokens (
                 token         TEXT PRIMARY KEY,
                 owner_id      TEXT NOT NULL,
                 environment   TEXT NOT NULL DEFAULT 'production',
                 active        INTEGER NOT NULL DEFAULT 1,
                 created_at    TEXT NOT NULL,
                 last_seen_at  TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_device_tokens_owner
                 ON device_tokens(owner_id, active);

             PRAGMA user_version = 2;
             COMMIT;",
        )?;
    }

    debug_assert!(version <= SCHEMA_VERSION);
    Ok(())
}

//! Device token repository — push registration per operator.
//!
//! Tokens are keyed by the raw token string. Re-registering an existing
//! token refreshes `last_seen_at` and reactivates it; delivery failures
//! with a permanent status deactivate via [`DeviceTokenRepo::mark_invalid`].

use rusqlite::{Connection, params};

use crate::errors::Result;
use crate::row_types::DeviceTokenRow;

fn row_to_token(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeviceTokenRow> {
    Ok(DeviceTokenRow {
        token: row.get(0)?,
        owner_id: row.get(1)?,
        environment: row.get(2)?,
        active: row.get::<_, i64>(3)? != 0,
        created_at: row.get(4)?,
        last_seen_at: row.get(5)?,
    })
}

/// Device token repository — stateless, every method takes `&Connection`.
pub struct DeviceTokenRepo;

impl DeviceTokenRepo {
    /// Register (or refresh) a token for an operator.
    pub fn register(
        conn: &Connection,
        token: &str,
        owner_id: &str,
        environment: &str,
        now: &str,
    ) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO device_tokens (token, owner_id, environment, active, created_at, last_seen_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?4)
             ON CONFLICT(token) DO UPDATE SET
                 owner_id = excluded.owner_id,
                 environment = excluded.environment,
                 active = 1,
                 last_seen_at = excluded.last_seen_at",
            params![token, owner_id, environment, now],
        )?;
        Ok(())
    }

    /// Remove a token entirely (explicit unregister).
    pub fn unregister(conn: &Connection, token: &str) -> Result<bool> {
        let deleted = conn.execute("DELETE FROM device_tokens WHERE token = ?1", params![token])?;
        Ok(deleted > 0)
    }

    /// Active tokens for one operator, most recently seen first.
    pub fn get_active_for_owner(conn: &Connection, owner_id: &str) -> Result<Vec<DeviceTokenRow>> {
        let mut stmt = conn.prepare(
            "SELECT token, owner_id, environment, active, created_at, last_seen_at
             FROM device_tokens WHERE owner_id = ?1 AND active = 1
             ORDER BY last_seen_at DESC",
        )?;
        let rows = stmt
            .query_map(params![owner_id], row_to_token)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Deactivate a token after a permanent delivery failure.
    pub fn mark_invalid(conn: &Connection, token: &str) -> Result<()> {
        let _ = conn.execute(
            "UPDATE device_tokens SET active = 0 WHERE token = ?1",
            params![token],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn register_and_fetch() {
        let conn = setup();
        DeviceTokenRepo::register(&conn, "tok_1", "op_1", "production", "2026-08-30T10:00:00Z")
            .unwrap();
        let tokens = DeviceTokenRepo::get_active_for_owner(&conn, "op_1").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].token, "tok_1");
        assert!(tokens[0].active);
    }

    #[test]
    fn reregister_reactivates() {
        let conn = setup();
        DeviceTokenRepo::register(&conn, "tok_1", "op_1", "production", "2026-08-30T10:00:00Z")
            .unwrap();
        DeviceTokenRepo::mark_invalid(&conn, "tok_1").unwrap();
        assert!(DeviceTokenRepo::get_active_for_owner(&conn, "op_1").unwrap().is_empty());

        DeviceTokenRepo::register(&conn, "tok_1", "op_1", "production", "2026-08-30T11:00:00Z")
            .unwrap();
        let tokens = DeviceTokenRepo::get_active_for_owner(&conn, "op_1").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].last_seen_at, "2026-08-30T11:00:00Z");
    }

    #[test]
    fn unregister_removes_row() {
        let conn = setup();
        DeviceTokenRepo::register(&conn, "tok_1", "op_1", "production", "2026-08-30T10:00:00Z")
            .unwrap();
        assert!(DeviceTokenRepo::unregister(&conn, "tok_1").unwrap());
        assert!(!DeviceTokenRepo::unregister(&conn, "tok_1").unwrap());
    }
}

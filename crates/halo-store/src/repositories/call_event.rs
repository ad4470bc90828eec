//! Call event repository — append-only audit trail per session.

use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::errors::Result;
use crate::row_types::CallEventRow;

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<CallEventRow> {
    Ok(CallEventRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        kind: row.get(2)?,
        timestamp: row.get(3)?,
        data: row.get(4)?,
    })
}

/// Call event repository — stateless, every method takes `&Connection`.
pub struct CallEventRepo;

impl CallEventRepo {
    /// Append one audit event. Returns the generated event ID.
    pub fn append(
        conn: &Connection,
        session_id: &str,
        kind: &str,
        timestamp: &str,
        data: &str,
    ) -> Result<String> {
        let id = format!("aev_{}", Uuid::now_v7());
        let _ = conn.execute(
            "INSERT INTO call_events (id, session_id, kind, timestamp, data)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, session_id, kind, timestamp, data],
        )?;
        Ok(id)
    }

    /// All events for a session, oldest first.
    pub fn list_by_session(conn: &Connection, session_id: &str) -> Result<Vec<CallEventRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, session_id, kind, timestamp, data
             FROM call_events WHERE session_id = ?1
             ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![session_id], row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Delete events older than `cutoff` (RFC 3339). Returns rows removed.
    pub fn delete_before(conn: &Connection, cutoff: &str) -> Result<usize> {
        let deleted = conn.execute(
            "DELETE FROM call_events WHERE timestamp < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
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
    fn append_and_list_keeps_order() {
        let conn = setup();
        CallEventRepo::append(&conn, "sess_a", "call.started", "2026-08-30T10:00:00Z", "{}")
            .unwrap();
        CallEventRepo::append(
            &conn,
            "sess_a",
            "call.escalation_requested",
            "2026-08-30T10:05:00Z",
            r#"{"reason":"payment"}"#,
        )
        .unwrap();
        CallEventRepo::append(&conn, "sess_b", "call.started", "2026-08-30T10:01:00Z", "{}")
            .unwrap();

        let events = CallEventRepo::list_by_session(&conn, "sess_a").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, "call.started");
        assert_eq!(events[1].kind, "call.escalation_requested");
    }

    #[test]
    fn ids_are_prefixed_and_unique() {
        let conn = setup();
        let a = CallEventRepo::append(&conn, "s", "call.started", "2026-08-30T10:00:00Z", "{}")
            .unwrap();
        let b = CallEventRepo::append(&conn, "s", "call.ended", "2026-08-30T10:01:00Z", "{}")
            .unwrap();
        assert!(a.starts_with("aev_"));
        assert_ne!(a, b);
    }

    #[test]
    fn delete_before_trims_old_rows() {
        let conn = setup();
        CallEventRepo::append(&conn, "s", "call.started", "2026-01-01T00:00:00Z", "{}").unwrap();
        CallEventRepo::append(&conn, "s", "call.ended", "2026-08-01T00:00:00Z", "{}").unwrap();
        let deleted = CallEventRepo::delete_before(&conn, "2026-06-01T00:00:00Z").unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(CallEventRepo::list_by_session(&conn, "s").unwrap().len(), 1);
    }
}

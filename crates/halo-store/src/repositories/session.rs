//! Session repository — upsert-heavy mirror of the live registry.
//!
//! The live registry writes through here on every state change, so the
//! primary write path is `INSERT .. ON CONFLICT DO UPDATE` rather than
//! separate create/update methods.

use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;
use crate::row_types::SessionRow;

/// Columns written on every mirror write.
pub struct UpsertSessionOptions<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub owner_id: Option<&'a str>,
    pub domain: &'a str,
    pub page_url: &'a str,
    pub status: &'a str,
    pub started_at: &'a str,
    pub escalated_at: Option<&'a str>,
    pub ai_ended_at: Option<&'a str>,
    /// JSON object, serialized by the caller.
    pub metadata: &'a str,
}

/// Filters for listing mirrored sessions.
#[derive(Default)]
pub struct ListSessionsOptions<'a> {
    /// Restrict to one user.
    pub user_id: Option<&'a str>,
    /// Restrict to one status.
    pub status: Option<&'a str>,
    /// Max rows returned (applied after filters, newest first).
    pub limit: Option<u32>,
}

const SELECT_COLUMNS: &str = "id, user_id, owner_id, domain, page_url, status, started_at, \
     escalated_at, ai_ended_at, ended_at, end_reason, duration_secs, metadata";

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        owner_id: row.get(2)?,
        domain: row.get(3)?,
        page_url: row.get(4)?,
        status: row.get(5)?,
        started_at: row.get(6)?,
        escalated_at: row.get(7)?,
        ai_ended_at: row.get(8)?,
        ended_at: row.get(9)?,
        end_reason: row.get(10)?,
        duration_secs: row.get(11)?,
        metadata: row.get(12)?,
    })
}

/// Session repository — stateless, every method takes `&Connection`.
pub struct SessionRepo;

impl SessionRepo {
    /// Write the current live-registry state for a session.
    ///
    /// Ended-only columns (`ended_at`, `end_reason`, `duration_secs`) are
    /// untouched here; they are set once by [`Self::mark_ended`].
    pub fn upsert(conn: &Connection, opts: &UpsertSessionOptions<'_>) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO sessions
                 (id, user_id, owner_id, domain, page_url, status, started_at,
                  escalated_at, ai_ended_at, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                 owner_id = excluded.owner_id,
                 status = excluded.status,
                 escalated_at = excluded.escalated_at,
                 ai_ended_at = excluded.ai_ended_at,
                 metadata = excluded.metadata",
            params![
                opts.id,
                opts.user_id,
                opts.owner_id,
                opts.domain,
                opts.page_url,
                opts.status,
                opts.started_at,
                opts.escalated_at,
                opts.ai_ended_at,
                opts.metadata,
            ],
        )?;
        Ok(())
    }

    /// Record final disposition. Idempotent — a second call for the same
    /// session is a no-op so replayed end writes cannot clobber the first.
    pub fn mark_ended(
        conn: &Connection,
        session_id: &str,
        ended_at: &str,
        end_reason: &str,
        duration_secs: i64,
    ) -> Result<()> {
        let _ = conn.execute(
            "UPDATE sessions
             SET status = 'ended', ended_at = ?2, end_reason = ?3, duration_secs = ?4
             WHERE id = ?1 AND ended_at IS NULL",
            params![session_id, ended_at, end_reason, duration_secs],
        )?;
        Ok(())
    }

    /// Get one mirrored session by ID.
    pub fn get_by_id(conn: &Connection, session_id: &str) -> Result<Option<SessionRow>> {
        let row = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM sessions WHERE id = ?1"),
                params![session_id],
                row_to_session,
            )
            .optional()?;
        Ok(row)
    }

    /// List mirrored sessions, newest first.
    pub fn list(conn: &Connection, opts: &ListSessionsOptions<'_>) -> Result<Vec<SessionRow>> {
        let mut sql = format!("SELECT {SELECT_COLUMNS} FROM sessions WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(user_id) = opts.user_id {
            sql.push_str(&format!(" AND user_id = ?{}", args.len() + 1));
            args.push(Box::new(user_id.to_string()));
        }
        if let Some(status) = opts.status {
            sql.push_str(&format!(" AND status = ?{}", args.len() + 1));
            args.push(Box::new(status.to_string()));
        }
        sql.push_str(" ORDER BY started_at DESC");
        if let Some(limit) = opts.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = conn.prepare(&sql)?;
        let params = rusqlite::params_from_iter(args.iter().map(|b| b.as_ref()));
        let rows = stmt
            .query_map(params, row_to_session)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Count mirrored sessions for a user (any status).
    pub fn count_for_user(conn: &Connection, user_id: &str) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete mirrored sessions that ended before `cutoff` (RFC 3339).
    /// Returns the number of rows removed.
    pub fn delete_ended_before(conn: &Connection, cutoff: &str) -> Result<usize> {
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE ended_at IS NOT NULL AND ended_at < ?1",
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

    fn upsert_opts<'a>(id: &'a str, status: &'a str) -> UpsertSessionOptions<'a> {
        UpsertSessionOptions {
            id,
            user_id: "user_1",
            owner_id: None,
            domain: "shop.example.com",
            page_url: "https://shop.example.com/checkout",
            status,
            started_at: "2026-08-30T10:00:00Z",
            escalated_at: None,
            ai_ended_at: None,
            metadata: "{}",
        }
    }

    #[test]
    fn upsert_then_get() {
        let conn = setup();
        SessionRepo::upsert(&conn, &upsert_opts("sess_a", "ai")).unwrap();
        let row = SessionRepo::get_by_id(&conn, "sess_a").unwrap().unwrap();
        assert_eq!(row.status, "ai");
        assert_eq!(row.domain, "shop.example.com");
    }

    #[test]
    fn upsert_updates_in_place() {
        let conn = setup();
        SessionRepo::upsert(&conn, &upsert_opts("sess_a", "ai")).unwrap();
        let mut opts = upsert_opts("sess_a", "escalating");
        opts.escalated_at = Some("2026-08-30T10:05:00Z");
        SessionRepo::upsert(&conn, &opts).unwrap();
        let row = SessionRepo::get_by_id(&conn, "sess_a").unwrap().unwrap();
        assert_eq!(row.status, "escalating");
        assert_eq!(row.escalated_at.as_deref(), Some("2026-08-30T10:05:00Z"));
        assert_eq!(SessionRepo::count_for_user(&conn, "user_1").unwrap(), 1);
    }

    #[test]
    fn mark_ended_is_idempotent() {
        let conn = setup();
        SessionRepo::upsert(&conn, &upsert_opts("sess_a", "ai")).unwrap();
        SessionRepo::mark_ended(&conn, "sess_a", "2026-08-30T10:10:00Z", "user_hangup", 600)
            .unwrap();
        SessionRepo::mark_ended(&conn, "sess_a", "2026-08-30T11:00:00Z", "other", 999).unwrap();
        let row = SessionRepo::get_by_id(&conn, "sess_a").unwrap().unwrap();
        assert_eq!(row.ended_at.as_deref(), Some("2026-08-30T10:10:00Z"));
        assert_eq!(row.end_reason.as_deref(), Some("user_hangup"));
        assert_eq!(row.duration_secs, Some(600));
    }

    #[test]
    fn list_filters_by_status_and_user() {
        let conn = setup();
        SessionRepo::upsert(&conn, &upsert_opts("sess_a", "ai")).unwrap();
        SessionRepo::upsert(&conn, &upsert_opts("sess_b", "human")).unwrap();
        let mut other = upsert_opts("sess_c", "ai");
        other.user_id = "user_2";
        SessionRepo::upsert(&conn, &other).unwrap();

        let ai = SessionRepo::list(
            &conn,
            &ListSessionsOptions {
                status: Some("ai"),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(ai.len(), 2);

        let mine = SessionRepo::list(
            &conn,
            &ListSessionsOptions {
                user_id: Some("user_1"),
                status: Some("ai"),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, "sess_a");
    }

    #[test]
    fn retention_deletes_only_ended() {
        let conn = setup();
        SessionRepo::upsert(&conn, &upsert_opts("sess_old", "ai")).unwrap();
        SessionRepo::mark_ended(&conn, "sess_old", "2026-01-01T00:00:00Z", "done", 10).unwrap();
        SessionRepo::upsert(&conn, &upsert_opts("sess_live", "ai")).unwrap();

        let deleted = SessionRepo::delete_ended_before(&conn, "2026-06-01T00:00:00Z").unwrap();
        assert_eq!(deleted, 1);
        assert!(SessionRepo::get_by_id(&conn, "sess_old").unwrap().is_none());
        assert!(SessionRepo::get_by_id(&conn, "sess_live").unwrap().is_some());
    }
}

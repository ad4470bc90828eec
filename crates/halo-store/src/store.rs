//! High-level `CallStore` API over the repositories.
//!
//! The live session registry is the source of truth while a call is in
//! flight; `CallStore` is the durable mirror behind it. Writes are small
//! single-statement operations, serialized per-session via in-process
//! locks and retried on `SQLite` BUSY/LOCKED with jittered backoff.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tracing::{debug, instrument};

use halo_core::audit::{CallEvent, CallEventKind};
use halo_core::call::{CallSession, CallStatus};
use halo_core::ids::{SessionId, UserId};

use crate::connection::{ConnectionPool, PooledConnection};
use crate::errors::{Result, StoreError};
use crate::repositories::{
    CallEventRepo, DeviceTokenRepo, ListSessionsOptions, SessionRepo, UpsertSessionOptions,
};
use crate::row_types::{DeviceTokenRow, SessionRow};

/// Durable mirror of call sessions, audit events, and device tokens.
///
/// INVARIANT: writes for one session are serialized via per-session
/// in-process mutexes (`with_session_write_lock`), so a mirror write and
/// an end write for the same session cannot interleave.
pub struct CallStore {
    pool: ConnectionPool,
    session_write_locks: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl CallStore {
    const SQLITE_BUSY_MAX_RETRIES: u32 = 32;

    /// Create a new `CallStore` with the given connection pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            pool,
            session_write_locks: Mutex::new(HashMap::new()),
        }
    }

    fn acquire_session_write_lock(&self, session_id: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .session_write_locks
            .lock()
            .map_err(|_| StoreError::Internal("session lock map poisoned".into()))?;

        // Opportunistically prune dead weak refs when the map grows.
        if locks.len() > 128 {
            locks.retain(|_, weak| weak.strong_count() > 0);
        }

        if let Some(existing) = locks.get(session_id).and_then(Weak::upgrade) {
            return Ok(existing);
        }

        let lock = Arc::new(Mutex::new(()));
        let _ = locks.insert(session_id.to_string(), Arc::downgrade(&lock));
        Ok(lock)
    }

    fn with_session_write_lock<T>(
        &self,
        session_id: &str,
        f: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let session_lock = self.acquire_session_write_lock(session_id)?;
        let _guard = session_lock
            .lock()
            .map_err(|_| StoreError::Internal("session write lock poisoned".into()))?;
        self.retry_on_sqlite_busy(f)
    }

    /// Retry an operation on `SQLite` BUSY/LOCKED with linear backoff + jitter.
    ///
    /// Backoff: base = min(attempts * 10, 500) ms, jitter ±25% so concurrent
    /// writers contending on the same database spread out.
    #[allow(clippy::unused_self)]
    fn retry_on_sqlite_busy<T>(&self, mut f: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempts = 0;

        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(err)
                    if Self::is_sqlite_busy_or_locked(&err)
                        && attempts < Self::SQLITE_BUSY_MAX_RETRIES =>
                {
                    attempts += 1;
                    let base_ms = u64::from(attempts).saturating_mul(10).min(500);
                    let jitter_range = base_ms / 4;
                    let jitter = if jitter_range > 0 {
                        rand::random::<u64>() % (jitter_range * 2 + 1)
                    } else {
                        0
                    };
                    let backoff_ms = base_ms.saturating_sub(jitter_range) + jitter;
                    std::thread::sleep(Duration::from_millis(backoff_ms));
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn is_sqlite_busy_or_locked(err: &StoreError) -> bool {
        match err {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, _)) => {
                matches!(
                    code.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                )
            }
            _ => false,
        }
    }

    /// Get a connection from the pool.
    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session mirror
    // ─────────────────────────────────────────────────────────────────────

    /// Mirror the current state of a live session.
    #[instrument(skip(self, session), fields(session_id = %session.session_id))]
    pub fn mirror_session(&self, session: &CallSession) -> Result<()> {
        let session_id = session.session_id.as_str().to_string();
        self.with_session_write_lock(&session_id, || {
            let conn = self.conn()?;
            let metadata = serde_json::to_string(&session.metadata)
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            let escalated_at = session.escalated_at.map(|t| t.to_rfc3339());
            let ai_ended_at = session.ai_ended_at.map(|t| t.to_rfc3339());
            SessionRepo::upsert(
                &conn,
                &UpsertSessionOptions {
                    id: session.session_id.as_str(),
                    user_id: session.user_id.as_str(),
                    owner_id: session.owner_id.as_ref().map(|o| o.as_str()),
                    domain: &session.domain,
                    page_url: &session.page_url,
                    status: session.status.as_str(),
                    started_at: &session.started_at.to_rfc3339(),
                    escalated_at: escalated_at.as_deref(),
                    ai_ended_at: ai_ended_at.as_deref(),
                    metadata: &metadata,
                },
            )
        })?;
        debug!("session mirrored");
        Ok(())
    }

    /// Record a session's final disposition. Idempotent.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn mark_session_ended(
        &self,
        session_id: &SessionId,
        ended_at: chrono::DateTime<chrono::Utc>,
        end_reason: &str,
        duration_secs: i64,
    ) -> Result<()> {
        let id = session_id.as_str().to_string();
        let ended_at = ended_at.to_rfc3339();
        let reason = end_reason.to_string();
        self.with_session_write_lock(&id, || {
            let conn = self.conn()?;
            SessionRepo::mark_ended(&conn, &id, &ended_at, &reason, duration_secs)
        })
    }

    /// Fetch one mirrored session, reconstructed as a domain value.
    pub fn get_session(&self, session_id: &SessionId) -> Result<Option<CallSession>> {
        let conn = self.conn()?;
        let row = SessionRepo::get_by_id(&conn, session_id.as_str())?;
        row.map(row_into_session).transpose()
    }

    /// List mirrored sessions with a given status, newest first.
    pub fn list_sessions_by_status(
        &self,
        status: CallStatus,
        limit: u32,
    ) -> Result<Vec<CallSession>> {
        let conn = self.conn()?;
        let rows = SessionRepo::list(
            &conn,
            &ListSessionsOptions {
                status: Some(status.as_str()),
                limit: Some(limit),
                ..Default::default()
            },
        )?;
        rows.into_iter().map(row_into_session).collect()
    }

    /// List mirrored sessions for one user, newest first.
    pub fn list_sessions_for_user(&self, user_id: &UserId, limit: u32) -> Result<Vec<CallSession>> {
        let conn = self.conn()?;
        let rows = SessionRepo::list(
            &conn,
            &ListSessionsOptions {
                user_id: Some(user_id.as_str()),
                limit: Some(limit),
                ..Default::default()
            },
        )?;
        rows.into_iter().map(row_into_session).collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Audit trail
    // ─────────────────────────────────────────────────────────────────────

    /// Append one audit event for a session.
    #[instrument(skip(self, event), fields(session_id = %event.session_id, kind = %event.kind))]
    pub fn append_event(&self, event: &CallEvent) -> Result<String> {
        let session_id = event.session_id.as_str().to_string();
        let kind = event.kind.as_str().to_string();
        let timestamp = event.timestamp.to_rfc3339();
        let data = serde_json::to_string(&event.data)
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        self.with_session_write_lock(&session_id, || {
            let conn = self.conn()?;
            CallEventRepo::append(&conn, &session_id, &kind, &timestamp, &data)
        })
    }

    /// All audit events for a session, oldest first.
    pub fn list_events(&self, session_id: &SessionId) -> Result<Vec<CallEvent>> {
        let conn = self.conn()?;
        let rows = CallEventRepo::list_by_session(&conn, session_id.as_str())?;
        rows.into_iter()
            .map(|row| {
                let kind = CallEventKind::from_str(&row.kind)
                    .map_err(|_| StoreError::Internal(format!("unknown event kind {}", row.kind)))?;
                let timestamp = parse_rfc3339(&row.timestamp)?;
                let data = serde_json::from_str(&row.data)
                    .map_err(|e| StoreError::Internal(e.to_string()))?;
                Ok(CallEvent {
                    session_id: SessionId::from(row.session_id),
                    kind,
                    timestamp,
                    data,
                })
            })
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Device tokens
    // ─────────────────────────────────────────────────────────────────────

    /// Register (or refresh) a push token for an operator.
    pub fn register_device_token(
        &self,
        token: &str,
        owner_id: &str,
        environment: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.retry_on_sqlite_busy(|| {
            let conn = self.conn()?;
            DeviceTokenRepo::register(&conn, token, owner_id, environment, &now)
        })
    }

    /// Remove a push token. Returns whether it existed.
    pub fn unregister_device_token(&self, token: &str) -> Result<bool> {
        self.retry_on_sqlite_busy(|| {
            let conn = self.conn()?;
            DeviceTokenRepo::unregister(&conn, token)
        })
    }

    /// Active push tokens for one operator.
    pub fn active_device_tokens(&self, owner_id: &str) -> Result<Vec<DeviceTokenRow>> {
        let conn = self.conn()?;
        DeviceTokenRepo::get_active_for_owner(&conn, owner_id)
    }

    /// Deactivate a token after a permanent delivery failure.
    pub fn mark_device_token_invalid(&self, token: &str) -> Result<()> {
        self.retry_on_sqlite_busy(|| {
            let conn = self.conn()?;
            DeviceTokenRepo::mark_invalid(&conn, token)
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Retention
    // ─────────────────────────────────────────────────────────────────────

    /// Delete ended sessions and audit events older than `retention_days`.
    /// Returns (sessions removed, events removed).
    #[instrument(skip(self))]
    pub fn prune(&self, retention_days: u32) -> Result<(usize, usize)> {
        let cutoff =
            (chrono::Utc::now() - chrono::Duration::days(i64::from(retention_days))).to_rfc3339();
        self.retry_on_sqlite_busy(|| {
            let conn = self.conn()?;
            let sessions = SessionRepo::delete_ended_before(&conn, &cutoff)?;
            let events = CallEventRepo::delete_before(&conn, &cutoff)?;
            Ok((sessions, events))
        })
    }
}

fn parse_rfc3339(value: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&chrono::Utc))
        .map_err(|e| StoreError::Internal(format!("bad timestamp {value}: {e}")))
}

fn row_into_session(row: SessionRow) -> Result<CallSession> {
    let status = CallStatus::from_str(&row.status)
        .map_err(|()| StoreError::Internal(format!("unknown status {}", row.status)))?;
    let metadata = serde_json::from_str(&row.metadata)
        .map_err(|e| StoreError::Internal(e.to_string()))?;
    Ok(CallSession {
        session_id: SessionId::from(row.id),
        user_id: UserId::from(row.user_id),
        owner_id: row.owner_id.map(halo_core::ids::OperatorId::from),
        domain: row.domain,
        page_url: row.page_url,
        status,
        started_at: parse_rfc3339(&row.started_at)?,
        escalated_at: row.escalated_at.as_deref().map(parse_rfc3339).transpose()?,
        ai_ended_at: row.ai_ended_at.as_deref().map(parse_rfc3339).transpose()?,
        connected_socket_ids: std::collections::HashSet::new(),
        metadata,
    })
}

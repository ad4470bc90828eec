//! Live session registry — the single source of truth for in-flight calls.
//!
//! All state lives in one synchronous `RwLock<HashMap>`; nothing in here
//! ever awaits, so registry mutations cannot interleave with each other or
//! block on storage. Durability is write-behind: every mutation enqueues a
//! mirror write and moves on.
//!
//! Scaling note: this map is per-process. Running more than one backend
//! instance requires sticky routing upstream; the registry does not (and
//! deliberately will not) paper over that.

use std::collections::HashMap;

use metrics::gauge;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use halo_core::call::{CallSession, CallSessionPatch, CallStatus};
use halo_core::errors::{HaloError, Result};
use halo_core::ids::{SessionId, SocketId};
use halo_store::WriteBehindQueue;

/// In-memory registry of live call sessions.
pub struct SessionRegistry {
    live: RwLock<HashMap<SessionId, CallSession>>,
    queue: WriteBehindQueue,
}

impl SessionRegistry {
    pub fn new(queue: WriteBehindQueue) -> Self {
        Self {
            live: RwLock::new(HashMap::new()),
            queue,
        }
    }

    /// Register a new session. The session ID is the idempotency key; a
    /// second create with the same ID is a conflict, not an overwrite.
    pub fn create(&self, session: CallSession) -> Result<()> {
        let session_id = session.session_id.clone();
        {
            let mut live = self.live.write();
            if live.contains_key(&session_id) {
                return Err(HaloError::Conflict(format!(
                    "session {session_id} already exists"
                )));
            }
            let _ = live.insert(session_id.clone(), session.clone());
            gauge!("halo_sessions_live").set(live.len() as f64);
        }
        self.queue.mirror(&session);
        info!(session_id = %session_id, domain = %session.domain, "session created");
        Ok(())
    }

    /// Snapshot of one live session. `None` means not live — callers treat
    /// an absent session as ended.
    pub fn get(&self, session_id: &SessionId) -> Option<CallSession> {
        self.live.read().get(session_id).cloned()
    }

    /// Merge a partial update into a live session.
    ///
    /// Unknown IDs are a no-op (`Ok(None)`); a status change that is not a
    /// legal forward transition is refused.
    pub fn update(
        &self,
        session_id: &SessionId,
        patch: CallSessionPatch,
    ) -> Result<Option<CallSession>> {
        let updated = {
            let mut live = self.live.write();
            let Some(session) = live.get_mut(session_id) else {
                debug!(session_id = %session_id, "update for unknown session ignored");
                return Ok(None);
            };
            if let Some(next) = patch.status {
                if !session.status.can_transition_to(next) {
                    return Err(HaloError::Conflict(format!(
                        "illegal transition {} -> {next}",
                        session.status
                    )));
                }
            }
            session.apply(patch);
            session.clone()
        };
        self.queue.mirror(&updated);
        Ok(Some(updated))
    }

    /// Merge a patch only if the session is currently in `expected` status.
    ///
    /// The check and the mutation happen under one write lock, so exactly
    /// one of two racing callers can win.
    pub fn update_if_status(
        &self,
        session_id: &SessionId,
        expected: CallStatus,
        patch: CallSessionPatch,
    ) -> Result<CallSession> {
        let updated = {
            let mut live = self.live.write();
            let Some(session) = live.get_mut(session_id) else {
                return Err(HaloError::NotFound(format!("session {session_id}")));
            };
            if session.status != expected {
                return Err(HaloError::Conflict(format!(
                    "session {session_id} is {}, expected {expected}",
                    session.status
                )));
            }
            if let Some(next) = patch.status {
                if !expected.can_transition_to(next) {
                    return Err(HaloError::Conflict(format!(
                        "illegal transition {expected} -> {next}"
                    )));
                }
            }
            session.apply(patch);
            session.clone()
        };
        self.queue.mirror(&updated);
        Ok(updated)
    }

    /// Record a signaling socket joining the session. Relay use only.
    pub fn add_socket(&self, session_id: &SessionId, socket_id: SocketId) -> bool {
        let mut live = self.live.write();
        match live.get_mut(session_id) {
            Some(session) => session.connected_socket_ids.insert(socket_id),
            None => false,
        }
    }

    /// Record a signaling socket leaving the session. Relay use only.
    pub fn remove_socket(&self, session_id: &SessionId, socket_id: &SocketId) -> bool {
        let mut live = self.live.write();
        match live.get_mut(session_id) {
            Some(session) => session.connected_socket_ids.remove(socket_id),
            None => false,
        }
    }

    /// End a session: drop it from the live map and write the terminal
    /// durable record. Absent sessions are `NotFound` — ending twice is
    /// the first caller's win.
    pub fn end(
        &self,
        session_id: &SessionId,
        reason: &str,
        duration_secs: Option<i64>,
    ) -> Result<CallSession> {
        let mut removed = {
            let mut live = self.live.write();
            let session = live
                .remove(session_id)
                .ok_or_else(|| HaloError::NotFound(format!("session {session_id}")))?;
            gauge!("halo_sessions_live").set(live.len() as f64);
            session
        };

        let ended_at = chrono::Utc::now();
        let duration = duration_secs
            .unwrap_or_else(|| (ended_at - removed.started_at).num_seconds().max(0));
        removed.status = CallStatus::Ended;
        if removed.ai_ended_at.is_none() {
            removed.ai_ended_at = Some(ended_at);
        }

        self.queue.mirror(&removed);
        self.queue
            .session_ended(session_id.clone(), ended_at, reason, duration);
        info!(session_id = %session_id, reason, duration, "session ended");
        Ok(removed)
    }

    /// Live sessions, optionally filtered by domain, newest first.
    pub fn active(&self, domain: Option<&str>, limit: usize) -> (Vec<CallSession>, usize) {
        let live = self.live.read();
        let mut matching: Vec<CallSession> = live
            .values()
            .filter(|s| domain.is_none_or(|d| s.domain == d))
            .cloned()
            .collect();
        let total = matching.len();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        matching.truncate(limit);
        (matching, total)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.live.read().len()
    }

    /// Whether no sessions are live.
    pub fn is_empty(&self) -> bool {
        self.live.read().is_empty()
    }

    /// Enqueue an audit event alongside the live mutation that caused it.
    pub fn audit(&self, event: halo_core::audit::CallEvent) {
        self.queue.append_event(event);
    }

    /// Log a warning for a mutation attempt on a non-live session. Used by
    /// the relay so dangling sockets surface in logs.
    pub fn warn_not_live(&self, session_id: &SessionId, action: &str) {
        warn!(session_id = %session_id, action, "session not live");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use halo_core::ids::{OperatorId, UserId};
    use serde_json::json;

    fn registry() -> (SessionRegistry, std::sync::Arc<halo_store::CallStore>) {
        let store = halo_store::open_in_memory().unwrap();
        let (queue, _failures) = halo_store::spawn_writer(std::sync::Arc::clone(&store), 256, 1);
        (SessionRegistry::new(queue), store)
    }

    fn session(id: &str) -> CallSession {
        CallSession::new(
            SessionId::new(id),
            UserId::new("user_1"),
            "shop.example.com",
            "https://shop.example.com/checkout",
            json!({}),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_then_get() {
        let (registry, _store) = registry();
        registry.create(session("sess_a")).unwrap();
        let live = registry.get(&SessionId::new("sess_a")).unwrap();
        assert_eq!(live.status, CallStatus::Ai);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_create_is_conflict() {
        let (registry, _store) = registry();
        registry.create(session("sess_a")).unwrap();
        let err = registry.create(session("sess_a")).unwrap_err();
        assert_eq!(err.class(), "conflict");
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_unknown_is_noop() {
        let (registry, _store) = registry();
        let result = registry
            .update(&SessionId::new("sess_missing"), CallSessionPatch::default())
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_refuses_illegal_transition() {
        let (registry, _store) = registry();
        registry.create(session("sess_a")).unwrap();
        let err = registry
            .update(
                &SessionId::new("sess_a"),
                CallSessionPatch {
                    status: Some(CallStatus::Human),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.class(), "conflict");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_if_status_lets_exactly_one_win() {
        let (registry, _store) = registry();
        let mut s = session("sess_a");
        s.status = CallStatus::Escalating;
        s.owner_id = Some(OperatorId::new("op_1"));
        registry.create(s).unwrap();

        let patch = CallSessionPatch {
            status: Some(CallStatus::Human),
            ..Default::default()
        };
        let first = registry.update_if_status(
            &SessionId::new("sess_a"),
            CallStatus::Escalating,
            patch.clone(),
        );
        let second = registry.update_if_status(
            &SessionId::new("sess_a"),
            CallStatus::Escalating,
            patch,
        );
        assert!(first.is_ok());
        assert_eq!(second.unwrap_err().class(), "conflict");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn socket_membership_tracked() {
        let (registry, _store) = registry();
        registry.create(session("sess_a")).unwrap();
        let sid = SessionId::new("sess_a");
        let sock = SocketId::new("sock_1");

        assert!(registry.add_socket(&sid, sock.clone()));
        assert!(!registry.add_socket(&sid, sock.clone()));
        assert_eq!(registry.get(&sid).unwrap().connected_socket_ids.len(), 1);
        assert!(registry.remove_socket(&sid, &sock));
        assert!(!registry.remove_socket(&sid, &sock));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn end_removes_from_live_map() {
        let (registry, store) = registry();
        registry.create(session("sess_a")).unwrap();
        let ended = registry
            .end(&SessionId::new("sess_a"), "user_hangup", Some(42))
            .unwrap();
        assert_eq!(ended.status, CallStatus::Ended);
        assert!(registry.get(&SessionId::new("sess_a")).is_none());

        // Second end: the session is gone.
        let err = registry
            .end(&SessionId::new("sess_a"), "again", None)
            .unwrap_err();
        assert_eq!(err.class(), "not_found");
        drop(store);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn active_filters_by_domain() {
        let (registry, _store) = registry();
        registry.create(session("sess_a")).unwrap();
        let mut other = session("sess_b");
        other.domain = "blog.example.org".into();
        registry.create(other).unwrap();

        let (calls, total) = registry.active(Some("shop.example.com"), 10);
        assert_eq!(total, 1);
        assert_eq!(calls[0].session_id, SessionId::new("sess_a"));

        let (all, all_total) = registry.active(None, 1);
        assert_eq!(all_total, 2);
        assert_eq!(all.len(), 1);
    }
}

//! Escalation coordinator — AI→human hand-off and call end.
//!
//! Ordering rule for every mutation here: the audit event is written
//! durably first, and live state changes only after that write succeeds.
//! A store failure therefore leaves the call exactly where it was, and the
//! caller gets a retryable upstream error.
//!
//! `escalate` is re-entrant (a session already escalating or human returns
//! the existing assignment), and racing `accept`s are settled by the
//! registry's compare-and-set: exactly one operator wins, the rest see a
//! conflict to reconcile.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde_json::json;
use tracing::{info, instrument, warn};

use halo_core::audit::{CallEvent, CallEventKind};
use halo_core::call::{CallSession, CallSessionPatch, CallStatus};
use halo_core::errors::{HaloError, Result};
use halo_core::ids::{OperatorId, SessionId};
use halo_core::notify::NotificationEvent;
use halo_store::CallStore;

use crate::push::NotificationTrigger;
use crate::registry::SessionRegistry;

/// A domain's resolved owner.
#[derive(Clone, Debug)]
pub struct OwnershipRecord {
    pub owner_id: OperatorId,
    /// Only verified owners receive calls.
    pub verified: bool,
}

/// Domain-ownership collaborator.
#[async_trait]
pub trait DomainOwnership: Send + Sync {
    /// Look up who owns a domain. `None` means nobody registered it.
    async fn verify(&self, domain: &str) -> Result<Option<OwnershipRecord>>;
}

/// One operator's current availability.
#[derive(Clone, Copy, Debug, Default)]
pub struct PresenceStatus {
    pub online: bool,
    pub accepting_calls: bool,
}

/// Presence collaborator. Best-effort: readings may be stale by the time
/// anyone acts on them, and a lookup failure is treated as offline.
#[async_trait]
pub trait Presence: Send + Sync {
    async fn get(&self, owner_id: &OperatorId) -> Result<PresenceStatus>;
}

/// What `escalate` reports back to the tab.
#[derive(Clone, Debug)]
pub struct EscalationOutcome {
    pub owner_id: OperatorId,
    /// Presence at decision time; may already be stale.
    pub owner_online: bool,
}

/// Coordinates hand-off and end-of-call across the registry, the durable
/// store, and the collaborator services.
pub struct EscalationCoordinator {
    registry: Arc<SessionRegistry>,
    store: Arc<CallStore>,
    ownership: Arc<dyn DomainOwnership>,
    presence: Arc<dyn Presence>,
    trigger: Arc<NotificationTrigger>,
}

impl EscalationCoordinator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        store: Arc<CallStore>,
        ownership: Arc<dyn DomainOwnership>,
        presence: Arc<dyn Presence>,
        trigger: Arc<NotificationTrigger>,
    ) -> Self {
        Self {
            registry,
            store,
            ownership,
            presence,
            trigger,
        }
    }

    /// Request a hand-off to the domain's owner.
    ///
    /// Re-entrant: if the session is already escalating (or human), the
    /// existing assignment is returned and no second notification goes out.
    #[instrument(skip(self, reason), fields(session_id = %session_id))]
    pub async fn escalate(&self, session_id: &SessionId, reason: &str) -> Result<EscalationOutcome> {
        let session = self
            .registry
            .get(session_id)
            .ok_or_else(|| HaloError::NotFound(format!("session {session_id}")))?;

        if matches!(session.status, CallStatus::Escalating | CallStatus::Human) {
            let owner_id = session.owner_id.clone().ok_or_else(|| {
                HaloError::Internal(format!("session {session_id} escalated with no owner"))
            })?;
            let online = self.presence_or_offline(&owner_id).await.online;
            return Ok(EscalationOutcome {
                owner_id,
                owner_online: online,
            });
        }

        let record = self
            .ownership
            .verify(&session.domain)
            .await?
            .filter(|r| r.verified)
            .ok_or_else(|| {
                HaloError::Forbidden(format!("domain {} has no verified owner", session.domain))
            })?;
        let owner_id = record.owner_id;

        let presence = self.presence_or_offline(&owner_id).await;

        // Audit first; live state moves only after the write lands.
        self.append_event(CallEvent::now(
            session_id.clone(),
            CallEventKind::EscalationRequested,
            json!({ "reason": reason, "ownerId": owner_id.as_str() }),
        ))
        .await?;

        let now = chrono::Utc::now();
        let patch = CallSessionPatch {
            status: Some(CallStatus::Escalating),
            owner_id: Some(owner_id.clone()),
            escalated_at: Some(now),
            ai_ended_at: Some(now),
            ..Default::default()
        };
        match self
            .registry
            .update_if_status(session_id, CallStatus::Ai, patch)
        {
            Ok(_) => {}
            // A racing escalate won between our read and our write; fall
            // back to the re-entrant path.
            Err(HaloError::Conflict(_)) => {
                return Box::pin(self.escalate(session_id, reason)).await;
            }
            Err(e) => return Err(e),
        }

        counter!("halo_escalations_total").increment(1);
        info!(owner_id = %owner_id, online = presence.online, "escalation requested");

        if presence.online && presence.accepting_calls {
            let event = NotificationEvent::escalation_requested(
                owner_id.clone(),
                session_id,
                &session.domain,
                reason,
            );
            let trigger = Arc::clone(&self.trigger);
            let _notify = tokio::spawn(async move { trigger.notify(event).await });
        }

        Ok(EscalationOutcome {
            owner_id,
            owner_online: presence.online,
        })
    }

    /// Operator accepts a pending hand-off. Exactly one of two racing
    /// accepts wins; presence is not re-validated here.
    #[instrument(skip(self), fields(session_id = %session_id, operator_id = %operator_id))]
    pub async fn accept(
        &self,
        session_id: &SessionId,
        operator_id: &OperatorId,
    ) -> Result<CallSession> {
        let session = self
            .registry
            .get(session_id)
            .ok_or_else(|| HaloError::NotFound(format!("session {session_id}")))?;

        match session.status {
            CallStatus::Ai => {
                return Err(HaloError::Conflict(format!(
                    "session {session_id} has not been escalated"
                )));
            }
            CallStatus::Human => {
                return Err(HaloError::Conflict(format!(
                    "session {session_id} was already accepted"
                )));
            }
            CallStatus::Escalating | CallStatus::Ended => {}
        }

        if session.owner_id.as_ref() != Some(operator_id) {
            return Err(HaloError::Forbidden(format!(
                "operator {operator_id} is not the assignee for {session_id}"
            )));
        }

        self.append_event(CallEvent::now(
            session_id.clone(),
            CallEventKind::EscalationAccepted,
            json!({ "operatorId": operator_id.as_str() }),
        ))
        .await?;

        let accepted = self.registry.update_if_status(
            session_id,
            CallStatus::Escalating,
            CallSessionPatch {
                status: Some(CallStatus::Human),
                ..Default::default()
            },
        )?;

        self.trigger.clear_pending(session_id);
        counter!("halo_accepts_total").increment(1);
        info!("hand-off accepted");
        Ok(accepted)
    }

    /// End a call from any state. The terminal audit event is written
    /// before the session leaves the live map; if that write fails the
    /// session stays live and the caller retries.
    #[instrument(skip(self), fields(session_id = %session_id, reason))]
    pub async fn end(
        &self,
        session_id: &SessionId,
        reason: &str,
        duration_secs: Option<i64>,
    ) -> Result<CallSession> {
        let session = self
            .registry
            .get(session_id)
            .ok_or_else(|| HaloError::NotFound(format!("session {session_id}")))?;

        self.append_event(CallEvent::now(
            session_id.clone(),
            CallEventKind::CallEnded,
            json!({ "reason": reason }),
        ))
        .await?;

        let ended = self.registry.end(session_id, reason, duration_secs)?;
        counter!("halo_calls_ended_total").increment(1);

        if let Some(owner_id) = session.owner_id {
            let event = NotificationEvent::call_ended(owner_id, session_id, &session.domain);
            let trigger = Arc::clone(&self.trigger);
            let _notify = tokio::spawn(async move { trigger.notify(event).await });
        }

        Ok(ended)
    }

    async fn presence_or_offline(&self, owner_id: &OperatorId) -> PresenceStatus {
        match self.presence.get(owner_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!(owner_id = %owner_id, error = %e, "presence lookup failed, treating as offline");
                PresenceStatus::default()
            }
        }
    }

    /// Durable audit append; failures map to a retryable upstream error.
    async fn append_event(&self, event: CallEvent) -> Result<()> {
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || store.append_event(&event)).await;
        match result {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(HaloError::upstream_retryable(format!(
                "audit write failed: {e}"
            ))),
            Err(e) => Err(HaloError::Internal(format!("audit task failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::delivery::{NotificationDelivery, PushSendResult};
    use assert_matches::assert_matches;
    use halo_core::ids::UserId;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    struct FakeOwnership {
        record: Option<OwnershipRecord>,
    }

    #[async_trait]
    impl DomainOwnership for FakeOwnership {
        async fn verify(&self, _domain: &str) -> Result<Option<OwnershipRecord>> {
            Ok(self.record.clone())
        }
    }

    struct FakePresence {
        status: PresenceStatus,
    }

    #[async_trait]
    impl Presence for FakePresence {
        async fn get(&self, _owner_id: &OperatorId) -> Result<PresenceStatus> {
            Ok(self.status)
        }
    }

    #[derive(Default)]
    struct RecordingDelivery {
        sent: Mutex<Vec<NotificationEvent>>,
    }

    #[async_trait]
    impl NotificationDelivery for RecordingDelivery {
        async fn send(&self, tokens: &[String], event: &NotificationEvent) -> Vec<PushSendResult> {
            self.sent.lock().push(event.clone());
            tokens
                .iter()
                .map(|t| PushSendResult {
                    token: t.clone(),
                    success: true,
                    status_code: Some(200),
                    reason: None,
                    permanent_failure: false,
                    error: None,
                })
                .collect()
        }
    }

    struct Harness {
        coordinator: EscalationCoordinator,
        registry: Arc<SessionRegistry>,
        store: Arc<CallStore>,
        delivery: Arc<RecordingDelivery>,
    }

    fn harness(owner: Option<(&str, bool)>, presence: PresenceStatus) -> Harness {
        let store = halo_store::open_in_memory().unwrap();
        store
            .register_device_token("tok_1", "op_1", "production")
            .unwrap();
        let (queue, _failures) = halo_store::spawn_writer(Arc::clone(&store), 256, 1);
        let registry = Arc::new(SessionRegistry::new(queue));
        let delivery = Arc::new(RecordingDelivery::default());
        let trigger = Arc::new(NotificationTrigger::new(
            Arc::clone(&store),
            delivery.clone() as Arc<dyn NotificationDelivery>,
        ));
        let coordinator = EscalationCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::new(FakeOwnership {
                record: owner.map(|(id, verified)| OwnershipRecord {
                    owner_id: OperatorId::new(id),
                    verified,
                }),
            }),
            Arc::new(FakePresence { status: presence }),
            trigger,
        );
        Harness {
            coordinator,
            registry,
            store,
            delivery,
        }
    }

    fn online() -> PresenceStatus {
        PresenceStatus {
            online: true,
            accepting_calls: true,
        }
    }

    fn start_session(registry: &SessionRegistry, id: &str) -> SessionId {
        let session = CallSession::new(
            SessionId::new(id),
            UserId::new("user_1"),
            "shop.example.com",
            "https://shop.example.com/checkout",
            json!({}),
        );
        registry.create(session).unwrap();
        SessionId::new(id)
    }

    async fn drain_notifications(h: &Harness) {
        // Notification send is fire-and-forget; give the task time to land.
        for _ in 0..100 {
            if !h.delivery.sent.lock().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn escalate_assigns_owner_and_notifies() {
        let h = harness(Some(("op_1", true)), online());
        let sid = start_session(&h.registry, "sess_a");

        let outcome = h.coordinator.escalate(&sid, "refund question").await.unwrap();
        assert_eq!(outcome.owner_id, OperatorId::new("op_1"));
        assert!(outcome.owner_online);

        let live = h.registry.get(&sid).unwrap();
        assert_eq!(live.status, CallStatus::Escalating);
        assert_eq!(live.owner_id, Some(OperatorId::new("op_1")));
        assert!(live.escalated_at.is_some());

        drain_notifications(&h).await;
        let sent = h.delivery.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "refund question");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn escalate_is_reentrant() {
        let h = harness(Some(("op_1", true)), online());
        let sid = start_session(&h.registry, "sess_a");

        let first = h.coordinator.escalate(&sid, "first").await.unwrap();
        let second = h.coordinator.escalate(&sid, "second").await.unwrap();
        assert_eq!(first.owner_id, second.owner_id);
        assert_eq!(h.registry.get(&sid).unwrap().status, CallStatus::Escalating);

        // No second notification went out for the same pending hand-off.
        drain_notifications(&h).await;
        assert_eq!(h.delivery.sent.lock().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn escalate_unknown_session_is_not_found() {
        let h = harness(Some(("op_1", true)), online());
        let err = h
            .coordinator
            .escalate(&SessionId::new("sess_missing"), "x")
            .await
            .unwrap_err();
        assert_matches!(err, HaloError::NotFound(_));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unverified_owner_is_forbidden() {
        let h = harness(Some(("op_1", false)), online());
        let sid = start_session(&h.registry, "sess_a");
        let err = h.coordinator.escalate(&sid, "x").await.unwrap_err();
        assert_matches!(err, HaloError::Forbidden(_));
        // State untouched.
        assert_eq!(h.registry.get(&sid).unwrap().status, CallStatus::Ai);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_owner_still_escalates_without_notification() {
        let h = harness(Some(("op_1", true)), PresenceStatus::default());
        let sid = start_session(&h.registry, "sess_a");

        let outcome = h.coordinator.escalate(&sid, "x").await.unwrap();
        assert!(!outcome.owner_online);
        assert_eq!(h.registry.get(&sid).unwrap().status, CallStatus::Escalating);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.delivery.sent.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn accept_flips_to_human_exactly_once() {
        let h = harness(Some(("op_1", true)), online());
        let sid = start_session(&h.registry, "sess_a");
        h.coordinator.escalate(&sid, "x").await.unwrap();

        let op = OperatorId::new("op_1");
        let won = h.coordinator.accept(&sid, &op).await.unwrap();
        assert_eq!(won.status, CallStatus::Human);

        let lost = h.coordinator.accept(&sid, &op).await.unwrap_err();
        assert_matches!(lost, HaloError::Conflict(_));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn accept_by_wrong_operator_is_forbidden() {
        let h = harness(Some(("op_1", true)), online());
        let sid = start_session(&h.registry, "sess_a");
        h.coordinator.escalate(&sid, "x").await.unwrap();

        let err = h
            .coordinator
            .accept(&sid, &OperatorId::new("op_intruder"))
            .await
            .unwrap_err();
        assert_matches!(err, HaloError::Forbidden(_));
        assert_eq!(h.registry.get(&sid).unwrap().status, CallStatus::Escalating);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn accept_before_escalate_is_conflict() {
        let h = harness(Some(("op_1", true)), online());
        let sid = start_session(&h.registry, "sess_a");
        let err = h
            .coordinator
            .accept(&sid, &OperatorId::new("op_1"))
            .await
            .unwrap_err();
        assert_matches!(err, HaloError::Conflict(_));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn end_writes_audit_before_removal() {
        let h = harness(Some(("op_1", true)), online());
        let sid = start_session(&h.registry, "sess_a");

        let ended = h.coordinator.end(&sid, "user_hangup", Some(33)).await.unwrap();
        assert_eq!(ended.status, CallStatus::Ended);
        assert!(h.registry.get(&sid).is_none());

        let events = h.store.list_events(&sid).unwrap();
        assert!(events.iter().any(|e| e.kind == CallEventKind::CallEnded));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn end_from_any_state_is_absorbing() {
        let h = harness(Some(("op_1", true)), online());
        let sid = start_session(&h.registry, "sess_a");
        h.coordinator.escalate(&sid, "x").await.unwrap();
        h.coordinator
            .accept(&sid, &OperatorId::new("op_1"))
            .await
            .unwrap();

        assert!(h.coordinator.end(&sid, "done", None).await.is_ok());
        let err = h.coordinator.end(&sid, "again", None).await.unwrap_err();
        assert_matches!(err, HaloError::NotFound(_));
    }
}

//! Notification trigger — decides, dedupes, delivers, prunes.
//!
//! Sits between the escalation coordinator and the push transport. One
//! escalation produces at most one outstanding notification per session:
//! the dedupe tag is recorded as pending when the hand-off notification
//! goes out and cleared when the operator accepts, so a re-entrant
//! escalate cannot spam the operator's devices.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use halo_core::ids::SessionId;
use halo_core::notify::{NotificationEvent, NotificationKind};
use halo_store::CallStore;

use crate::push::delivery::NotificationDelivery;

/// Attempts per token batch; only transport failures are retried.
const SEND_ATTEMPTS: u32 = 3;

/// Fan-out orchestration over a [`NotificationDelivery`] transport.
pub struct NotificationTrigger {
    store: Arc<CallStore>,
    delivery: Arc<dyn NotificationDelivery>,
    pending: Mutex<HashSet<String>>,
}

impl NotificationTrigger {
    pub fn new(store: Arc<CallStore>, delivery: Arc<dyn NotificationDelivery>) -> Self {
        Self {
            store,
            delivery,
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// Deliver one event to every active device of the target operator.
    ///
    /// Duplicate events (same dedupe tag while one is pending) are
    /// suppressed. Delivery is best-effort: failures are logged and
    /// counted, never surfaced to the call path.
    #[instrument(skip(self, event), fields(kind = event.kind.as_str(), owner_id = %event.owner_id))]
    pub async fn notify(&self, event: NotificationEvent) {
        {
            let mut pending = self.pending.lock();
            if pending.contains(&event.dedupe_tag) {
                debug!(tag = %event.dedupe_tag, "duplicate notification suppressed");
                counter!("halo_push_suppressed_total").increment(1);
                return;
            }
            // Only hand-off requests stay pending; they are cleared by
            // accept. Other kinds dedupe solely against an in-flight send.
            if event.kind == NotificationKind::EscalationRequested {
                let _ = pending.insert(event.dedupe_tag.clone());
            }
        }

        let store = Arc::clone(&self.store);
        let owner = event.owner_id.as_str().to_string();
        let tokens = match tokio::task::spawn_blocking(move || store.active_device_tokens(&owner))
            .await
        {
            Ok(Ok(rows)) => rows.into_iter().map(|r| r.token).collect::<Vec<_>>(),
            Ok(Err(e)) => {
                warn!(error = %e, "device token lookup failed");
                counter!("halo_push_failures_total", "stage" => "token_lookup").increment(1);
                return;
            }
            Err(e) => {
                warn!(error = %e, "device token lookup task failed");
                return;
            }
        };

        if tokens.is_empty() {
            debug!("operator has no active devices");
            return;
        }

        let mut remaining = tokens;
        for attempt in 0..SEND_ATTEMPTS {
            let results = self.delivery.send(&remaining, &event).await;

            let mut retry = Vec::new();
            for result in results {
                if result.success {
                    counter!("halo_push_sent_total").increment(1);
                } else if result.permanent_failure {
                    counter!("halo_push_failures_total", "stage" => "rejected").increment(1);
                    self.prune_token(result.token).await;
                } else if result.is_transient() {
                    retry.push(result.token);
                } else {
                    counter!("halo_push_failures_total", "stage" => "gateway").increment(1);
                    warn!(status = ?result.status_code, reason = ?result.reason, "push rejected");
                }
            }

            if retry.is_empty() {
                return;
            }
            remaining = retry;
            if attempt + 1 < SEND_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt + 1))).await;
            }
        }

        counter!("halo_push_failures_total", "stage" => "transport").increment(1);
        warn!(tokens = remaining.len(), "push delivery gave up after retries");
    }

    /// Clear the pending hand-off notification for a session. Called when
    /// the operator accepts.
    pub fn clear_pending(&self, session_id: &SessionId) {
        let tag = NotificationEvent::dedupe_tag_for(NotificationKind::EscalationRequested, session_id);
        if self.pending.lock().remove(&tag) {
            info!(session_id = %session_id, "pending hand-off notification cleared");
        }
    }

    /// Whether a hand-off notification is pending for the session.
    pub fn has_pending(&self, session_id: &SessionId) -> bool {
        let tag = NotificationEvent::dedupe_tag_for(NotificationKind::EscalationRequested, session_id);
        self.pending.lock().contains(&tag)
    }

    async fn prune_token(&self, token: String) {
        let store = Arc::clone(&self.store);
        let prefix = halo_core::text::truncate_str(&token, 8).to_string();
        let result =
            tokio::task::spawn_blocking(move || store.mark_device_token_invalid(&token)).await;
        match result {
            Ok(Ok(())) => info!(token_prefix = %prefix, "stale device token pruned"),
            Ok(Err(e)) => warn!(error = %e, "failed to prune device token"),
            Err(e) => warn!(error = %e, "prune task failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::delivery::PushSendResult;
    use async_trait::async_trait;
    use halo_core::ids::OperatorId;

    /// Records every batch it is asked to send and replies per a script.
    struct ScriptedDelivery {
        batches: Mutex<Vec<Vec<String>>>,
        script: Box<dyn Fn(&str, usize) -> PushSendResult + Send + Sync>,
    }

    impl ScriptedDelivery {
        fn new(script: impl Fn(&str, usize) -> PushSendResult + Send + Sync + 'static) -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                script: Box::new(script),
            }
        }

        fn ok(token: &str) -> PushSendResult {
            PushSendResult {
                token: token.to_string(),
                success: true,
                status_code: Some(200),
                reason: None,
                permanent_failure: false,
                error: None,
            }
        }

        fn unregistered(token: &str) -> PushSendResult {
            PushSendResult {
                token: token.to_string(),
                success: false,
                status_code: Some(410),
                reason: Some("Unregistered".into()),
                permanent_failure: true,
                error: None,
            }
        }
    }

    #[async_trait]
    impl NotificationDelivery for ScriptedDelivery {
        async fn send(&self, tokens: &[String], _event: &NotificationEvent) -> Vec<PushSendResult> {
            let attempt = {
                let mut batches = self.batches.lock();
                batches.push(tokens.to_vec());
                batches.len() - 1
            };
            tokens.iter().map(|t| (self.script)(t, attempt)).collect()
        }
    }

    fn event(session: &str) -> NotificationEvent {
        NotificationEvent::escalation_requested(
            OperatorId::new("op_1"),
            &SessionId::new(session),
            "shop.example.com",
            "needs a human",
        )
    }

    fn store_with_tokens(tokens: &[&str]) -> Arc<CallStore> {
        let store = halo_store::open_in_memory().unwrap();
        for token in tokens {
            store
                .register_device_token(token, "op_1", "production")
                .unwrap();
        }
        store
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_escalation_is_suppressed_until_cleared() {
        let delivery = Arc::new(ScriptedDelivery::new(|t, _| ScriptedDelivery::ok(t)));
        let trigger = NotificationTrigger::new(store_with_tokens(&["tok_1"]), delivery.clone());

        trigger.notify(event("sess_a")).await;
        trigger.notify(event("sess_a")).await;
        assert_eq!(delivery.batches.lock().len(), 1);
        assert!(trigger.has_pending(&SessionId::new("sess_a")));

        trigger.clear_pending(&SessionId::new("sess_a"));
        assert!(!trigger.has_pending(&SessionId::new("sess_a")));
        trigger.notify(event("sess_a")).await;
        assert_eq!(delivery.batches.lock().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn permanent_failure_prunes_token() {
        let delivery = Arc::new(ScriptedDelivery::new(|t, _| {
            if t == "tok_dead" {
                ScriptedDelivery::unregistered(t)
            } else {
                ScriptedDelivery::ok(t)
            }
        }));
        let store = store_with_tokens(&["tok_dead", "tok_live"]);
        let trigger = NotificationTrigger::new(Arc::clone(&store), delivery);

        trigger.notify(event("sess_a")).await;

        let remaining = store.active_device_tokens("op_1").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].token, "tok_live");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transient_failures_are_retried() {
        let delivery = Arc::new(ScriptedDelivery::new(|t, attempt| {
            if attempt == 0 {
                PushSendResult {
                    token: t.to_string(),
                    success: false,
                    status_code: None,
                    reason: None,
                    permanent_failure: false,
                    error: Some("connection reset".into()),
                }
            } else {
                ScriptedDelivery::ok(t)
            }
        }));
        let trigger = NotificationTrigger::new(store_with_tokens(&["tok_1"]), delivery.clone());

        trigger.notify(event("sess_a")).await;
        assert_eq!(delivery.batches.lock().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn no_devices_is_a_quiet_noop() {
        let delivery = Arc::new(ScriptedDelivery::new(|t, _| ScriptedDelivery::ok(t)));
        let trigger = NotificationTrigger::new(store_with_tokens(&[]), delivery.clone());
        trigger.notify(event("sess_a")).await;
        assert!(delivery.batches.lock().is_empty());
    }
}

//! Pending tool-call tracker — routes provider results via oneshot channels.
//!
//! Keyed by the provider's correlation ID; at most one result is ever
//! delivered per ID. Dropping the tracker (or `cancel_all`) drops every
//! sender, which resolves outstanding waiters with a closed-channel error
//! rather than leaving them hanging. That is the whole cancellation story:
//! ending a call tears down all of its in-flight tool calls at once.

use std::collections::HashMap;

use tokio::sync::oneshot;

use halo_core::ids::CallId;
use halo_core::tools::ToolEnvelope;

/// Tracks in-flight tool calls for one conversation session.
#[derive(Default)]
pub struct ToolCallTracker {
    pending: HashMap<CallId, oneshot::Sender<ToolEnvelope>>,
}

impl ToolCallTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call, returning the receiver its result will arrive on.
    ///
    /// Re-registering an ID replaces the previous sender; the old waiter
    /// sees a closed channel.
    pub fn register(&mut self, call_id: &CallId) -> oneshot::Receiver<ToolEnvelope> {
        let (tx, rx) = oneshot::channel();
        let _ = self.pending.insert(call_id.clone(), tx);
        rx
    }

    /// Resolve a pending call. Returns `true` if it was found and the
    /// waiter was still listening.
    pub fn resolve(&mut self, call_id: &CallId, envelope: ToolEnvelope) -> bool {
        if let Some(tx) = self.pending.remove(call_id) {
            tx.send(envelope).is_ok()
        } else {
            false
        }
    }

    /// Whether a call is still in flight.
    pub fn has_pending(&self, call_id: &CallId) -> bool {
        self.pending.contains_key(call_id)
    }

    /// Number of in-flight calls.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop every pending sender; all waiters see a closed channel.
    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> CallId {
        CallId::new(s)
    }

    #[tokio::test]
    async fn resolve_delivers_envelope() {
        let mut tracker = ToolCallTracker::new();
        let rx = tracker.register(&id("tc_1"));

        assert!(tracker.resolve(&id("tc_1"), ToolEnvelope::ok()));
        assert!(rx.await.unwrap().success);
        assert!(!tracker.has_pending(&id("tc_1")));
    }

    #[test]
    fn resolve_unknown_returns_false() {
        let mut tracker = ToolCallTracker::new();
        assert!(!tracker.resolve(&id("tc_missing"), ToolEnvelope::ok()));
    }

    #[tokio::test]
    async fn at_most_one_result_per_call_id() {
        let mut tracker = ToolCallTracker::new();
        let rx = tracker.register(&id("tc_1"));

        assert!(tracker.resolve(&id("tc_1"), ToolEnvelope::err("first")));
        assert!(!tracker.resolve(&id("tc_1"), ToolEnvelope::err("second")));
        assert_eq!(rx.await.unwrap().error.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn cancel_all_closes_every_waiter() {
        let mut tracker = ToolCallTracker::new();
        let rx1 = tracker.register(&id("tc_1"));
        let rx2 = tracker.register(&id("tc_2"));
        assert_eq!(tracker.pending_count(), 2);

        tracker.cancel_all();
        assert_eq!(tracker.pending_count(), 0);
        assert!(rx1.await.is_err());
        assert!(rx2.await.is_err());
    }

    #[tokio::test]
    async fn reregister_replaces_previous_waiter() {
        let mut tracker = ToolCallTracker::new();
        let stale = tracker.register(&id("tc_1"));
        let fresh = tracker.register(&id("tc_1"));

        assert!(tracker.resolve(&id("tc_1"), ToolEnvelope::ok()));
        assert!(stale.await.is_err());
        assert!(fresh.await.unwrap().success);
    }
}

//! Operator notification payloads.
//!
//! Lifecycle events turn into push notifications for the operator who owns
//! the call's domain. Delivery is best-effort; the dedupe tag lets the
//! trigger clear a pending notification when the operator accepts.

use serde::{Deserialize, Serialize};

use crate::ids::{OperatorId, SessionId};

/// What kind of lifecycle event a notification reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A call started on one of the operator's domains.
    CallStarted,
    /// The AI requested a hand-off to this operator.
    EscalationRequested,
    /// A new message arrived in a call the operator is watching.
    NewMessage,
    /// A call ended.
    CallEnded,
}

impl NotificationKind {
    /// Stable string form, used in dedupe tags and metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CallStarted => "call_started",
            Self::EscalationRequested => "escalation_requested",
            Self::NewMessage => "new_message",
            Self::CallEnded => "call_ended",
        }
    }
}

/// Delivery priority hint for the push transport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    /// Deliver immediately (wakes the device).
    High,
    /// Deliver opportunistically.
    #[default]
    Normal,
}

/// One notification destined for an operator's devices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    /// Target operator.
    pub owner_id: OperatorId,
    /// Lifecycle event kind.
    pub kind: NotificationKind,
    /// Alert title.
    pub title: String,
    /// Alert body.
    pub body: String,
    /// Delivery priority.
    #[serde(default)]
    pub priority: NotificationPriority,
    /// Tag identifying the (kind, session) pair so a later event can
    /// supersede or clear a pending one.
    pub dedupe_tag: String,
}

impl NotificationEvent {
    /// The dedupe tag for a given kind and session.
    pub fn dedupe_tag_for(kind: NotificationKind, session_id: &SessionId) -> String {
        format!("{}:{}", kind.as_str(), session_id)
    }

    /// Build the hand-off request notification sent at escalation time.
    pub fn escalation_requested(
        owner_id: OperatorId,
        session_id: &SessionId,
        domain: &str,
        reason: &str,
    ) -> Self {
        Self {
            owner_id,
            kind: NotificationKind::EscalationRequested,
            title: format!("Caller needs help on {domain}"),
            body: reason.to_owned(),
            priority: NotificationPriority::High,
            dedupe_tag: Self::dedupe_tag_for(NotificationKind::EscalationRequested, session_id),
        }
    }

    /// Build the call-ended notification.
    pub fn call_ended(owner_id: OperatorId, session_id: &SessionId, domain: &str) -> Self {
        Self {
            owner_id,
            kind: NotificationKind::CallEnded,
            title: format!("Call ended on {domain}"),
            body: String::new(),
            priority: NotificationPriority::Normal,
            dedupe_tag: Self::dedupe_tag_for(NotificationKind::CallEnded, session_id),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_tag_is_stable() {
        let sid = SessionId::new("sess_1");
        assert_eq!(
            NotificationEvent::dedupe_tag_for(NotificationKind::EscalationRequested, &sid),
            "escalation_requested:sess_1"
        );
    }

    #[test]
    fn escalation_request_shape() {
        let n = NotificationEvent::escalation_requested(
            OperatorId::new("op_1"),
            &SessionId::new("sess_1"),
            "shop.example.com",
            "Customer asked for a refund",
        );
        assert_eq!(n.kind, NotificationKind::EscalationRequested);
        assert_eq!(n.priority, NotificationPriority::High);
        assert!(n.title.contains("shop.example.com"));
        assert_eq!(n.body, "Customer asked for a refund");
        assert_eq!(n.dedupe_tag, "escalation_requested:sess_1");
    }

    #[test]
    fn same_session_same_kind_same_tag() {
        let sid = SessionId::new("sess_1");
        let a = NotificationEvent::escalation_requested(
            OperatorId::new("op_1"),
            &sid,
            "a.example",
            "x",
        );
        let b = NotificationEvent::escalation_requested(
            OperatorId::new("op_1"),
            &sid,
            "a.example",
            "y",
        );
        assert_eq!(a.dedupe_tag, b.dedupe_tag);
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&NotificationKind::EscalationRequested).unwrap();
        assert_eq!(json, "\"escalation_requested\"");
    }

    #[test]
    fn event_serializes_camel_case() {
        let n = NotificationEvent::call_ended(
            OperatorId::new("op_1"),
            &SessionId::new("sess_1"),
            "a.example",
        );
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["ownerId"], "op_1");
        assert_eq!(json["dedupeTag"], "call_ended:sess_1");
        assert_eq!(json["priority"], "normal");
    }
}

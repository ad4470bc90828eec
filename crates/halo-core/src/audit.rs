//! Append-only call audit trail types.
//!
//! Every state-changing moment in a call's life is recorded as a
//! [`CallEvent`]. Rows are write-once — the only mutation the trail ever
//! sees is bulk retention cleanup in the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::SessionId;

/// Dotted event-type tags for the audit trail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallEventKind {
    /// Call created.
    #[serde(rename = "call.started")]
    CallStarted,
    /// Hand-off requested; operator resolved and assigned.
    #[serde(rename = "call.escalation_requested")]
    EscalationRequested,
    /// Operator accepted; call is now human-handled.
    #[serde(rename = "call.escalation_accepted")]
    EscalationAccepted,
    /// Call reached its terminal state.
    #[serde(rename = "call.ended")]
    CallEnded,
    /// A signaling socket joined the session's room.
    #[serde(rename = "signal.socket_joined")]
    SocketJoined,
    /// A signaling socket left (or its transport dropped).
    #[serde(rename = "signal.socket_left")]
    SocketLeft,
}

impl CallEventKind {
    /// Stable string form (the database column value).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CallStarted => "call.started",
            Self::EscalationRequested => "call.escalation_requested",
            Self::EscalationAccepted => "call.escalation_accepted",
            Self::CallEnded => "call.ended",
            Self::SocketJoined => "signal.socket_joined",
            Self::SocketLeft => "signal.socket_left",
        }
    }
}

impl std::str::FromStr for CallEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "call.started" => Ok(Self::CallStarted),
            "call.escalation_requested" => Ok(Self::EscalationRequested),
            "call.escalation_accepted" => Ok(Self::EscalationAccepted),
            "call.ended" => Ok(Self::CallEnded),
            "signal.socket_joined" => Ok(Self::SocketJoined),
            "signal.socket_left" => Ok(Self::SocketLeft),
            other => Err(format!("unknown call event kind: {other}")),
        }
    }
}

impl std::fmt::Display for CallEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable audit entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    /// Session the event belongs to.
    pub session_id: SessionId,
    /// What happened.
    pub kind: CallEventKind,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Event-specific details (reason, operator, socket id, …).
    #[serde(default)]
    pub data: Value,
}

impl CallEvent {
    /// Build an event stamped with the current time.
    pub fn now(session_id: SessionId, kind: CallEventKind, data: Value) -> Self {
        Self {
            session_id,
            kind,
            timestamp: Utc::now(),
            data,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

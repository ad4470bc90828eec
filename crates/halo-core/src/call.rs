//! Call session model and status state machine.
//!
//! A [`CallSession`] is the authoritative record of one user's call. Status
//! moves strictly forward — `ai → escalating → human` — with `ended`
//! reachable and absorbing from any state. No path moves status backward.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{OperatorId, SessionId, SocketId, UserId};

/// Who is currently handling the call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// The AI agent is handling the call.
    Ai,
    /// Hand-off requested; waiting for the operator to accept.
    Escalating,
    /// A human operator has taken over.
    Human,
    /// Terminal. Absorbing from every state.
    Ended,
}

impl CallStatus {
    /// Whether moving from `self` to `next` is a legal forward transition.
    ///
    /// `Ended` is reachable from anywhere; nothing leaves `Ended`.
    pub fn can_transition_to(self, next: CallStatus) -> bool {
        match (self, next) {
            (Self::Ended, _) => false,
            (_, Self::Ended) => true,
            (Self::Ai, Self::Escalating) | (Self::Escalating, Self::Human) => true,
            _ => false,
        }
    }

    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        self == Self::Ended
    }

    /// Wire/storage form (matches the serde representation).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Escalating => "escalating",
            Self::Human => "human",
            Self::Ended => "ended",
        }
    }
}

impl std::str::FromStr for CallStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ai" => Ok(Self::Ai),
            "escalating" => Ok(Self::Escalating),
            "human" => Ok(Self::Human),
            "ended" => Ok(Self::Ended),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One live call session.
///
/// Owned exclusively by the backend's session registry. `connected_socket_ids`
/// is mutated only through the registry's socket methods, which only the
/// signaling relay calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSession {
    /// Session ID (idempotency key in the registry).
    pub session_id: SessionId,
    /// The end user on the page.
    pub user_id: UserId,
    /// Operator assigned at escalation time. `None` while status is `ai`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<OperatorId>,
    /// Domain the call started on (resolves the owning operator).
    pub domain: String,
    /// Full page URL at call start.
    pub page_url: String,
    /// Current phase of the call.
    pub status: CallStatus,
    /// Call start time.
    pub started_at: DateTime<Utc>,
    /// Set when status first became `escalating`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated_at: Option<DateTime<Utc>>,
    /// Set when the AI phase ended (hand-off or call end).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_ended_at: Option<DateTime<Utc>>,
    /// Signaling sockets currently joined to this session.
    #[serde(default)]
    pub connected_socket_ids: HashSet<SocketId>,
    /// Caller-supplied metadata, carried opaquely.
    #[serde(default)]
    pub metadata: Value,
}

impl CallSession {
    /// Create a fresh `ai`-status session starting now.
    pub fn new(
        session_id: SessionId,
        user_id: UserId,
        domain: impl Into<String>,
        page_url: impl Into<String>,
        metadata: Value,
    ) -> Self {
        Self {
            session_id,
            user_id,
            owner_id: None,
            domain: domain.into(),
            page_url: page_url.into(),
            status: CallStatus::Ai,
            started_at: Utc::now(),
            escalated_at: None,
            ai_ended_at: None,
            connected_socket_ids: HashSet::new(),
            metadata,
        }
    }

    /// Apply a partial update. Fields left `None` in the patch are untouched.
    pub fn apply(&mut self, patch: CallSessionPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(owner_id) = patch.owner_id {
            self.owner_id = Some(owner_id);
        }
        if let Some(escalated_at) = patch.escalated_at {
            self.escalated_at = Some(escalated_at);
        }
        if let Some(ai_ended_at) = patch.ai_ended_at {
            self.ai_ended_at = Some(ai_ended_at);
        }
        if let Some(metadata) = patch.metadata {
            self.metadata = metadata;
        }
    }
}

/// Partial update merged into a [`CallSession`] by the registry's `update`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSessionPatch {
    /// New status, if changing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CallStatus>,
    /// Operator assignment, if changing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<OperatorId>,
    /// Escalation timestamp, if setting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated_at: Option<DateTime<Utc>>,
    /// AI-phase end timestamp, if setting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_ended_at: Option<DateTime<Utc>>,
    /// Replacement metadata, if changing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! Signaling channel message types.
//!
//! One tagged union covers everything the real-time channel carries:
//! room membership, SDP offer/answer, ICE candidates, and terminal notices.
//! Messages are ephemeral — relayed, never persisted. Adding a variant is a
//! compile-time decision: every `match` over [`SignalingMessage`] is
//! exhaustive.
//!
//! Wire form is `{type, sessionId, data}` with snake_case type tags.

use serde::{Deserialize, Serialize};

use crate::ids::{OperatorId, SessionId, UserId};

/// Participant identity supplied when joining a room.
///
/// Exactly one of `user_id` / `owner_id` is normally present, depending on
/// which side of the call the socket belongs to.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomData {
    /// End-user identity, for the user-side socket.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Operator identity, for the operator-side socket.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<OperatorId>,
}

/// SDP payload carried by offers and answers. Relayed verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SdpData {
    /// The session description, opaque to the relay.
    pub sdp: String,
}

/// ICE candidate payload. Relayed verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateData {
    /// Candidate line, opaque to the relay.
    pub candidate: String,
    /// Media-line index, when the peer supplies one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u32>,
    /// Media stream identification tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
}

/// Terminal call notice payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CallEndedData {
    /// Why the call ended, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error reply payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    /// Human-readable description of what was refused.
    pub message: String,
}

/// Everything the signaling channel carries, keyed by session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalingMessage {
    /// Register this socket under a session.
    JoinRoom {
        /// Session to join.
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        /// Who is joining.
        #[serde(default)]
        data: JoinRoomData,
    },
    /// SDP offer, fanned out to the other peers in the room.
    Offer {
        /// Session scope.
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        /// Opaque SDP.
        data: SdpData,
    },
    /// SDP answer, fanned out to the other peers in the room.
    Answer {
        /// Session scope.
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        /// Opaque SDP.
        data: SdpData,
    },
    /// ICE candidate, fanned out to the other peers in the room.
    IceCandidate {
        /// Session scope.
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        /// Opaque candidate.
        data: IceCandidateData,
    },
    /// Deregister this socket from its session.
    LeaveRoom {
        /// Session to leave.
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
    /// The call has ended; the room is dissolving.
    CallEnded {
        /// Session scope.
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        /// Terminal details.
        #[serde(default)]
        data: CallEndedData,
    },
    /// Refusal or failure reply from the relay.
    Error {
        /// Session the error relates to.
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        /// What went wrong.
        data: ErrorData,
    },
}

impl SignalingMessage {
    /// The session every signaling message is scoped to.
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::JoinRoom { session_id, .. }
            | Self::Offer { session_id, .. }
            | Self::Answer { session_id, .. }
            | Self::IceCandidate { session_id, .. }
            | Self::LeaveRoom { session_id }
            | Self::CallEnded { session_id, .. }
            | Self::Error { session_id, .. } => session_id,
        }
    }

    /// Wire tag for logging and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join_room",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice_candidate",
            Self::LeaveRoom { .. } => "leave_room",
            Self::CallEnded { .. } => "call_ended",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this message is negotiation traffic to relay verbatim
    /// (offer / answer / ICE), as opposed to membership control.
    pub fn is_relay_payload(&self) -> bool {
        matches!(
            self,
            Self::Offer { .. } | Self::Answer { .. } | Self::IceCandidate { .. }
        )
    }

    /// Build an error reply for a session.
    pub fn error(session_id: SessionId, message: impl Into<String>) -> Self {
        Self::Error {
            session_id,
            data: ErrorData {
                message: message.into(),
            },
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
    fn join_room_wire_shape() {
        let msg = SignalingMessage::JoinRoom {
            session_id: SessionId::new("sess_1"),
            data: JoinRoomData {
                user_id: Some(UserId::new("user_1")),
                owner_id: None,
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "join_room");
        assert_eq!(json["sessionId"], "sess_1");
        assert_eq!(json["data"]["userId"], "user_1");
        assert!(json["data"].get("ownerId").is_none());
    }

    #[test]
    fn offer_wire_shape() {
        let msg = SignalingMessage::Offer {
            session_id: SessionId::new("sess_1"),
            data: SdpData {
                sdp: "v=0\r\no=-".into(),
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "offer");
        assert_eq!(json["data"]["sdp"], "v=0\r\no=-");
    }

    #[test]
    fn ice_candidate_optional_fields() {
        let json = r#"{"type":"ice_candidate","sessionId":"sess_1","data":{"candidate":"candidate:1 1 UDP"}}"#;
        let msg: SignalingMessage = serde_json::from_str(json).unwrap();
        match msg {
            SignalingMessage::IceCandidate { data, .. } => {
                assert_eq!(data.candidate, "candidate:1 1 UDP");
                assert!(data.sdp_m_line_index.is_none());
                assert!(data.sdp_mid.is_none());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn ice_candidate_camel_case_fields() {
        let msg = SignalingMessage::IceCandidate {
            session_id: SessionId::new("sess_1"),
            data: IceCandidateData {
                candidate: "candidate:1".into(),
                sdp_m_line_index: Some(0),
                sdp_mid: Some("audio".into()),
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["data"]["sdpMLineIndex"], 0);
        assert_eq!(json["data"]["sdpMid"], "audio");
    }

    #[test]
    fn join_room_without_data_parses() {
        // Clients may omit the identity payload entirely.
        let json = r#"{"type":"join_room","sessionId":"sess_1"}"#;
        let msg: SignalingMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.session_id().as_str(), "sess_1");
    }

    #[test]
    fn leave_room_round_trips() {
        let msg = SignalingMessage::LeaveRoom {
            session_id: SessionId::new("sess_1"),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: SignalingMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn session_id_accessor_covers_all_variants() {
        let sid = SessionId::new("sess_x");
        let msgs = [
            SignalingMessage::JoinRoom {
                session_id: sid.clone(),
                data: JoinRoomData::default(),
            },
            SignalingMessage::Offer {
                session_id: sid.clone(),
                data: SdpData { sdp: "s".into() },
            },
            SignalingMessage::LeaveRoom {
                session_id: sid.clone(),
            },
            SignalingMessage::CallEnded {
                session_id: sid.clone(),
                data: CallEndedData::default(),
            },
            SignalingMessage::error(sid.clone(), "nope"),
        ];
        for msg in &msgs {
            assert_eq!(msg.session_id(), &sid);
        }
    }

    #[test]
    fn relay_payload_classification() {
        let sid = SessionId::new("sess_1");
        assert!(
            SignalingMessage::Offer {
                session_id: sid.clone(),
                data: SdpData { sdp: "s".into() },
            }
            .is_relay_payload()
        );
        assert!(
            !SignalingMessage::LeaveRoom {
                session_id: sid.clone(),
            }
            .is_relay_payload()
        );
        assert!(
            !SignalingMessage::JoinRoom {
                session_id: sid,
                data: JoinRoomData::default(),
            }
            .is_relay_payload()
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        let json = r#"{"type":"renegotiate","sessionId":"sess_1"}"#;
        let result: Result<SignalingMessage, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn error_constructor() {
        let msg = SignalingMessage::error(SessionId::new("sess_1"), "Session not found");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["data"]["message"], "Session not found");
    }
}

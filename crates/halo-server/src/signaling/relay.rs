//! Signaling relay: room membership and verbatim SDP/ICE fan-out.
//!
//! The relay never inspects negotiation payloads. Offers, answers, and
//! ICE candidates go to every other socket in the sender's room exactly
//! as received. Membership is the only thing validated: a socket may only
//! join a room whose session is live, and leave/disconnect share one
//! cleanup path so a dropped transport and an explicit `leave_room` are
//! indistinguishable to the rest of the room.

use std::sync::Arc;

use metrics::counter;
use serde_json::json;
use tracing::{debug, info, instrument};

use halo_core::audit::{CallEvent, CallEventKind};
use halo_core::ids::{SessionId, SocketId};
use halo_core::signaling::{CallEndedData, SignalingMessage};

use crate::registry::SessionRegistry;

use super::directory::{SocketConnection, SocketDirectory, SocketIdentity};

/// Routes signaling messages between the sockets of one session's room.
pub struct SignalingRelay {
    registry: Arc<SessionRegistry>,
    directory: Arc<SocketDirectory>,
}

impl SignalingRelay {
    pub fn new(registry: Arc<SessionRegistry>, directory: Arc<SocketDirectory>) -> Self {
        Self {
            registry,
            directory,
        }
    }

    pub fn directory(&self) -> &Arc<SocketDirectory> {
        &self.directory
    }

    /// Handle one inbound message from a connected socket.
    #[instrument(skip(self, socket, message), fields(socket_id = %socket.id, kind = message.kind()))]
    pub async fn handle(&self, socket: &Arc<SocketConnection>, message: SignalingMessage) {
        counter!("halo_signaling_messages_total", "kind" => message.kind()).increment(1);
        match message {
            SignalingMessage::JoinRoom { session_id, data } => {
                let identity = match (data.user_id, data.owner_id) {
                    (Some(user_id), _) => SocketIdentity::User(user_id),
                    (None, Some(owner_id)) => SocketIdentity::Owner(owner_id),
                    (None, None) => SocketIdentity::Anonymous,
                };
                self.join_room(socket, session_id, identity).await;
            }
            SignalingMessage::LeaveRoom { session_id } => {
                self.leave(socket, Some(&session_id)).await;
            }
            relayed @ (SignalingMessage::Offer { .. }
            | SignalingMessage::Answer { .. }
            | SignalingMessage::IceCandidate { .. }) => {
                self.relay_to_peers(socket, relayed).await;
            }
            // Clients do not originate these; ignore rather than error so
            // a confused client cannot spam the room with refusals.
            SignalingMessage::CallEnded { session_id, .. }
            | SignalingMessage::Error { session_id, .. } => {
                debug!(session_id = %session_id, "ignoring server-originated message kind from client");
            }
        }
    }

    /// Register a socket in a session's room.
    ///
    /// Joining a session that is not live is refused with an error reply,
    /// and the socket stays unbound. A socket already in a room is also
    /// refused; clients reconnect to switch rooms.
    async fn join_room(
        &self,
        socket: &Arc<SocketConnection>,
        session_id: SessionId,
        identity: SocketIdentity,
    ) {
        if self.registry.get(&session_id).is_none() {
            self.registry.warn_not_live(&session_id, "join_room");
            self.directory
                .send_to_socket(
                    &socket.id,
                    &SignalingMessage::error(session_id, "Session not found"),
                )
                .await;
            return;
        }

        if !socket.bind(session_id.clone(), identity.clone()) {
            self.directory
                .send_to_socket(
                    &socket.id,
                    &SignalingMessage::error(session_id, "Socket already joined a room"),
                )
                .await;
            return;
        }

        let _ = self.registry.add_socket(&session_id, socket.id.clone());
        self.registry.audit(CallEvent::now(
            session_id.clone(),
            CallEventKind::SocketJoined,
            json!({ "socketId": socket.id.as_str(), "role": identity.role() }),
        ));
        info!(session_id = %session_id, role = identity.role(), "socket joined room");

        // Ack the join back to the joiner only.
        self.directory
            .send_to_socket(
                &socket.id,
                &SignalingMessage::JoinRoom {
                    session_id,
                    data: Default::default(),
                },
            )
            .await;
    }

    /// Fan out a negotiation message to the other peers in the sender's
    /// room. Unjoined senders get an error reply instead.
    async fn relay_to_peers(&self, socket: &Arc<SocketConnection>, message: SignalingMessage) {
        let claimed = message.session_id().clone();
        let Some(bound) = socket.session_id() else {
            self.directory
                .send_to_socket(
                    &socket.id,
                    &SignalingMessage::error(claimed, "Join a room before signaling"),
                )
                .await;
            return;
        };
        // The socket's binding wins over whatever session the frame claims.
        if bound != claimed {
            self.directory
                .send_to_socket(
                    &socket.id,
                    &SignalingMessage::error(claimed, "Message is for a different session"),
                )
                .await;
            return;
        }
        let cut = self
            .directory
            .send_to_room(&bound, Some(&socket.id), &message)
            .await;
        for slow in cut {
            let _ = self.registry.remove_socket(&bound, &slow);
        }
    }

    /// Shared cleanup for `leave_room` and transport disconnect.
    ///
    /// Deregisters the socket from its room, tells the remaining peers,
    /// and audits the departure. Safe to call for sockets that never
    /// joined. `claimed` is the session named in an explicit leave frame;
    /// the socket's actual binding wins when they disagree.
    pub async fn leave(&self, socket: &Arc<SocketConnection>, claimed: Option<&SessionId>) {
        let Some(session_id) = socket.unbind() else {
            return;
        };
        if let Some(claimed) = claimed {
            if claimed != &session_id {
                debug!(claimed = %claimed, bound = %session_id, "leave_room named the wrong session");
            }
        }

        let _ = self.registry.remove_socket(&session_id, &socket.id);
        self.registry.audit(CallEvent::now(
            session_id.clone(),
            CallEventKind::SocketLeft,
            json!({ "socketId": socket.id.as_str() }),
        ));
        info!(session_id = %session_id, socket_id = %socket.id, "socket left room");

        let cut = self
            .directory
            .send_to_room(
                &session_id,
                Some(&socket.id),
                &SignalingMessage::LeaveRoom {
                    session_id: session_id.clone(),
                },
            )
            .await;
        for slow in cut {
            let _ = self.registry.remove_socket(&session_id, &slow);
        }
    }

    /// Transport closed without a `leave_room`: drop the socket from the
    /// directory, then run the same room cleanup an explicit leave runs.
    pub async fn disconnect(&self, socket_id: &SocketId) {
        let Some(socket) = self.directory.remove(socket_id).await else {
            return;
        };
        self.leave(&socket, None).await;
    }

    /// Tell every socket in the room the call is over. Sent by the call
    /// lifecycle, not by clients; the room is dissolving.
    pub async fn broadcast_call_ended(&self, session_id: &SessionId, reason: Option<String>) {
        let cut = self
            .directory
            .send_to_room(
                session_id,
                None,
                &SignalingMessage::CallEnded {
                    session_id: session_id.clone(),
                    data: CallEndedData { reason },
                },
            )
            .await;
        for slow in cut {
            let _ = self.registry.remove_socket(session_id, &slow);
        }
    }
}

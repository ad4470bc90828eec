//! Socket directory: who is connected, and fan-out to a room.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use metrics::counter;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use halo_core::ids::{OperatorId, SessionId, SocketId, UserId};
use halo_core::signaling::SignalingMessage;

/// Which side of the call a socket belongs to, once known.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum SocketIdentity {
    /// Connected but not yet joined to a room.
    #[default]
    Anonymous,
    /// The end-user's tab.
    User(UserId),
    /// The domain owner's device.
    Owner(OperatorId),
}

impl SocketIdentity {
    /// Label for logs and the leave notice payload.
    pub fn role(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::User(_) => "user",
            Self::Owner(_) => "owner",
        }
    }
}

/// One connected signaling socket.
///
/// The room binding and identity are set once at join time and never
/// change for the life of the socket; a client that wants a different
/// room reconnects.
pub struct SocketConnection {
    /// Directory key.
    pub id: SocketId,
    /// The room this socket joined, once it has.
    session_id: parking_lot::RwLock<Option<SessionId>>,
    identity: parking_lot::RwLock<SocketIdentity>,
    /// Outbound frames; the write loop drains this.
    tx: mpsc::Sender<Arc<String>>,
    /// Lifetime count of frames dropped because the buffer was full.
    drops: AtomicU64,
}

impl SocketConnection {
    pub fn new(id: SocketId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            session_id: parking_lot::RwLock::new(None),
            identity: parking_lot::RwLock::new(SocketIdentity::Anonymous),
            tx,
            drops: AtomicU64::new(0),
        }
    }

    /// Bind this socket to a room. Returns false if already bound.
    pub fn bind(&self, session_id: SessionId, identity: SocketIdentity) -> bool {
        let mut bound = self.session_id.write();
        if bound.is_some() {
            return false;
        }
        *bound = Some(session_id);
        *self.identity.write() = identity;
        true
    }

    /// Clear the room binding. Returns the session it was bound to.
    pub fn unbind(&self) -> Option<SessionId> {
        *self.identity.write() = SocketIdentity::Anonymous;
        self.session_id.write().take()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id.read().clone()
    }

    pub fn identity(&self) -> SocketIdentity {
        self.identity.read().clone()
    }

    /// Queue a frame without blocking. Returns false when the buffer is
    /// full and the frame was dropped.
    pub fn send(&self, frame: Arc<String>) -> bool {
        self.tx.try_send(frame).is_ok()
    }

    /// Count a dropped frame; returns the new lifetime total.
    pub fn record_drop(&self) -> u64 {
        self.drops.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// All connected sockets, indexed by socket ID.
pub struct SocketDirectory {
    sockets: RwLock<HashMap<SocketId, Arc<SocketConnection>>>,
    /// Avoids read-locking for count queries.
    active_count: AtomicUsize,
    /// Lifetime drop ceiling before a slow socket is disconnected.
    max_send_failures: u64,
}

impl SocketDirectory {
    pub fn new(max_send_failures: u64) -> Self {
        Self {
            sockets: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
            max_send_failures: max_send_failures.max(1),
        }
    }

    pub async fn add(&self, socket: Arc<SocketConnection>) {
        let mut sockets = self.sockets.write().await;
        if sockets.insert(socket.id.clone(), socket).is_none() {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub async fn remove(&self, socket_id: &SocketId) -> Option<Arc<SocketConnection>> {
        let mut sockets = self.sockets.write().await;
        let removed = sockets.remove(socket_id);
        if removed.is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    pub async fn get(&self, socket_id: &SocketId) -> Option<Arc<SocketConnection>> {
        self.sockets.read().await.get(socket_id).cloned()
    }

    /// Send a message to every socket in a room, excluding at most one
    /// sender. Slow sockets past the drop ceiling are removed; returns
    /// the IDs that were cut so the caller can clean up room membership.
    pub async fn send_to_room(
        &self,
        session_id: &SessionId,
        exclude: Option<&SocketId>,
        message: &SignalingMessage,
    ) -> Vec<SocketId> {
        let frame = match serde_json::to_string(message) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(kind = message.kind(), error = %e, "failed to serialize signaling message");
                return Vec::new();
            }
        };
        let mut to_remove = Vec::new();
        {
            let sockets = self.sockets.read().await;
            let mut recipients = 0u32;
            for socket in sockets.values() {
                if socket.session_id().as_ref() != Some(session_id) {
                    continue;
                }
                if exclude == Some(&socket.id) {
                    continue;
                }
                recipients += 1;
                if !socket.send(Arc::clone(&frame)) {
                    counter!("halo_signaling_drops_total").increment(1);
                    let drops = socket.record_drop();
                    if drops >= self.max_send_failures {
                        warn!(socket_id = %socket.id, drops, "disconnecting slow signaling socket");
                        to_remove.push(socket.id.clone());
                    } else {
                        warn!(socket_id = %socket.id, total_drops = drops, "signaling send buffer full, frame dropped");
                    }
                }
            }
            debug!(
                kind = message.kind(),
                session_id = %session_id,
                recipients,
                "relayed signaling message"
            );
        }
        if !to_remove.is_empty() {
            let mut sockets = self.sockets.write().await;
            for id in &to_remove {
                if sockets.remove(id).is_some() {
                    let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
                }
            }
        }
        to_remove
    }

    /// Send a message to one socket. A full buffer counts a drop but
    /// never disconnects here; direct replies are best-effort.
    pub async fn send_to_socket(&self, socket_id: &SocketId, message: &SignalingMessage) {
        let Some(socket) = self.get(socket_id).await else {
            return;
        };
        match serde_json::to_string(message) {
            Ok(frame) => {
                if !socket.send(Arc::new(frame)) {
                    counter!("halo_signaling_drops_total").increment(1);
                    let _ = socket.record_drop();
                }
            }
            Err(e) => {
                warn!(kind = message.kind(), error = %e, "failed to serialize signaling reply");
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use halo_core::signaling::CallEndedData;

    fn socket(id: &str, buffer: usize) -> (Arc<SocketConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Arc::new(SocketConnection::new(SocketId::new(id), tx)), rx)
    }

    fn notice(sid: &str) -> SignalingMessage {
        SignalingMessage::CallEnded {
            session_id: SessionId::new(sid),
            data: CallEndedData::default(),
        }
    }

    #[tokio::test]
    async fn room_fanout_excludes_sender() {
        let dir = SocketDirectory::new(100);
        let (a, mut rx_a) = socket("sock_a", 8);
        let (b, mut rx_b) = socket("sock_b", 8);
        assert!(a.bind(SessionId::new("sess_1"), SocketIdentity::Anonymous));
        assert!(b.bind(SessionId::new("sess_1"), SocketIdentity::Anonymous));
        dir.add(Arc::clone(&a)).await;
        dir.add(Arc::clone(&b)).await;

        let cut = dir
            .send_to_room(&SessionId::new("sess_1"), Some(&a.id), &notice("sess_1"))
            .await;
        assert!(cut.is_empty());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn other_rooms_do_not_receive() {
        let dir = SocketDirectory::new(100);
        let (a, mut rx_a) = socket("sock_a", 8);
        assert!(a.bind(SessionId::new("sess_other"), SocketIdentity::Anonymous));
        dir.add(Arc::clone(&a)).await;

        dir.send_to_room(&SessionId::new("sess_1"), None, &notice("sess_1"))
            .await;
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_socket_is_cut_at_the_ceiling() {
        let dir = SocketDirectory::new(2);
        // Buffer of 1 with no reader: the second and third sends drop.
        let (a, _rx_a) = socket("sock_a", 1);
        assert!(a.bind(SessionId::new("sess_1"), SocketIdentity::Anonymous));
        dir.add(Arc::clone(&a)).await;

        let sid = SessionId::new("sess_1");
        assert!(dir.send_to_room(&sid, None, &notice("sess_1")).await.is_empty());
        assert!(dir.send_to_room(&sid, None, &notice("sess_1")).await.is_empty());
        let cut = dir.send_to_room(&sid, None, &notice("sess_1")).await;
        assert_eq!(cut, vec![a.id.clone()]);
        assert_eq!(dir.connection_count(), 0);
    }

    #[tokio::test]
    async fn bind_is_once_only() {
        let (a, _rx) = socket("sock_a", 1);
        assert!(a.bind(SessionId::new("sess_1"), SocketIdentity::Anonymous));
        assert!(!a.bind(SessionId::new("sess_2"), SocketIdentity::Anonymous));
        assert_eq!(a.session_id(), Some(SessionId::new("sess_1")));
        assert_eq!(a.unbind(), Some(SessionId::new("sess_1")));
        assert_eq!(a.session_id(), None);
    }
}

//! WebSocket transport for the signaling relay.
//!
//! One task pair per socket: the read loop parses frames and hands them
//! to the relay, the write loop drains the per-socket outbound buffer.
//! Either loop ending tears the socket down through the relay's shared
//! disconnect path.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use metrics::gauge;
use tracing::{debug, info, warn};

use halo_core::ids::SocketId;
use halo_core::signaling::SignalingMessage;

use crate::state::AppState;

use super::directory::SocketConnection;

/// `GET /signaling` upgrade endpoint.
pub async fn signaling_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| serve_socket(state, socket))
}

async fn serve_socket(state: AppState, socket: WebSocket) {
    let socket_id = SocketId::generate();
    let buffer = state.settings.signaling.send_buffer.max(1);
    let (tx, mut rx) = tokio::sync::mpsc::channel::<Arc<String>>(buffer);
    let connection = Arc::new(SocketConnection::new(socket_id.clone(), tx));

    let relay = Arc::clone(&state.relay);
    relay.directory().add(Arc::clone(&connection)).await;
    gauge!("halo_signaling_sockets").set(relay.directory().connection_count() as f64);
    info!(socket_id = %socket_id, "signaling socket connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_id = socket_id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx
                .send(Message::Text(frame.as_str().into()))
                .await
                .is_err()
            {
                debug!(socket_id = %writer_id, "signaling write failed, closing");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<SignalingMessage>(&text) {
                            Ok(message) => relay.handle(&connection, message).await,
                            Err(e) => {
                                // Unknown or malformed frames are dropped;
                                // there is no session to address a reply to.
                                warn!(socket_id = %socket_id, error = %e, "unparseable signaling frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => {}
                    Some(Err(e)) => {
                        debug!(socket_id = %socket_id, error = %e, "signaling read error");
                        break;
                    }
                }
            }
            _ = &mut writer => break,
        }
    }

    relay.disconnect(&socket_id).await;
    writer.abort();
    gauge!("halo_signaling_sockets").set(relay.directory().connection_count() as f64);
    info!(socket_id = %socket_id, "signaling socket closed");
}

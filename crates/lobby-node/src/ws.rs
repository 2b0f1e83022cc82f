//! WebSocket transport for the lobby.
//!
//! - `/ws` - the lobby socket
//! - `/api/presence` - who is currently in the lobby
//! - `/api/realtime/stats` - topic statistics
//!
//! ## WebSocket Protocol
//!
//! ```json
//! // Announce a name
//! {"destination": "chat.addUser", "payload": {"sender": "alice", "type": "JOIN"}}
//!
//! // Say something
//! {"destination": "chat.sendMessage", "payload": {"content": "gg", "type": "CHAT"}}
//!
//! // Leave without closing the socket
//! {"destination": "chat.removeUser"}
//! ```
//!
//! Heartbeat probes are sent as WebSocket pings; the pong is the reply.

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use lobby_realtime::{Lobby, Outbound};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::api::AppState;

/// Create the lobby transport routes.
pub fn realtime_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/presence", get(get_presence))
        .route("/api/realtime/stats", get(get_stats))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.lobby.clone()))
}

/// Encode an outbound item as a WebSocket frame.
pub fn encode_outbound(item: Outbound) -> Option<Message> {
    match item {
        Outbound::Probe => Some(Message::Ping(Bytes::new())),
        other => {
            let message = other.into_message()?;
            match serde_json::to_string(&message) {
                Ok(json) => Some(Message::Text(json.into())),
                Err(e) => {
                    error!(error = %e, "Failed to encode outbound message");
                    None
                }
            }
        }
    }
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, lobby: Arc<Lobby>) {
    let (connection, mut outbound) = match lobby.accept() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Connection refused");
            return;
        }
    };

    let connection_id = connection.id.clone();
    info!(connection_id = %connection_id, "WebSocket client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Drains the connection's queue. Ends when the lobby declares it dead.
    let send_id = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(item) = outbound.recv().await {
            let Some(frame) = encode_outbound(item) else {
                continue;
            };
            if ws_sender.send(frame).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
        debug!(connection_id = %send_id, "Send task ended");
    });

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            msg = ws_receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    // Rejections are already queued back to this client.
                    let _ = lobby.on_text_frame(&connection_id, text.as_str());
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Ping(_))) => {
                    lobby.on_heartbeat_reply(&connection_id);
                }
                Some(Ok(Message::Binary(_))) => {
                    debug!(connection_id = %connection_id, "Binary message ignored");
                    lobby.on_heartbeat_reply(&connection_id);
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(connection_id = %connection_id, "WebSocket close received");
                    break;
                }
                Some(Err(e)) => {
                    warn!(connection_id = %connection_id, error = %e, "WebSocket error");
                    break;
                }
            },
        }
    }

    send_task.abort();
    lobby.on_connection_closed(&connection_id);
    info!(connection_id = %connection_id, "WebSocket client disconnected");
}

/// List bound identities.
async fn get_presence(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.lobby.presence())
}

/// Get lobby statistics.
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.lobby.stats())
}

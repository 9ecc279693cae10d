//! The `/ws` signaling relay.
//!
//! Each connection is independent. An offer is traded upstream for an answer
//! that goes back on the same socket; anything else is echoed.

use super::upstream::RealtimeEndpoint;
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use romabot_core::protocol::SignalMessage;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

#[instrument(name = "relay_connection", skip_all, fields(connection_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id: u32 = rand::random();
    tracing::Span::current().record("connection_id", connection_id);
    info!("Client connected.");

    let (mut socket_tx, mut socket_rx) = socket.split();
    while let Some(msg) = socket_rx.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "WebSocket receive error.");
                break;
            }
        };

        if let Some(reply) = relay_message(&text, &state.upstream).await {
            if socket_tx.send(Message::Text(reply.into())).await.is_err() {
                warn!("Client went away before the reply was sent.");
                break;
            }
        }
    }
    info!("Client disconnected.");
}

/// Computes the reply for one inbound frame. `None` means send nothing.
pub async fn relay_message(text: &str, upstream: &RealtimeEndpoint) -> Option<String> {
    let sdp = match serde_json::from_str::<SignalMessage>(text) {
        Ok(SignalMessage::Offer { sdp }) if !sdp.trim().is_empty() => sdp,
        _ => return Some(format!("echo: {text}")),
    };

    let answer = match upstream.answer(&sdp).await {
        Ok(answer) => answer,
        Err(e) => {
            error!(error = %e, "Offer relay failed; no answer sent.");
            return None;
        }
    };
    match serde_json::to_string(&SignalMessage::Answer { sdp: answer }) {
        Ok(reply) => Some(reply),
        Err(e) => {
            error!(error = %e, "Failed to encode answer.");
            None
        }
    }
}

//! WebSocket handler for the live payload stream

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use bytes::Bytes;
use futures::{SinkExt, stream::StreamExt};
use tracing::{debug, info};

use crate::api::state::ApiState;

/// WebSocket upgrade handler
///
/// GET /ws
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

/// Payloads go out verbatim, as text when they are valid UTF-8
fn frame(payload: Bytes) -> Message {
    match String::from_utf8(payload.to_vec()) {
        Ok(text) => Message::Text(text),
        Err(e) => Message::Binary(e.into_bytes()),
    }
}

async fn handle_websocket(socket: WebSocket, state: ApiState) {
    let (mut sender, mut receiver) = socket.split();

    // subscribe before anything else so no payload published after the
    // upgrade is missed
    let mut subscription = state.hub.subscribe();
    let viewer = subscription.id();
    info!("viewer {viewer} connected");

    let mut send_task = tokio::spawn(async move {
        // ends when the hub evicts this viewer or the socket fails
        while let Some(payload) = subscription.recv().await {
            if sender.send(frame(payload)).await.is_err() {
                debug!("WebSocket send failed, viewer disconnected");
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    info!("viewer {viewer} disconnected");
}

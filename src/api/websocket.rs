//! Streaming channel upgrade, delegating the subscriber lifecycle to the
//! [`crate::broadcaster::Broadcaster`] (§4.8, §6).

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::Value;
use tracing::debug;

use crate::api::state::ApiState;

pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<ApiState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: ApiState) {
    let (id, mut outbound) = state.broadcaster.connect();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                let Ok(text) = serde_json::to_string(&frame) else { continue };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => handle_inbound(&state, id, &text),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(error = %err, "websocket recv error");
                        break;
                    }
                }
            }
        }
    }

    state.broadcaster.disconnect(id);
}

fn handle_inbound(state: &ApiState, id: crate::broadcaster::SubscriberId, text: &str) {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return;
    };
    if value.get("type").and_then(Value::as_str) == Some("ping") {
        state.broadcaster.handle_ping(id);
    }
    // `{type:"subscribe", ...}` is accepted but not required to filter in the core
    // (§6); anything else is silently ignored.
}

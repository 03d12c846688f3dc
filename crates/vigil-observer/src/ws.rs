//! `WebSocket` handler for the telemetry stream.
//!
//! Clients connect to `GET /ws`. On connect the handler registers an
//! observer with the hub and sends one `init` message holding the event
//! log snapshot taken at registration. After that every hub message
//! (`progress`, `candidates`, `status`) is forwarded as a JSON text frame.
//!
//! A client may send `{"type":"userMessage","message":...}`; the text is
//! recorded in the event log and answered with a `response` message.
//!
//! When the hub drops a client for falling behind, its queue closes and
//! the handler closes the socket. The client can reconnect and receive a
//! fresh snapshot.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use vigil_core::hub::{ObserverHandle, TelemetryHub};
use vigil_types::{ClientMessage, ServerMessage};

use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` connection and begin
/// streaming telemetry.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_telemetry(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Handle the `WebSocket` lifecycle: subscribe, send the backlog, then
/// forward live messages until either side goes away.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    let ObserverHandle {
        id,
        snapshot,
        mut receiver,
    } = state.hub.subscribe();
    debug!(observer = %id, backlog = snapshot.len(), "WebSocket client connected");

    if send_message(&mut socket, &ServerMessage::Init { events: snapshot }).await {
        forward(&mut socket, &state.hub, &mut receiver).await;
    }

    state.hub.unsubscribe(id);
    debug!(observer = %id, "WebSocket client disconnected");
}

async fn forward(
    socket: &mut WebSocket,
    hub: &TelemetryHub,
    receiver: &mut mpsc::Receiver<ServerMessage>,
) {
    loop {
        tokio::select! {
            // Messages from the hub.
            outgoing = receiver.recv() => {
                let Some(message) = outgoing else {
                    debug!("observer dropped by hub, closing socket");
                    let _ = socket.send(Message::Close(None)).await;
                    return;
                };
                if !send_message(socket, &message).await {
                    return;
                }
            }
            // Frames from the client.
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_client_text(hub, text.as_str());
                        if let Some(reply) = reply {
                            if !send_message(socket, &reply).await {
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    Some(Ok(_)) => {
                        // Binary and pong frames carry nothing for us.
                    }
                }
            }
        }
    }
}

/// Serialize and send one message. Returns `false` once the client is gone.
async fn send_message(socket: &mut WebSocket, message: &ServerMessage) -> bool {
    let json = match serde_json::to_string(message) {
        Ok(j) => j,
        Err(e) => {
            warn!("Failed to serialize telemetry message: {e}");
            return true;
        }
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}

/// Interpret a text frame from a client. Returns the reply to send, if any.
pub(crate) fn handle_client_text(hub: &TelemetryHub, text: &str) -> Option<ServerMessage> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::UserMessage { message }) => Some(ServerMessage::Response {
            message: hub.acknowledge_user_message(&message),
        }),
        Err(e) => {
            debug!(error = %e, "ignoring unrecognized client frame");
            None
        }
    }
}

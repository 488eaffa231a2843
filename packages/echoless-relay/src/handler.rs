//! WebSocket connection handler.
//!
//! Manages individual WebSocket connections: assigning connection ids,
//! parsing client messages, dispatching them to the room and relay logic,
//! and running the leave protocol when the socket goes away.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::RelayError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::relay;
use crate::rooms;
use crate::state::RelayState;

/// Handle a single WebSocket connection.
///
/// This function runs for the lifetime of the connection:
/// 1. Registers the connection under a fresh id and announces it
/// 2. Spawns a sender task to forward outbound messages
/// 3. Processes incoming messages until the connection closes
/// 4. Runs the leave protocol, whatever ended the connection
pub async fn handle_websocket(socket: WebSocket, state: RelayState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Create the outbound channel for this client
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // ── Step 1: Register Connection ───────────────────────────────────────

    let connection_id = Uuid::new_v4().to_string();
    state.registry.register(&connection_id, tx);
    state.registry.send_to(
        &connection_id,
        ServerMessage::Connected {
            id: connection_id.clone(),
        },
    );
    tracing::info!(conn = connection_id.as_str(), "User connected");

    // ── Step 2: Spawn Sender Task ─────────────────────────────────────────

    let sender_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize server message: {}", e);
                }
            }
        }
    });

    // ── Step 3: Process Messages ──────────────────────────────────────────

    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(&state, &connection_id, client_msg).await;
                }
                Err(e) => {
                    tracing::warn!(
                        conn = connection_id.as_str(),
                        error = %e,
                        "Failed to parse client message"
                    );
                    state.registry.send_to(
                        &connection_id,
                        ServerMessage::Error {
                            code: "invalid_message".to_string(),
                            message: format!("Invalid message format: {}", e),
                        },
                    );
                }
            },
            Ok(Message::Close(_)) => {
                tracing::debug!(conn = connection_id.as_str(), "Client sent close frame");
                break;
            }
            Err(e) => {
                tracing::warn!(
                    conn = connection_id.as_str(),
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
            _ => {} // Binary, Ping, Pong: ignore
        }
    }

    // ── Step 4: Cleanup ───────────────────────────────────────────────────

    // Clean close, socket error and dropped TCP all end up here.
    match rooms::leave(&state, &connection_id).await {
        Ok(outcome) => {
            tracing::debug!(conn = connection_id.as_str(), outcome = ?outcome, "Leave complete");
        }
        Err(e) => {
            tracing::error!(
                conn = connection_id.as_str(),
                error = %e,
                "Error handling disconnect"
            );
        }
    }
    sender_task.abort();
    tracing::info!(conn = connection_id.as_str(), "User disconnected");
}

/// Handle a parsed client message.
async fn handle_client_message(state: &RelayState, connection_id: &str, msg: ClientMessage) {
    match msg {
        ClientMessage::Join { room_id, nickname } => {
            handle_join(state, connection_id, &room_id, &nickname).await;
        }

        ClientMessage::RelaySignal {
            target_id,
            caller_id,
            payload,
        } => {
            if let Err(e) =
                relay::relay_signal(&state.registry, connection_id, &target_id, &caller_id, payload)
            {
                tracing::debug!(conn = connection_id, error = %e, "Signal dropped");
            }
        }

        ClientMessage::RelayReturnSignal { caller_id, payload } => {
            if let Err(e) =
                relay::relay_return_signal(&state.registry, connection_id, &caller_id, payload)
            {
                tracing::debug!(conn = connection_id, error = %e, "Return signal dropped");
            }
        }

        ClientMessage::UpdateState { is_muted } => {
            if let Err(e) = rooms::update_state(state, connection_id, is_muted).await {
                tracing::debug!(conn = connection_id, error = %e, "State update ignored");
            }
        }

        ClientMessage::SendChat { body, timestamp } => {
            if let Err(e) = rooms::send_chat(state, connection_id, body, timestamp).await {
                tracing::debug!(conn = connection_id, error = %e, "Chat message ignored");
            }
        }

        ClientMessage::Ping => {
            state.registry.send_to(connection_id, ServerMessage::Pong);
        }
    }
}

// ── Message Handlers ──────────────────────────────────────────────────────────

/// Join a room; failures go back to the joiner as an `error` frame.
async fn handle_join(state: &RelayState, connection_id: &str, room_id: &str, nickname: &str) {
    if let Err(e) = rooms::join(state, connection_id, room_id, nickname).await {
        tracing::warn!(
            conn = connection_id,
            room_id = room_id,
            error = %e,
            "Error joining room"
        );
        send_error(state, connection_id, &e);
    }
}

fn send_error(state: &RelayState, connection_id: &str, error: &RelayError) {
    state.registry.send_to(
        connection_id,
        ServerMessage::Error {
            code: error.code().to_string(),
            message: error.to_string(),
        },
    );
}

//! Audio channel
//!
//! Receives the client's container/codec audio for one conversation and
//! forwards it to the conversation runtime. Authorization is assumed to be
//! handled by an outer layer; only the conversation ID is required here.

use crate::models::{backend_connected, protocol_error, AudioFrame};
use crate::routes::AppState;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Policy-violation close for a missing conversation ID
const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// GET /transcription?conversationId=<id>
pub async fn transcription_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let conversation_id = params
        .get("conversationId")
        .and_then(|raw| Uuid::parse_str(raw).ok());
    ws.on_upgrade(move |socket| handle_audio_socket(socket, state, conversation_id))
}

async fn handle_audio_socket(
    mut socket: WebSocket,
    state: AppState,
    conversation_id: Option<Uuid>,
) {
    let Some(conversation_id) = conversation_id else {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_POLICY_VIOLATION,
                reason: "conversationId is required".to_string().into(),
            })))
            .await;
        return;
    };

    let status = state.coordinator.ensure_runtime(conversation_id).await;
    if socket
        .send(Message::Text(backend_connected(status.as_str()).into()))
        .await
        .is_err()
    {
        return;
    }

    info!(conversation_id = %conversation_id, "Audio channel connected");

    while let Some(message) = socket.recv().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<AudioFrame>(&text) {
                Ok(AudioFrame::Append { audio }) => match BASE64.decode(audio.as_bytes()) {
                    Ok(chunk) => {
                        state
                            .coordinator
                            .append_audio(conversation_id, Bytes::from(chunk))
                            .await;
                    }
                    Err(e) => {
                        debug!(error = %e, "Undecodable audio chunk");
                        let _ = socket
                            .send(Message::Text(protocol_error("Invalid audio data").into()))
                            .await;
                    }
                },
                Ok(AudioFrame::Finalize) => {
                    state.coordinator.finalize_audio(conversation_id).await;
                }
                Ok(AudioFrame::Pause) => {
                    state.coordinator.pause_audio(conversation_id).await;
                }
                Ok(AudioFrame::Resume) => {
                    state.coordinator.resume_audio(conversation_id).await;
                }
                Err(e) => {
                    debug!(error = %e, "Unparseable audio frame");
                    let _ = socket
                        .send(Message::Text(protocol_error("Unknown message type").into()))
                        .await;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Audio receive error");
                break;
            }
        }
    }

    info!(conversation_id = %conversation_id, "Audio channel disconnected");
}

//! Control channel
//!
//! The authenticated JSON WebSocket every client keeps open. Requests come
//! in as typed frames; responses and asynchronous pipeline events go out
//! through one per-client queue so ordering is preserved.

use crate::models::{protocol_error, ClientMessage};
use crate::routes::AppState;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use services::auth::{AccessTokenClaims, AuthError};
use services::hub::{ClientHandle, ServerEvent};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Close codes for authentication failures
const CLOSE_INVALID_TOKEN: u16 = 4001;
const CLOSE_AUTH_INTERNAL: u16 = 5000;

/// GET /, `?token=<jwt>`: upgrade to the control channel
pub async fn control_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let token = params.get("token").cloned();
    ws.on_upgrade(move |socket| handle_control_socket(socket, state, token))
}

async fn handle_control_socket(mut socket: WebSocket, state: AppState, token: Option<String>) {
    let claims = match token.as_deref().map(|t| state.auth.verify_access_token(t)) {
        Some(Ok(claims)) => claims,
        Some(Err(AuthError::InternalError(message))) => {
            warn!(error = %message, "Token verification failed internally");
            close_with(&mut socket, CLOSE_AUTH_INTERNAL, "verification failed").await;
            return;
        }
        Some(Err(_)) | None => {
            close_with(&mut socket, CLOSE_INVALID_TOKEN, "invalid token").await;
            return;
        }
    };

    let client_id = Uuid::new_v4();
    info!(client_id = %client_id, user_id = %claims.id, "Control client connected");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Single writer task: responses and hub broadcasts share one queue
    let writer = tokio::spawn(async move {
        while let Some(json) = rx.recv().await {
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                dispatch(&state, &claims, client_id, &tx, &text).await;
            }
            Ok(Message::Close(_)) => {
                debug!(client_id = %client_id, "Control client closed");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(client_id = %client_id, error = %e, "Control receive error");
                break;
            }
        }
    }

    state.coordinator.client_disconnected(client_id).await;
    writer.abort();
    info!(client_id = %client_id, "Control client disconnected");
}

async fn dispatch(
    state: &AppState,
    claims: &AccessTokenClaims,
    client_id: Uuid,
    tx: &mpsc::UnboundedSender<String>,
    text: &str,
) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(client_id = %client_id, error = %e, "Unparseable control frame");
            let _ = tx.send(protocol_error("Invalid message"));
            return;
        }
    };

    let user_id = claims.id;
    let coordinator = &state.coordinator;

    let result: Result<(), services::coordinator::CoordinatorError> = async {
        match message {
            ClientMessage::StartNewSession(payload) => {
                let started = coordinator
                    .start_session(
                        user_id,
                        &payload.first_name,
                        &payload.last_name,
                        payload.dob,
                    )
                    .await?;
                send(tx, &ServerEvent::SessionStarted(started));

                let conversations = coordinator.list_conversations(user_id).await?;
                send(tx, &ServerEvent::ConversationList(conversations));
            }
            ClientMessage::SelectConversation(reference) => {
                let client = ClientHandle::new(client_id, user_id, tx.clone());
                let selected = coordinator
                    .select_conversation(user_id, reference.conversation_id, client)
                    .await?;
                send(tx, &ServerEvent::ConversationSelected(selected));
            }
            ClientMessage::GetConversations => {
                let conversations = coordinator.list_conversations(user_id).await?;
                send(tx, &ServerEvent::ConversationList(conversations));
            }
            ClientMessage::GetMessages(reference) => {
                let messages = coordinator
                    .get_messages(user_id, reference.conversation_id)
                    .await?;
                send(tx, &ServerEvent::MessageList(messages));
            }
            ClientMessage::GetActions(reference) => {
                let actions = coordinator
                    .get_actions(user_id, reference.conversation_id)
                    .await?;
                send(tx, &ServerEvent::ActionList(actions));
            }
            ClientMessage::GetSummary(reference) => {
                let summary = coordinator
                    .get_summary(user_id, reference.conversation_id)
                    .await?;
                send(tx, &ServerEvent::SummaryData(summary));
            }
            ClientMessage::GetMedicalHistory(reference) => {
                let history = coordinator
                    .get_medical_history(user_id, reference.conversation_id)
                    .await?;
                send(tx, &ServerEvent::MedicalHistoryData(history));
            }
            ClientMessage::EndSession(reference) => {
                let ended = coordinator
                    .end_and_summarize(user_id, reference.conversation_id)
                    .await?;
                send(tx, &ServerEvent::SessionEndedAndSummarized(ended));
            }
            ClientMessage::ChatMessage(payload) => {
                let conversation_id = state
                    .coordinator
                    .hub()
                    .conversation_of(client_id)
                    .await
                    .ok_or_else(|| {
                        services::coordinator::CoordinatorError::InternalError(
                            "No conversation selected".to_string(),
                        )
                    })?;
                let message = coordinator
                    .record_chat_message(user_id, conversation_id, &payload.text)
                    .await?;
                send(tx, &ServerEvent::MessageReceived(message));
            }
        }
        Ok(())
    }
    .await;

    if let Err(e) = result {
        warn!(client_id = %client_id, error = %e, "Control request failed");
        send(tx, &ServerEvent::error(e.to_string()));
    }
}

fn send(tx: &mpsc::UnboundedSender<String>, event: &ServerEvent) {
    let _ = tx.send(event.to_json());
}

async fn close_with(socket: &mut WebSocket, code: u16, reason: &str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await;
}

//! HTTP reads over conversations, auxiliary to the control channel

use crate::middleware::AuthenticatedUser;
use crate::models::ErrorResponse;
use crate::routes::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use services::coordinator::CoordinatorError;
use tracing::error;
use uuid::Uuid;

fn coordinator_error_response(error: CoordinatorError) -> (StatusCode, Json<ErrorResponse>) {
    match error {
        CoordinatorError::ConversationNotFound => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                "Conversation not found".to_string(),
                "not_found".to_string(),
            )),
        ),
        CoordinatorError::InternalError(message) => {
            error!(error = %message, "Coordinator internal error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    "Internal error".to_string(),
                    "server_error".to_string(),
                )),
            )
        }
    }
}

/// GET /conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
) -> impl IntoResponse {
    match state.coordinator.list_conversations(claims.id).await {
        Ok(conversations) => Json(conversations).into_response(),
        Err(e) => coordinator_error_response(e).into_response(),
    }
}

/// GET /conversations/{conversation_id}/actions
pub async fn list_conversation_actions(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
    Path(conversation_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.coordinator.get_actions(claims.id, conversation_id).await {
        Ok(payload) => Json(payload.actions).into_response(),
        Err(e) => coordinator_error_response(e).into_response(),
    }
}

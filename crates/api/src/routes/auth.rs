//! HTTP authentication routes: the token source for the control channel

use crate::middleware::AuthenticatedUser;
use crate::models::{ErrorResponse, LoginRequest, RefreshRequest, RegisterRequest};
use crate::routes::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use services::auth::AuthError;
use tracing::error;

fn auth_error_response(error: AuthError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, error_type) = match &error {
        AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
        AuthError::UsernameTaken => (StatusCode::CONFLICT, "username_taken"),
        AuthError::WeakPassword => (StatusCode::BAD_REQUEST, "weak_password"),
        AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token"),
        AuthError::InternalError(message) => {
            error!(error = %message, "Auth internal error");
            (StatusCode::INTERNAL_SERVER_ERROR, "server_error")
        }
    };

    (
        status,
        Json(ErrorResponse::new(error.to_string(), error_type.to_string())),
    )
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> impl IntoResponse {
    match state
        .auth
        .register(&request.username, &request.password)
        .await
    {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(e) => auth_error_response(e).into_response(),
    }
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> impl IntoResponse {
    match state.auth.login(&request.username, &request.password).await {
        Ok(tokens) => Json(tokens).into_response(),
        Err(e) => auth_error_response(e).into_response(),
    }
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> impl IntoResponse {
    match state.auth.refresh(&request.refresh_token).await {
        Ok(tokens) => Json(tokens).into_response(),
        Err(e) => auth_error_response(e).into_response(),
    }
}

pub async fn me(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
) -> impl IntoResponse {
    match state.auth.current_user_by_id(claims.id).await {
        Ok(user) => Json(user).into_response(),
        Err(e) => auth_error_response(e).into_response(),
    }
}

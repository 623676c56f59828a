pub mod middleware;
pub mod models;
pub mod routes;

use crate::middleware::{auth_middleware, AuthState};
use crate::routes::AppState;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

/// Build the full application router
///
/// The control channel hangs off the root path; the audio channel lives at
/// /transcription; the REST surface covers auth and read-only conversation
/// queries.
pub fn build_router(state: AppState) -> Router {
    let auth_state = AuthState {
        auth: state.auth.clone(),
    };

    let auth_routes = Router::new()
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/refresh", post(routes::auth::refresh))
        .route(
            "/auth/me",
            get(routes::auth::me).layer(from_fn_with_state(auth_state.clone(), auth_middleware)),
        );

    let conversation_routes = Router::new()
        .route("/conversations", get(routes::conversations::list_conversations))
        .route(
            "/conversations/{conversation_id}/actions",
            get(routes::conversations::list_conversation_actions),
        )
        .layer(from_fn_with_state(auth_state, auth_middleware));

    Router::new()
        .route("/", get(routes::control::control_handler))
        .route(
            "/transcription",
            get(routes::transcription::transcription_handler),
        )
        .merge(auth_routes)
        .merge(conversation_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

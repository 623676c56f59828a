// Bearer-token authentication middleware
//
// Validates the Authorization header on HTTP routes and adds the token
// claims to request extensions. The control channel does its own query
// parameter validation; this middleware covers the REST surface only.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::Response,
};
use services::auth::{AccessTokenClaims, AuthService};
use std::sync::Arc;
use tracing::debug;

/// Claims extracted from a validated bearer token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub AccessTokenClaims);

#[derive(Clone)]
pub struct AuthState {
    pub auth: Arc<AuthService>,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer(&request)?;

    match state.auth.verify_access_token(token) {
        Ok(claims) => {
            debug!(user_id = %claims.id, "Authenticated request");
            request.extensions_mut().insert(AuthenticatedUser(claims));
            Ok(next.run(request).await)
        }
        Err(_) => Err(StatusCode::UNAUTHORIZED),
    }
}

fn extract_bearer(request: &Request) -> Result<&str, StatusCode> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)
}

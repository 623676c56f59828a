pub mod auth;
pub mod control;
pub mod conversations;
pub mod transcription;

use services::auth::AuthService;
use services::ConversationCoordinator;
use std::sync::Arc;

/// Shared state for all routes
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<ConversationCoordinator>,
    pub auth: Arc<AuthService>,
}

//! Upstream provider clients
//!
//! This crate holds the clients for the OpenAI-style upstream services the
//! interpreter depends on: chat completions (language detection, translation,
//! command detection, summaries), speech synthesis, and the realtime
//! transcription WebSocket protocol.

pub mod chat;
pub mod models;
pub mod realtime;
pub mod speech;

pub use chat::ChatClient;
pub use models::*;
pub use speech::SpeechClient;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error {status_code}: {message}")]
    HttpError { status_code: u16, message: String },
    #[error("Request failed: {0}")]
    RequestError(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("WebSocket error: {0}")]
    WebSocketError(String),
}

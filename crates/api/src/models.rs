//! Wire models for the HTTP surface and the control/audio channels

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==================== HTTP ====================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
}

impl ErrorResponse {
    pub fn new(message: String, error_type: String) -> Self {
        Self {
            error: ErrorDetail {
                message,
                error_type,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

// ==================== Control channel ====================

/// Messages clients send on the control channel
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    StartNewSession(StartNewSessionPayload),
    SelectConversation(ConversationRef),
    GetConversations,
    GetMessages(ConversationRef),
    GetActions(ConversationRef),
    GetSummary(ConversationRef),
    GetMedicalHistory(ConversationRef),
    EndSession(ConversationRef),
    ChatMessage(ChatMessagePayload),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartNewSessionPayload {
    pub first_name: String,
    pub last_name: String,
    /// ISO date, normalized to a UTC calendar date
    pub dob: NaiveDate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRef {
    pub conversation_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessagePayload {
    pub text: String,
}

/// Flat protocol error frame; the connection stays open after sending it
pub fn protocol_error(text: &str) -> String {
    serde_json::json!({ "type": "error", "text": text }).to_string()
}

// ==================== Audio channel ====================

/// Frames clients send on the audio channel
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum AudioFrame {
    #[serde(rename = "input_audio_buffer.append")]
    Append {
        /// Base64-encoded container/codec chunk
        audio: String,
    },
    #[serde(rename = "input_audio_buffer.finalize")]
    Finalize,
    #[serde(rename = "input_audio_buffer.pause")]
    Pause,
    #[serde(rename = "input_audio_buffer.resume")]
    Resume,
}

/// Greeting sent when an audio socket opens
pub fn backend_connected(status: &str) -> String {
    serde_json::json!({ "type": "backend_connected", "status": status }).to_string()
}

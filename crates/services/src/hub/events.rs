use crate::actions::models::AggregatedAction;
use crate::commands::models::CommandExecutionResult;
use crate::conversations::models::{Conversation, ConversationStatus, Message};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelopes sent to control-channel clients
///
/// This is the closed set: components publish by handing one of these to
/// the hub (or directly to the requesting client), never by shaping JSON
/// ad hoc.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    SessionStarted(SessionStartedPayload),
    ConversationSelected(ConversationSelectedPayload),
    ConversationList(Vec<Conversation>),
    MessageList(MessageListPayload),
    ActionList(ActionListPayload),
    SummaryData(SummaryPayload),
    MedicalHistoryData(MedicalHistoryPayload),
    SessionEndedAndSummarized(SessionEndedPayload),
    MessageReceived(Message),

    NewMessage(Message),
    TranscriptionStarted,
    TranslationStarted,
    ProcessingCompleted,
    TtsAudio(TtsAudioPayload),
    ActionCreated(AggregatedAction),
    CommandExecuted(CommandExecutionResult),
    OpenaiConnected,
    OpenaiDisconnected,
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            message: message.into(),
        })
    }

    pub fn to_json(&self) -> String {
        // The envelope set contains no non-serializable values
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialize server event");
            r#"{"type":"error","payload":{"message":"internal serialization error"}}"#.to_string()
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartedPayload {
    pub conversation_id: Uuid,
    pub patient_id: Uuid,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSelectedPayload {
    pub conversation_id: Uuid,
    pub is_active: bool,
    pub status: ConversationStatus,
    pub summary: Option<String>,
    pub patient_language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageListPayload {
    pub conversation_id: Uuid,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionListPayload {
    pub conversation_id: Uuid,
    pub actions: Vec<AggregatedAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryPayload {
    pub conversation_id: Uuid,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalHistoryPayload {
    pub conversation_id: Uuid,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndedPayload {
    pub conversation_id: Uuid,
    pub status: ConversationStatus,
    pub summary: Option<String>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsAudioPayload {
    pub audio_base64: String,
    pub format: String,
    pub original_message_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_envelope_shape() {
        let event = ServerEvent::TtsAudio(TtsAudioPayload {
            audio_base64: "bXAz".to_string(),
            format: "audio/mpeg".to_string(),
            original_message_id: Uuid::nil(),
        });

        let json: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(json["type"], "tts_audio");
        assert_eq!(json["payload"]["audioBase64"], "bXAz");
        assert_eq!(json["payload"]["format"], "audio/mpeg");
    }

    #[test]
    fn unit_events_have_no_payload() {
        let json: serde_json::Value =
            serde_json::from_str(&ServerEvent::OpenaiConnected.to_json()).unwrap();
        assert_eq!(json["type"], "openai_connected");
        assert!(json.get("payload").is_none());
    }
}

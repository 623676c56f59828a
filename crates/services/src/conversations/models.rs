use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a conversation
///
/// `Ended`, `EndedError`, and `Summarized` are terminal; a conversation
/// never returns to `Active` once it has left it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Ended,
    EndedError,
    Summarized,
}

impl ConversationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConversationStatus::Active)
    }
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationStatus::Active => write!(f, "active"),
            ConversationStatus::Ended => write!(f, "ended"),
            ConversationStatus::EndedError => write!(f, "ended_error"),
            ConversationStatus::Summarized => write!(f, "summarized"),
        }
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ConversationStatus::Active),
            "ended" => Ok(ConversationStatus::Ended),
            "ended_error" => Ok(ConversationStatus::EndedError),
            "summarized" => Ok(ConversationStatus::Summarized),
            other => Err(format!("Unknown conversation status: {other}")),
        }
    }
}

/// Conversation model - one live or historical interpreting session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub patient_id: Uuid,
    pub status: ConversationStatus,
    /// Most recently detected non-English language of a patient utterance
    /// (ISO 639-1); defaults to "es" at session start and never becomes "en"
    pub patient_language: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Role attached to a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    /// The clinician
    User,
    Patient,
    /// A derived message attached to an original via `original_message_id`
    Translation,
}

impl std::fmt::Display for SenderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SenderType::User => write!(f, "user"),
            SenderType::Patient => write!(f, "patient"),
            SenderType::Translation => write!(f, "translation"),
        }
    }
}

impl std::str::FromStr for SenderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(SenderType::User),
            "patient" => Ok(SenderType::Patient),
            "translation" => Ok(SenderType::Translation),
            other => Err(format!("Unknown sender type: {other}")),
        }
    }
}

/// Message model - append-only transcript entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_type: SenderType,
    /// ISO 639-1 code, or "unknown"
    pub language: String,
    pub original_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_message_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

/// Fields for inserting a new message
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_type: SenderType,
    pub language: String,
    pub original_text: String,
    pub translated_text: Option<String>,
    pub original_message_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            ConversationStatus::Active,
            ConversationStatus::Ended,
            ConversationStatus::EndedError,
            ConversationStatus::Summarized,
        ] {
            let parsed: ConversationStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("archived".parse::<ConversationStatus>().is_err());
    }

    #[test]
    fn only_active_is_non_terminal() {
        assert!(!ConversationStatus::Active.is_terminal());
        assert!(ConversationStatus::Ended.is_terminal());
        assert!(ConversationStatus::EndedError.is_terminal());
        assert!(ConversationStatus::Summarized.is_terminal());
    }

    #[test]
    fn message_serializes_with_camel_case_keys() {
        let message = Message {
            id: Uuid::nil(),
            conversation_id: Uuid::nil(),
            sender_type: SenderType::Patient,
            language: "es".to_string(),
            original_text: "Me duele la cabeza".to_string(),
            translated_text: None,
            original_message_id: None,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["senderType"], "patient");
        assert_eq!(json["originalText"], "Me duele la cabeza");
        assert!(json.get("translatedText").is_none());
    }
}

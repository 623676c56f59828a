use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Note recorded from a clinician voice command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub content: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Time unit for follow-up scheduling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FollowUpUnit {
    Day,
    Week,
    Month,
}

impl std::fmt::Display for FollowUpUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FollowUpUnit::Day => write!(f, "day"),
            FollowUpUnit::Week => write!(f, "week"),
            FollowUpUnit::Month => write!(f, "month"),
        }
    }
}

impl std::str::FromStr for FollowUpUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" | "days" => Ok(FollowUpUnit::Day),
            "week" | "weeks" => Ok(FollowUpUnit::Week),
            "month" | "months" => Ok(FollowUpUnit::Month),
            other => Err(format!("Unknown follow-up unit: {other}")),
        }
    }
}

/// Scheduled follow-up appointment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUp {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub duration: i32,
    pub unit: FollowUpUnit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub scheduled_for: DateTime<Utc>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a new follow-up
#[derive(Debug, Clone)]
pub struct NewFollowUp {
    pub conversation_id: Uuid,
    pub duration: i32,
    pub unit: FollowUpUnit,
    pub details: Option<String>,
    pub scheduled_for: DateTime<Utc>,
}

/// Prescription recorded from a clinician voice command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a new prescription
#[derive(Debug, Clone)]
pub struct NewPrescription {
    pub conversation_id: Uuid,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub details: Option<String>,
}

/// Conversation summary (1:1 with a conversation)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub conversation_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Generated patient medical history (1:1 with a conversation)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalHistory {
    pub conversation_id: Uuid,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

/// Kind of an aggregated action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Note,
    Followup,
    Prescription,
}

/// Uniform projection of Note/FollowUp/Prescription for display and
/// transport, sorted by creation time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedAction {
    pub id: Uuid,
    pub conversation_id: Uuid,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl From<&Note> for AggregatedAction {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id,
            conversation_id: note.conversation_id,
            action_type: ActionType::Note,
            status: note.status.clone(),
            created_at: note.created_at,
            updated_at: note.updated_at,
            data: serde_json::json!({ "content": note.content }),
        }
    }
}

impl From<&FollowUp> for AggregatedAction {
    fn from(follow_up: &FollowUp) -> Self {
        Self {
            id: follow_up.id,
            conversation_id: follow_up.conversation_id,
            action_type: ActionType::Followup,
            status: follow_up.status.clone(),
            created_at: follow_up.created_at,
            updated_at: follow_up.updated_at,
            data: serde_json::json!({
                "duration": follow_up.duration,
                "unit": follow_up.unit,
                "details": follow_up.details,
                "scheduledFor": follow_up.scheduled_for,
            }),
        }
    }
}

impl From<&Prescription> for AggregatedAction {
    fn from(prescription: &Prescription) -> Self {
        Self {
            id: prescription.id,
            conversation_id: prescription.conversation_id,
            action_type: ActionType::Prescription,
            status: prescription.status.clone(),
            created_at: prescription.created_at,
            updated_at: prescription.updated_at,
            data: serde_json::json!({
                "medicationName": prescription.medication_name,
                "dosage": prescription.dosage,
                "frequency": prescription.frequency,
                "details": prescription.details,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregated_note_keeps_identity_and_payload() {
        let now = Utc::now();
        let note = Note {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            content: "patient reports headache".to_string(),
            status: "active".to_string(),
            created_at: now,
            updated_at: now,
        };

        let action = AggregatedAction::from(&note);
        assert_eq!(action.id, note.id);
        assert_eq!(action.action_type, ActionType::Note);
        assert_eq!(action.status, "active");
        assert_eq!(action.data["content"], "patient reports headache");

        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "note");
        assert_eq!(json["conversationId"], note.conversation_id.to_string());
    }

    #[test]
    fn follow_up_unit_parsing_accepts_plurals() {
        assert_eq!("weeks".parse::<FollowUpUnit>().unwrap(), FollowUpUnit::Week);
        assert_eq!("day".parse::<FollowUpUnit>().unwrap(), FollowUpUnit::Day);
        assert!("fortnight".parse::<FollowUpUnit>().is_err());
    }
}

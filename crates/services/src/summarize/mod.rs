//! Conversation summarization and medical-history generation

pub mod ports;

pub use ports::Summarizer;

use crate::actions::models::{FollowUp, Note, Prescription};
use crate::conversations::models::{Message, SenderType};
use async_trait::async_trait;
use providers::{ChatClient, ChatCompletionParams, ChatMessage};
use std::sync::Arc;
use tracing::warn;

pub struct LlmSummarizer {
    chat: Arc<ChatClient>,
    model: String,
}

impl LlmSummarizer {
    pub fn new(chat: Arc<ChatClient>, model: String) -> Self {
        Self { chat, model }
    }

    async fn complete(&self, system: &str, user: String) -> Option<String> {
        let params = ChatCompletionParams {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: Some(0.3),
            max_tokens: None,
            tools: None,
            tool_choice: None,
        };

        match self.chat.chat_completion(params).await {
            Ok(response) => {
                let text = response.first_text().unwrap_or_default().trim().to_string();
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
            Err(e) => {
                warn!(error = %e, "Summarization request failed");
                None
            }
        }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize_conversation(&self, context: &str) -> Option<String> {
        self.complete(
            "Summarize this medical conversation for the clinical record. Cover the \
             chief complaint, findings, and the recorded actions. Be concise and factual.",
            context.to_string(),
        )
        .await
    }

    async fn generate_medical_history(&self, patient_context: &str) -> Option<String> {
        self.complete(
            "Produce a brief medical history overview for this patient from the \
             information provided. If there is little to go on, say so plainly.",
            patient_context.to_string(),
        )
        .await
    }
}

/// Render messages and recorded actions into the text block handed to the
/// summarizer.
pub fn format_transcript(
    messages: &[Message],
    notes: &[Note],
    prescriptions: &[Prescription],
    follow_ups: &[FollowUp],
) -> String {
    let mut out = String::new();

    for message in messages {
        let body = match message.sender_type {
            SenderType::Translation => message
                .translated_text
                .as_deref()
                .unwrap_or(&message.original_text),
            _ => &message.original_text,
        };
        match (message.sender_type, message.original_message_id) {
            (SenderType::Translation, Some(original_id)) => {
                out.push_str(&format!(
                    "translation ({}, of {}): {}\n",
                    message.language, original_id, body
                ));
            }
            _ => {
                out.push_str(&format!(
                    "{} ({}): {}\n",
                    message.sender_type, message.language, body
                ));
            }
        }
    }

    if !notes.is_empty() || !prescriptions.is_empty() || !follow_ups.is_empty() {
        out.push_str("\n--- Recorded Actions ---\n");
        for note in notes {
            out.push_str(&format!("Note: {}\n", note.content));
        }
        for prescription in prescriptions {
            out.push_str(&format!(
                "Prescription: {} {} {}{}\n",
                prescription.medication_name,
                prescription.dosage,
                prescription.frequency,
                prescription
                    .details
                    .as_deref()
                    .map(|d| format!(" ({d})"))
                    .unwrap_or_default(),
            ));
        }
        for follow_up in follow_ups {
            out.push_str(&format!(
                "Follow-up: in {} {}(s){}\n",
                follow_up.duration,
                follow_up.unit,
                follow_up
                    .details
                    .as_deref()
                    .map(|d| format!(" - {d}"))
                    .unwrap_or_default(),
            ));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::models::FollowUpUnit;
    use chrono::Utc;
    use uuid::Uuid;

    fn message(
        sender_type: SenderType,
        language: &str,
        original: &str,
        translated: Option<&str>,
        original_message_id: Option<Uuid>,
    ) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::nil(),
            sender_type,
            language: language.to_string(),
            original_text: original.to_string(),
            translated_text: translated.map(str::to_string),
            original_message_id,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn transcript_uses_translated_body_for_translations() {
        let original_id = Uuid::new_v4();
        let messages = vec![
            message(SenderType::Patient, "es", "Me duele la cabeza", None, None),
            message(
                SenderType::Translation,
                "en",
                "Me duele la cabeza",
                Some("My head hurts"),
                Some(original_id),
            ),
        ];

        let transcript = format_transcript(&messages, &[], &[], &[]);
        assert!(transcript.contains("patient (es): Me duele la cabeza"));
        assert!(transcript.contains(&format!("translation (en, of {original_id}): My head hurts")));
        assert!(!transcript.contains("Recorded Actions"));
    }

    #[test]
    fn transcript_appends_recorded_actions_block() {
        let now = Utc::now();
        let notes = vec![Note {
            id: Uuid::new_v4(),
            conversation_id: Uuid::nil(),
            content: "patient reports headache".to_string(),
            status: "active".to_string(),
            created_at: now,
            updated_at: now,
        }];
        let follow_ups = vec![FollowUp {
            id: Uuid::new_v4(),
            conversation_id: Uuid::nil(),
            duration: 2,
            unit: FollowUpUnit::Week,
            details: None,
            scheduled_for: now,
            status: "scheduled".to_string(),
            created_at: now,
            updated_at: now,
        }];

        let transcript = format_transcript(&[], &notes, &[], &follow_ups);
        assert!(transcript.contains("--- Recorded Actions ---"));
        assert!(transcript.contains("Note: patient reports headache"));
        assert!(transcript.contains("Follow-up: in 2 week(s)"));
    }
}

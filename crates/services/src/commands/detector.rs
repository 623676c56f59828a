//! LLM-backed command detection
//!
//! Exposes the five clinical tools to the chat model as function specs and
//! maps the first tool call back to a `CommandInvocation`.

use crate::commands::models::CommandInvocation;
use crate::commands::ports::CommandDetector;
use async_trait::async_trait;
use providers::{ChatClient, ChatCompletionParams, ChatMessage, ToolSpec};
use std::sync::Arc;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You analyze a clinician's utterance from a live medical \
conversation. If the utterance is a voice command, call the matching tool with the \
arguments taken from the utterance. If it is ordinary speech, do not call any tool.";

pub struct LlmCommandDetector {
    chat: Arc<ChatClient>,
    model: String,
}

impl LlmCommandDetector {
    pub fn new(chat: Arc<ChatClient>, model: String) -> Self {
        Self { chat, model }
    }

    fn tool_specs() -> Vec<ToolSpec> {
        vec![
            ToolSpec::function(
                "take_note",
                "Record a clinical note about the patient",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "note_content": { "type": "string", "description": "The note text" }
                    },
                    "required": ["note_content"]
                }),
            ),
            ToolSpec::function(
                "schedule_follow_up",
                "Schedule a follow-up appointment",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "duration": { "type": "number", "description": "How many units from now" },
                        "unit": { "type": "string", "enum": ["day", "week", "month"] },
                        "details": { "type": "string" }
                    },
                    "required": ["duration", "unit"]
                }),
            ),
            ToolSpec::function(
                "write_prescription",
                "Record a prescription",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "medication_name": { "type": "string" },
                        "dosage": { "type": "string" },
                        "frequency": { "type": "string" },
                        "details": { "type": "string" }
                    },
                    "required": ["medication_name", "dosage", "frequency"]
                }),
            ),
            ToolSpec::function(
                "request_summary",
                "Request a summary of the conversation so far",
                serde_json::json!({ "type": "object", "properties": {} }),
            ),
            ToolSpec::function(
                "request_medical_history",
                "Request the patient's medical history",
                serde_json::json!({ "type": "object", "properties": {} }),
            ),
        ]
    }
}

#[async_trait]
impl CommandDetector for LlmCommandDetector {
    async fn detect(&self, text: &str) -> Option<CommandInvocation> {
        let params = ChatCompletionParams {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(text)],
            temperature: Some(0.0),
            max_tokens: None,
            tools: Some(Self::tool_specs()),
            tool_choice: Some("auto".to_string()),
        };

        let response = match self.chat.chat_completion(params).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Command detection request failed");
                return None;
            }
        };

        let call = response.first_tool_call()?;
        let arguments = match serde_json::from_str(&call.function.arguments) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    error = %e,
                    tool = %call.function.name,
                    "Tool call arguments were not valid JSON"
                );
                return None;
            }
        };

        debug!(tool = %call.function.name, "Detected voice command");
        Some(CommandInvocation {
            tool_name: call.function.name.clone(),
            arguments,
        })
    }
}

//! Language detection and translation
//!
//! Both operations degrade gracefully: detection falls back to "unknown"
//! and translation to `None` when the upstream model fails, so the
//! pipeline never stalls on them.

pub mod ports;

pub use ports::LanguageService;

use async_trait::async_trait;
use providers::{ChatClient, ChatCompletionParams, ChatMessage};
use std::sync::Arc;
use tracing::{debug, warn};

pub const UNKNOWN_LANGUAGE: &str = "unknown";

pub struct LlmLanguageService {
    chat: Arc<ChatClient>,
    model: String,
}

impl LlmLanguageService {
    pub fn new(chat: Arc<ChatClient>, model: String) -> Self {
        Self { chat, model }
    }

    fn params(&self, system: &str, user: String) -> ChatCompletionParams {
        ChatCompletionParams {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: Some(0.0),
            max_tokens: None,
            tools: None,
            tool_choice: None,
        }
    }
}

#[async_trait]
impl LanguageService for LlmLanguageService {
    async fn detect_language(&self, text: &str) -> String {
        let params = self.params(
            "Identify the predominant language of the user's text. Respond with only \
             its two-letter lowercase ISO 639-1 code, nothing else.",
            text.to_string(),
        );

        match self.chat.chat_completion(params).await {
            Ok(response) => {
                let code = normalize_language_code(response.first_text().unwrap_or_default());
                debug!(language = %code, "Detected language");
                code
            }
            Err(e) => {
                warn!(error = %e, "Language detection failed");
                UNKNOWN_LANGUAGE.to_string()
            }
        }
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> Option<String> {
        let params = self.params(
            "You are a medical interpreter. Translate the user's text faithfully, \
             preserving clinical meaning. Respond with only the translation.",
            format!("Translate from {source} to {target}:\n\n{text}"),
        );

        match self.chat.chat_completion(params).await {
            Ok(response) => {
                let translation = response.first_text().unwrap_or_default().trim().to_string();
                if translation.is_empty() {
                    None
                } else {
                    Some(translation)
                }
            }
            Err(e) => {
                warn!(error = %e, source, target, "Translation failed");
                None
            }
        }
    }
}

/// Accept only a bare two-letter lowercase ISO 639-1 code; anything else
/// is classified as unknown.
pub fn normalize_language_code(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'' || c == '.');
    if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_lowercase()) {
        trimmed.to_string()
    } else {
        UNKNOWN_LANGUAGE.to_string()
    }
}

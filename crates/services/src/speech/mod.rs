//! Text-to-speech synthesis
//!
//! Wraps the upstream speech client behind a port the pipeline can mock.
//! Synthesis failures degrade to `None`; the pipeline simply skips the
//! audio broadcast.

pub mod ports;

pub use ports::{SpeechSynthesizer, SynthesizedSpeech};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use providers::{SpeechClient, SpeechParams};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct OpenAiSpeechSynthesizer {
    client: Arc<SpeechClient>,
    model: String,
    voice: String,
}

impl OpenAiSpeechSynthesizer {
    pub fn new(client: Arc<SpeechClient>, model: String, voice: String) -> Self {
        Self {
            client,
            model,
            voice,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeechSynthesizer {
    async fn synthesize(&self, text: &str, language_hint: &str) -> Option<SynthesizedSpeech> {
        if text.trim().is_empty() {
            return None;
        }

        debug!(language = %language_hint, characters = text.chars().count(), "Synthesizing speech");

        let params = SpeechParams {
            model: self.model.clone(),
            input: text.to_string(),
            voice: self.voice.clone(),
            response_format: Some("mp3".to_string()),
            speed: None,
        };

        match self.client.synthesize(params).await {
            Ok(response) if response.audio_data.is_empty() => None,
            Ok(response) => Some(SynthesizedSpeech {
                audio_base64: BASE64.encode(&response.audio_data),
                format: "audio/mpeg".to_string(),
            }),
            Err(e) => {
                warn!(error = %e, "Speech synthesis failed");
                None
            }
        }
    }
}

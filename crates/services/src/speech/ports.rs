use async_trait::async_trait;

/// Synthesized audio ready for the control channel
#[derive(Debug, Clone)]
pub struct SynthesizedSpeech {
    pub audio_base64: String,
    pub format: String,
}

/// Contract for turning text into speech
///
/// `language_hint` is the ISO 639-1 code of the text. `None` means the
/// synthesis failed or produced no audio; callers skip the broadcast.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, language_hint: &str) -> Option<SynthesizedSpeech>;
}

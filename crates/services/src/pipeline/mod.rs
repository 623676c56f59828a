//! Post-transcription pipeline
//!
//! Runs once per completed utterance: language detection, sender
//! classification, persistence, the translation decision, speech
//! synthesis, and the ordered broadcasts, with command detection spawned
//! alongside for clinician utterances. Utterances of one conversation are
//! fed through here in arrival order by the conversation runtime.

use crate::commands::ports::CommandDetector;
use crate::commands::service::CommandService;
use crate::conversations::models::{Conversation, NewMessage, SenderType};
use crate::conversations::ports::{ConversationRepository, MessageRepository};
use crate::hub::{NotificationHub, ServerEvent, TtsAudioPayload};
use crate::language::ports::LanguageService;
use crate::speech::ports::SpeechSynthesizer;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const ENGLISH: &str = "en";
const UNKNOWN: &str = "unknown";

pub struct TranscriptPipeline {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    language: Arc<dyn LanguageService>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    detector: Arc<dyn CommandDetector>,
    commands: Arc<CommandService>,
    hub: Arc<NotificationHub>,
}

impl TranscriptPipeline {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        language: Arc<dyn LanguageService>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        detector: Arc<dyn CommandDetector>,
        commands: Arc<CommandService>,
        hub: Arc<NotificationHub>,
    ) -> Self {
        Self {
            conversations,
            messages,
            language,
            synthesizer,
            detector,
            commands,
            hub,
        }
    }

    /// Process one completed utterance end to end
    pub async fn process_utterance(self: &Arc<Self>, conversation_id: Uuid, transcript: &str) {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            debug!(conversation_id = %conversation_id, "Dropping empty transcript");
            return;
        }

        let detected = self.language.detect_language(transcript).await;
        let sender_type = if detected == ENGLISH || detected == UNKNOWN {
            SenderType::User
        } else {
            SenderType::Patient
        };

        info!(
            conversation_id = %conversation_id,
            language = %detected,
            sender = %sender_type,
            "Processing utterance"
        );

        // Clinician utterances also go through command detection; that
        // branch reports its own results and never blocks this sequence.
        if sender_type == SenderType::User {
            self.spawn_command_branch(conversation_id, transcript.to_string());
        }

        let conversation = match self.conversations.get_by_id(conversation_id).await {
            Ok(Some(conversation)) => conversation,
            Ok(None) => {
                warn!(conversation_id = %conversation_id, "Utterance for unknown conversation");
                return;
            }
            Err(e) => {
                warn!(error = %e, conversation_id = %conversation_id, "Failed to load conversation");
                return;
            }
        };
        if conversation.status.is_terminal() {
            debug!(conversation_id = %conversation_id, "Dropping utterance for ended conversation");
            return;
        }

        self.hub
            .broadcast(conversation_id, &ServerEvent::TranscriptionStarted)
            .await;

        let original = match self
            .messages
            .create(NewMessage {
                conversation_id,
                sender_type,
                language: detected.clone(),
                original_text: transcript.to_string(),
                translated_text: None,
                original_message_id: None,
            })
            .await
        {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, conversation_id = %conversation_id, "Failed to persist message");
                self.hub
                    .broadcast(conversation_id, &ServerEvent::error("Failed to save message"))
                    .await;
                return;
            }
        };

        self.hub
            .broadcast(conversation_id, &ServerEvent::NewMessage(original.clone()))
            .await;

        // Translation decision
        let mut tts_text = transcript.to_string();
        let mut tts_language = detected.clone();

        if let Some((source, target)) =
            translation_route(sender_type, &detected, &conversation)
        {
            if sender_type == SenderType::Patient
                && conversation.patient_language.as_deref() != Some(detected.as_str())
            {
                if let Err(e) = self
                    .conversations
                    .update_patient_language(conversation_id, &detected)
                    .await
                {
                    warn!(error = %e, conversation_id = %conversation_id, "Failed to record patient language");
                }
            }

            self.hub
                .broadcast(conversation_id, &ServerEvent::TranslationStarted)
                .await;

            if let Some(translated) = self.language.translate(transcript, &source, &target).await
            {
                tts_text = translated.clone();
                tts_language = target.clone();

                match self
                    .messages
                    .create(NewMessage {
                        conversation_id,
                        sender_type: SenderType::Translation,
                        language: target.clone(),
                        original_text: transcript.to_string(),
                        translated_text: Some(translated),
                        original_message_id: Some(original.id),
                    })
                    .await
                {
                    Ok(translation_message) => {
                        self.hub
                            .broadcast(
                                conversation_id,
                                &ServerEvent::NewMessage(translation_message),
                            )
                            .await;
                    }
                    Err(e) => {
                        // The spoken translation still goes out
                        warn!(
                            error = %e,
                            conversation_id = %conversation_id,
                            "Failed to persist translation"
                        );
                    }
                }
            }
        }

        if let Some(speech) = self.synthesizer.synthesize(&tts_text, &tts_language).await {
            self.hub
                .broadcast(
                    conversation_id,
                    &ServerEvent::TtsAudio(TtsAudioPayload {
                        audio_base64: speech.audio_base64,
                        format: speech.format,
                        original_message_id: original.id,
                    }),
                )
                .await;
        }

        self.hub
            .broadcast(conversation_id, &ServerEvent::ProcessingCompleted)
            .await;
    }

    fn spawn_command_branch(self: &Arc<Self>, conversation_id: Uuid, text: String) {
        let pipeline = self.clone();
        tokio::spawn(async move {
            let Some(invocation) = pipeline.detector.detect(&text).await else {
                return;
            };
            let result = pipeline.commands.execute(conversation_id, invocation).await;
            pipeline
                .hub
                .broadcast(conversation_id, &ServerEvent::CommandExecuted(result))
                .await;
        });
    }
}

/// (source, target) languages for the translation step, if any
fn translation_route(
    sender_type: SenderType,
    detected: &str,
    conversation: &Conversation,
) -> Option<(String, String)> {
    match sender_type {
        SenderType::Patient if detected != ENGLISH && detected != UNKNOWN => {
            Some((detected.to_string(), ENGLISH.to_string()))
        }
        // An unknown-language utterance is classified as the clinician's
        // but is not assumed to be English, so it is never translated.
        SenderType::User if detected == ENGLISH => match conversation.patient_language.as_deref()
        {
            Some(patient_language) if patient_language != ENGLISH => {
                Some((ENGLISH.to_string(), patient_language.to_string()))
            }
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::models::{
        FollowUp, NewFollowUp, NewPrescription, Note, Prescription,
    };
    use crate::actions::ports::{FollowUpRepository, NoteRepository, PrescriptionRepository};
    use crate::commands::models::CommandInvocation;
    use crate::conversations::models::ConversationStatus;
    use crate::hub::ClientHandle;
    use crate::speech::ports::SynthesizedSpeech;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tokio::time::{timeout, Duration};

    struct StubLanguage {
        detected: String,
        translation: Option<String>,
    }

    #[async_trait]
    impl LanguageService for StubLanguage {
        async fn detect_language(&self, _text: &str) -> String {
            self.detected.clone()
        }

        async fn translate(&self, _text: &str, _source: &str, _target: &str) -> Option<String> {
            self.translation.clone()
        }
    }

    struct StubSynthesizer {
        audio: Option<&'static str>,
    }

    #[async_trait]
    impl SpeechSynthesizer for StubSynthesizer {
        async fn synthesize(&self, _text: &str, _language_hint: &str) -> Option<SynthesizedSpeech> {
            self.audio.map(|audio_base64| SynthesizedSpeech {
                audio_base64: audio_base64.to_string(),
                format: "audio/mpeg".to_string(),
            })
        }
    }

    struct StubDetector {
        invocation: Option<CommandInvocation>,
    }

    #[async_trait]
    impl CommandDetector for StubDetector {
        async fn detect(&self, _text: &str) -> Option<CommandInvocation> {
            self.invocation.clone()
        }
    }

    struct InMemoryConversations {
        conversations: Mutex<HashMap<Uuid, Conversation>>,
    }

    impl InMemoryConversations {
        fn with(conversation: Conversation) -> Self {
            let mut map = HashMap::new();
            map.insert(conversation.id, conversation);
            Self {
                conversations: Mutex::new(map),
            }
        }

        fn patient_language(&self, id: Uuid) -> Option<String> {
            self.conversations
                .lock()
                .unwrap()
                .get(&id)
                .and_then(|c| c.patient_language.clone())
        }
    }

    #[async_trait]
    impl ConversationRepository for InMemoryConversations {
        async fn create(
            &self,
            _user_id: Uuid,
            _patient_id: Uuid,
            _patient_language: &str,
        ) -> Result<Conversation> {
            unimplemented!("not used in pipeline tests")
        }

        async fn get_by_id(&self, id: Uuid) -> Result<Option<Conversation>> {
            Ok(self.conversations.lock().unwrap().get(&id).cloned())
        }

        async fn get_owned(&self, id: Uuid, _user_id: Uuid) -> Result<Option<Conversation>> {
            self.get_by_id(id).await
        }

        async fn list_by_user(&self, _user_id: Uuid) -> Result<Vec<Conversation>> {
            Ok(Vec::new())
        }

        async fn update_patient_language(&self, id: Uuid, language: &str) -> Result<()> {
            if let Some(conversation) = self.conversations.lock().unwrap().get_mut(&id) {
                conversation.patient_language = Some(language.to_string());
            }
            Ok(())
        }

        async fn finalize(
            &self,
            _id: Uuid,
            _status: ConversationStatus,
            _end_time: DateTime<Utc>,
        ) -> Result<Option<Conversation>> {
            unimplemented!("not used in pipeline tests")
        }

        async fn finalize_with_summary(
            &self,
            _id: Uuid,
            _summary: &str,
            _end_time: DateTime<Utc>,
        ) -> Result<Option<Conversation>> {
            unimplemented!("not used in pipeline tests")
        }
    }

    /// Message store that can be told to fail the nth create call
    struct InMemoryMessages {
        messages: Mutex<Vec<Message>>,
        calls: AtomicUsize,
        fail_on_call: Option<usize>,
    }

    use crate::conversations::models::Message;

    impl InMemoryMessages {
        fn new() -> Self {
            Self {
                messages: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                fail_on_call: None,
            }
        }

        fn failing_on(call: usize) -> Self {
            Self {
                fail_on_call: Some(call),
                ..Self::new()
            }
        }

        fn stored(&self) -> Vec<Message> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageRepository for InMemoryMessages {
        async fn create(&self, new_message: NewMessage) -> Result<Message> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on_call == Some(call) {
                return Err(anyhow!("injected write failure"));
            }

            let message = Message {
                id: Uuid::new_v4(),
                conversation_id: new_message.conversation_id,
                sender_type: new_message.sender_type,
                language: new_message.language,
                original_text: new_message.original_text,
                translated_text: new_message.translated_text,
                original_message_id: new_message.original_message_id,
                timestamp: Utc::now(),
            };
            self.messages.lock().unwrap().push(message.clone());
            Ok(message)
        }

        async fn list_by_conversation(&self, _conversation_id: Uuid) -> Result<Vec<Message>> {
            Ok(self.stored())
        }
    }

    struct NullNotes;

    #[async_trait]
    impl NoteRepository for NullNotes {
        async fn create(&self, conversation_id: Uuid, content: &str) -> Result<Note> {
            let now = Utc::now();
            Ok(Note {
                id: Uuid::new_v4(),
                conversation_id,
                content: content.to_string(),
                status: "active".to_string(),
                created_at: now,
                updated_at: now,
            })
        }

        async fn list_by_conversation(&self, _conversation_id: Uuid) -> Result<Vec<Note>> {
            Ok(Vec::new())
        }
    }

    struct NullFollowUps;

    #[async_trait]
    impl FollowUpRepository for NullFollowUps {
        async fn create(&self, _new_follow_up: NewFollowUp) -> Result<FollowUp> {
            Err(anyhow!("not used"))
        }

        async fn list_by_conversation(&self, _conversation_id: Uuid) -> Result<Vec<FollowUp>> {
            Ok(Vec::new())
        }
    }

    struct NullPrescriptions;

    #[async_trait]
    impl PrescriptionRepository for NullPrescriptions {
        async fn create(&self, _new_prescription: NewPrescription) -> Result<Prescription> {
            Err(anyhow!("not used"))
        }

        async fn list_by_conversation(&self, _conversation_id: Uuid) -> Result<Vec<Prescription>> {
            Ok(Vec::new())
        }
    }

    struct Fixture {
        pipeline: Arc<TranscriptPipeline>,
        conversations: Arc<InMemoryConversations>,
        messages: Arc<InMemoryMessages>,
        events: mpsc::UnboundedReceiver<String>,
        conversation_id: Uuid,
    }

    async fn fixture(
        patient_language: Option<&str>,
        status: ConversationStatus,
        language: StubLanguage,
        synthesizer: StubSynthesizer,
        detector: StubDetector,
        messages: InMemoryMessages,
    ) -> Fixture {
        let conversation_id = Uuid::new_v4();
        let conversation = Conversation {
            id: conversation_id,
            user_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            status,
            patient_language: patient_language.map(str::to_string),
            start_time: Utc::now(),
            end_time: None,
        };

        let conversations = Arc::new(InMemoryConversations::with(conversation));
        let messages = Arc::new(messages);
        let hub = Arc::new(NotificationHub::new());

        let (tx, events) = mpsc::unbounded_channel();
        hub.register_client(
            ClientHandle::new(Uuid::new_v4(), Uuid::new_v4(), tx),
            conversation_id,
        )
        .await;

        let commands = Arc::new(CommandService::new(
            Arc::new(NullNotes),
            Arc::new(NullFollowUps),
            Arc::new(NullPrescriptions),
            hub.clone(),
        ));

        let pipeline = Arc::new(TranscriptPipeline::new(
            conversations.clone(),
            messages.clone(),
            Arc::new(language),
            Arc::new(synthesizer),
            Arc::new(detector),
            commands,
            hub,
        ));

        Fixture {
            pipeline,
            conversations,
            messages,
            events,
            conversation_id,
        }
    }

    fn drain_types(events: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut types = Vec::new();
        while let Ok(frame) = events.try_recv() {
            let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
            types.push(value["type"].as_str().unwrap().to_string());
        }
        types
    }

    #[tokio::test]
    async fn spanish_patient_utterance_event_order() {
        let mut fx = fixture(
            Some("es"),
            ConversationStatus::Active,
            StubLanguage {
                detected: "es".to_string(),
                translation: Some("My head hurts".to_string()),
            },
            StubSynthesizer { audio: Some("bXAz") },
            StubDetector { invocation: None },
            InMemoryMessages::new(),
        )
        .await;

        fx.pipeline
            .process_utterance(fx.conversation_id, "Me duele la cabeza")
            .await;

        let types = drain_types(&mut fx.events);
        assert_eq!(
            types,
            vec![
                "transcription_started",
                "new_message",
                "translation_started",
                "new_message",
                "tts_audio",
                "processing_completed",
            ]
        );

        let stored = fx.messages.stored();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].sender_type, SenderType::Patient);
        assert_eq!(stored[0].language, "es");
        assert_eq!(stored[1].sender_type, SenderType::Translation);
        assert_eq!(stored[1].language, "en");
        assert_eq!(stored[1].original_message_id, Some(stored[0].id));
        assert_eq!(stored[1].translated_text.as_deref(), Some("My head hurts"));
    }

    #[tokio::test]
    async fn empty_transcript_produces_nothing() {
        let mut fx = fixture(
            Some("es"),
            ConversationStatus::Active,
            StubLanguage {
                detected: "es".to_string(),
                translation: None,
            },
            StubSynthesizer { audio: Some("bXAz") },
            StubDetector { invocation: None },
            InMemoryMessages::new(),
        )
        .await;

        fx.pipeline
            .process_utterance(fx.conversation_id, "   ")
            .await;

        assert!(drain_types(&mut fx.events).is_empty());
        assert!(fx.messages.stored().is_empty());
    }

    #[tokio::test]
    async fn unknown_language_is_clinician_without_translation() {
        let mut fx = fixture(
            Some("es"),
            ConversationStatus::Active,
            StubLanguage {
                detected: "unknown".to_string(),
                translation: Some("should not be used".to_string()),
            },
            StubSynthesizer { audio: Some("bXAz") },
            StubDetector { invocation: None },
            InMemoryMessages::new(),
        )
        .await;

        fx.pipeline
            .process_utterance(fx.conversation_id, "mumbled static")
            .await;

        let types = drain_types(&mut fx.events);
        assert_eq!(
            types,
            vec![
                "transcription_started",
                "new_message",
                "tts_audio",
                "processing_completed",
            ]
        );
        assert_eq!(fx.messages.stored()[0].sender_type, SenderType::User);
    }

    #[tokio::test]
    async fn clinician_english_translates_to_patient_language() {
        let mut fx = fixture(
            Some("es"),
            ConversationStatus::Active,
            StubLanguage {
                detected: "en".to_string(),
                translation: Some("¿Dónde le duele?".to_string()),
            },
            StubSynthesizer { audio: Some("bXAz") },
            StubDetector { invocation: None },
            InMemoryMessages::new(),
        )
        .await;

        fx.pipeline
            .process_utterance(fx.conversation_id, "Where does it hurt?")
            .await;

        let stored = fx.messages.stored();
        assert_eq!(stored[1].sender_type, SenderType::Translation);
        assert_eq!(stored[1].language, "es");

        let types = drain_types(&mut fx.events);
        assert!(types.contains(&"translation_started".to_string()));
    }

    #[tokio::test]
    async fn patient_language_switch_is_recorded() {
        let mut fx = fixture(
            Some("es"),
            ConversationStatus::Active,
            StubLanguage {
                detected: "fr".to_string(),
                translation: Some("My head hurts".to_string()),
            },
            StubSynthesizer { audio: None },
            StubDetector { invocation: None },
            InMemoryMessages::new(),
        )
        .await;

        fx.pipeline
            .process_utterance(fx.conversation_id, "J'ai mal à la tête")
            .await;

        assert_eq!(
            fx.conversations.patient_language(fx.conversation_id),
            Some("fr".to_string())
        );
        // fr -> en translation persisted
        assert_eq!(fx.messages.stored()[1].language, "en");
    }

    #[tokio::test]
    async fn original_persistence_failure_aborts_with_error() {
        let mut fx = fixture(
            Some("es"),
            ConversationStatus::Active,
            StubLanguage {
                detected: "es".to_string(),
                translation: Some("unused".to_string()),
            },
            StubSynthesizer { audio: Some("bXAz") },
            StubDetector { invocation: None },
            InMemoryMessages::failing_on(0),
        )
        .await;

        fx.pipeline
            .process_utterance(fx.conversation_id, "Me duele la cabeza")
            .await;

        let types = drain_types(&mut fx.events);
        assert_eq!(types, vec!["transcription_started", "error"]);
    }

    #[tokio::test]
    async fn translation_save_failure_still_synthesizes_translation() {
        let mut fx = fixture(
            Some("es"),
            ConversationStatus::Active,
            StubLanguage {
                detected: "es".to_string(),
                translation: Some("My head hurts".to_string()),
            },
            StubSynthesizer { audio: Some("bXAz") },
            StubDetector { invocation: None },
            InMemoryMessages::failing_on(1),
        )
        .await;

        fx.pipeline
            .process_utterance(fx.conversation_id, "Me duele la cabeza")
            .await;

        let types = drain_types(&mut fx.events);
        assert_eq!(
            types,
            vec![
                "transcription_started",
                "new_message",
                "translation_started",
                "tts_audio",
                "processing_completed",
            ]
        );
    }

    #[tokio::test]
    async fn terminal_conversation_drops_utterance() {
        let mut fx = fixture(
            Some("es"),
            ConversationStatus::Summarized,
            StubLanguage {
                detected: "es".to_string(),
                translation: None,
            },
            StubSynthesizer { audio: Some("bXAz") },
            StubDetector { invocation: None },
            InMemoryMessages::new(),
        )
        .await;

        fx.pipeline
            .process_utterance(fx.conversation_id, "Me duele la cabeza")
            .await;

        assert!(drain_types(&mut fx.events).is_empty());
    }

    #[tokio::test]
    async fn clinician_command_branch_reports_result() {
        let mut fx = fixture(
            None,
            ConversationStatus::Active,
            StubLanguage {
                detected: "en".to_string(),
                translation: None,
            },
            StubSynthesizer { audio: None },
            StubDetector {
                invocation: Some(CommandInvocation {
                    tool_name: "take_note".to_string(),
                    arguments: serde_json::json!({ "note_content": "patient reports headache" }),
                }),
            },
            InMemoryMessages::new(),
        )
        .await;

        fx.pipeline
            .process_utterance(fx.conversation_id, "Clara take a note patient reports headache")
            .await;

        // The branch runs concurrently; wait for both of its events
        let mut saw_command = false;
        let mut saw_action = false;
        while !(saw_command && saw_action) {
            let frame = timeout(Duration::from_secs(5), fx.events.recv())
                .await
                .expect("timed out waiting for command events")
                .expect("event channel closed");
            let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
            match value["type"].as_str().unwrap() {
                "command_executed" => {
                    assert_eq!(value["payload"]["status"], "success");
                    assert_eq!(value["payload"]["name"], "take_note");
                    saw_command = true;
                }
                "action_created" => {
                    assert_eq!(value["payload"]["type"], "note");
                    assert_eq!(
                        value["payload"]["data"]["content"],
                        "patient reports headache"
                    );
                    saw_action = true;
                }
                _ => {}
            }
        }
    }
}

//! Conversation coordinator
//!
//! Top-level state machine per conversation: creates the records, owns the
//! per-conversation runtimes, drives end-and-summarize, and cleans up when
//! the last control client leaves. The coordinator map holds runtime
//! handles only; the live state stays inside each runtime task.

pub mod runtime;

pub use runtime::{ConnectionStatus, RuntimeCommand, RuntimeHandle};

use crate::actions::ports::{
    FollowUpRepository, MedicalHistoryRepository, NoteRepository, PrescriptionRepository,
    SummaryRepository,
};
use crate::actions::ActionService;
use crate::conversations::models::{Conversation, ConversationStatus, Message, NewMessage, SenderType};
use crate::conversations::ports::{ConversationRepository, MessageRepository};
use crate::hub::{
    ActionListPayload, ClientHandle, ConversationSelectedPayload, MedicalHistoryPayload,
    MessageListPayload, NotificationHub, ServerEvent, SessionEndedPayload, SessionStartedPayload,
    SummaryPayload,
};
use crate::patients::PatientRepository;
use crate::pipeline::TranscriptPipeline;
use crate::summarize::{format_transcript, Summarizer};
use crate::transcode::Transcoder;
use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use providers::realtime::RealtimeEndpoint;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Conversation not found")]
    ConversationNotFound,
    #[error("Internal error: {0}")]
    InternalError(String),
}

fn internal(e: impl std::fmt::Display) -> CoordinatorError {
    CoordinatorError::InternalError(e.to_string())
}

/// Constructor dependencies; everything is shared and cheap to clone
pub struct CoordinatorDeps {
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub patients: Arc<dyn PatientRepository>,
    pub notes: Arc<dyn NoteRepository>,
    pub follow_ups: Arc<dyn FollowUpRepository>,
    pub prescriptions: Arc<dyn PrescriptionRepository>,
    pub summaries: Arc<dyn SummaryRepository>,
    pub medical_histories: Arc<dyn MedicalHistoryRepository>,
    pub summarizer: Arc<dyn Summarizer>,
    pub actions: Arc<ActionService>,
    pub pipeline: Arc<TranscriptPipeline>,
    pub hub: Arc<NotificationHub>,
    pub endpoint: RealtimeEndpoint,
    pub transcription_model: String,
    pub transcoder: Arc<Transcoder>,
}

pub struct ConversationCoordinator {
    deps: CoordinatorDeps,
    runtimes: Mutex<HashMap<Uuid, RuntimeHandle>>,
}

impl ConversationCoordinator {
    pub fn new(deps: CoordinatorDeps) -> Self {
        Self {
            deps,
            runtimes: Mutex::new(HashMap::new()),
        }
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.deps.hub
    }

    /// Find-or-create the patient, open an active conversation, and kick
    /// off medical-history generation in the background.
    pub async fn start_session(
        &self,
        user_id: Uuid,
        first_name: &str,
        last_name: &str,
        date_of_birth: NaiveDate,
    ) -> Result<SessionStartedPayload, CoordinatorError> {
        let patient = self
            .deps
            .patients
            .find_or_create(first_name.trim(), last_name.trim(), date_of_birth)
            .await
            .map_err(internal)?;

        let conversation = self
            .deps
            .conversations
            .create(user_id, patient.id, "es")
            .await
            .map_err(internal)?;

        info!(
            conversation_id = %conversation.id,
            patient_id = %patient.id,
            "Session started"
        );

        self.spawn_medical_history(conversation.id, &patient.first_name, &patient.last_name, date_of_birth);

        Ok(SessionStartedPayload {
            conversation_id: conversation.id,
            patient_id: patient.id,
            start_time: conversation.start_time,
        })
    }

    /// Subscribe a control client to a conversation it owns
    pub async fn select_conversation(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        client: ClientHandle,
    ) -> Result<ConversationSelectedPayload, CoordinatorError> {
        let conversation = self.owned(conversation_id, user_id).await?;

        self.deps.hub.register_client(client, conversation_id).await;

        let summary = self
            .deps
            .summaries
            .get_by_conversation(conversation_id)
            .await
            .map_err(internal)?
            .map(|s| s.content);

        Ok(ConversationSelectedPayload {
            conversation_id,
            is_active: conversation.status == ConversationStatus::Active,
            status: conversation.status,
            summary,
            patient_language: conversation.patient_language,
        })
    }

    pub async fn list_conversations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Conversation>, CoordinatorError> {
        self.deps
            .conversations
            .list_by_user(user_id)
            .await
            .map_err(internal)
    }

    pub async fn get_messages(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<MessageListPayload, CoordinatorError> {
        self.owned(conversation_id, user_id).await?;
        let messages = self
            .deps
            .messages
            .list_by_conversation(conversation_id)
            .await
            .map_err(internal)?;
        Ok(MessageListPayload {
            conversation_id,
            messages,
        })
    }

    pub async fn get_actions(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<ActionListPayload, CoordinatorError> {
        self.owned(conversation_id, user_id).await?;
        let actions = self
            .deps
            .actions
            .aggregate(conversation_id)
            .await
            .map_err(internal)?;
        Ok(ActionListPayload {
            conversation_id,
            actions,
        })
    }

    pub async fn get_summary(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<SummaryPayload, CoordinatorError> {
        self.owned(conversation_id, user_id).await?;
        let summary = self
            .deps
            .summaries
            .get_by_conversation(conversation_id)
            .await
            .map_err(internal)?
            .map(|s| s.content);
        Ok(SummaryPayload {
            conversation_id,
            summary,
        })
    }

    pub async fn get_medical_history(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<MedicalHistoryPayload, CoordinatorError> {
        self.owned(conversation_id, user_id).await?;
        let content = self
            .deps
            .medical_histories
            .get_by_conversation(conversation_id)
            .await
            .map_err(internal)?
            .map(|h| h.content);
        Ok(MedicalHistoryPayload {
            conversation_id,
            content,
        })
    }

    /// Persist a typed chat message from the clinician and fan it out
    pub async fn record_chat_message(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        text: &str,
    ) -> Result<Message, CoordinatorError> {
        self.owned(conversation_id, user_id).await?;

        let message = self
            .deps
            .messages
            .create(NewMessage {
                conversation_id,
                sender_type: SenderType::User,
                language: "en".to_string(),
                original_text: text.to_string(),
                translated_text: None,
                original_message_id: None,
            })
            .await
            .map_err(internal)?;

        self.deps
            .hub
            .broadcast(conversation_id, &ServerEvent::NewMessage(message.clone()))
            .await;

        Ok(message)
    }

    /// End a conversation: summarize when there is anything to summarize,
    /// degrade to `ended_error` when the model fails, plain `ended` when
    /// the conversation is empty.
    pub async fn end_and_summarize(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<SessionEndedPayload, CoordinatorError> {
        let conversation = self.owned(conversation_id, user_id).await?;

        if conversation.status.is_terminal() {
            let summary = self
                .deps
                .summaries
                .get_by_conversation(conversation_id)
                .await
                .map_err(internal)?
                .map(|s| s.content);
            return Ok(SessionEndedPayload {
                conversation_id,
                status: conversation.status,
                summary,
                end_time: conversation.end_time,
            });
        }

        let (messages, notes, prescriptions, follow_ups) = tokio::try_join!(
            self.deps.messages.list_by_conversation(conversation_id),
            self.deps.notes.list_by_conversation(conversation_id),
            self.deps.prescriptions.list_by_conversation(conversation_id),
            self.deps.follow_ups.list_by_conversation(conversation_id),
        )
        .map_err(internal)?;

        let now = Utc::now();

        if messages.is_empty() && notes.is_empty() && prescriptions.is_empty() && follow_ups.is_empty()
        {
            let conversation = self
                .deps
                .conversations
                .finalize(conversation_id, ConversationStatus::Ended, now)
                .await
                .map_err(internal)?
                .ok_or(CoordinatorError::ConversationNotFound)?;

            self.shutdown_runtime(conversation_id).await;
            return Ok(SessionEndedPayload {
                conversation_id,
                status: conversation.status,
                summary: None,
                end_time: conversation.end_time,
            });
        }

        let context = format_transcript(&messages, &notes, &prescriptions, &follow_ups);

        let outcome = match self.deps.summarizer.summarize_conversation(&context).await {
            Some(content) => {
                let conversation = self
                    .deps
                    .conversations
                    .finalize_with_summary(conversation_id, &content, now)
                    .await
                    .map_err(internal)?
                    .ok_or(CoordinatorError::ConversationNotFound)?;

                // Exactly one summary broadcast per successful end
                self.deps
                    .hub
                    .broadcast(
                        conversation_id,
                        &ServerEvent::SummaryData(SummaryPayload {
                            conversation_id,
                            summary: Some(content.clone()),
                        }),
                    )
                    .await;

                SessionEndedPayload {
                    conversation_id,
                    status: conversation.status,
                    summary: Some(content),
                    end_time: conversation.end_time,
                }
            }
            None => {
                warn!(conversation_id = %conversation_id, "Summary generation failed");
                let conversation = self
                    .deps
                    .conversations
                    .finalize(conversation_id, ConversationStatus::EndedError, now)
                    .await
                    .map_err(internal)?
                    .ok_or(CoordinatorError::ConversationNotFound)?;

                SessionEndedPayload {
                    conversation_id,
                    status: conversation.status,
                    summary: None,
                    end_time: conversation.end_time,
                }
            }
        };

        self.shutdown_runtime(conversation_id).await;
        Ok(outcome)
    }

    /// Make sure a runtime exists for the conversation and report its
    /// upstream connection status; called when an audio socket opens.
    pub async fn ensure_runtime(&self, conversation_id: Uuid) -> ConnectionStatus {
        let mut runtimes = self.runtimes.lock().await;

        if let Some(handle) = runtimes.get(&conversation_id) {
            if handle.is_alive() {
                return handle.connection_status();
            }
            runtimes.remove(&conversation_id);
        }

        let handle = runtime::spawn(runtime::RuntimeContext {
            conversation_id,
            endpoint: self.deps.endpoint.clone(),
            transcription_model: self.deps.transcription_model.clone(),
            transcoder: self.deps.transcoder.clone(),
            pipeline: self.deps.pipeline.clone(),
            hub: self.deps.hub.clone(),
        });
        let status = handle.connection_status();
        runtimes.insert(conversation_id, handle);
        status
    }

    pub async fn append_audio(&self, conversation_id: Uuid, chunk: Bytes) {
        self.send_command(conversation_id, RuntimeCommand::AppendAudio(chunk))
            .await;
    }

    pub async fn finalize_audio(&self, conversation_id: Uuid) {
        self.send_command(conversation_id, RuntimeCommand::FinalizeInput)
            .await;
    }

    pub async fn pause_audio(&self, conversation_id: Uuid) {
        self.send_command(conversation_id, RuntimeCommand::Pause).await;
    }

    pub async fn resume_audio(&self, conversation_id: Uuid) {
        self.send_command(conversation_id, RuntimeCommand::Resume).await;
    }

    /// Control client went away: unsubscribe it, and tear the conversation
    /// down when it was the last one.
    pub async fn client_disconnected(&self, client_id: Uuid) {
        let conversation_id = self.deps.hub.conversation_of(client_id).await;
        self.deps.hub.remove_client(client_id).await;

        if let Some(conversation_id) = conversation_id {
            if self.deps.hub.client_count(conversation_id).await == 0 {
                info!(conversation_id = %conversation_id, "Last client left; tearing down");
                self.shutdown_runtime(conversation_id).await;
            }
        }
    }

    async fn shutdown_runtime(&self, conversation_id: Uuid) {
        if let Some(handle) = self.runtimes.lock().await.remove(&conversation_id) {
            handle.send(RuntimeCommand::Shutdown);
        }
    }

    async fn send_command(&self, conversation_id: Uuid, command: RuntimeCommand) {
        let runtimes = self.runtimes.lock().await;
        match runtimes.get(&conversation_id) {
            Some(handle) => {
                if !handle.send(command) {
                    warn!(conversation_id = %conversation_id, "Runtime is gone; command dropped");
                }
            }
            None => {
                warn!(conversation_id = %conversation_id, "No runtime for conversation; command dropped");
            }
        }
    }

    async fn owned(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Conversation, CoordinatorError> {
        self.deps
            .conversations
            .get_owned(conversation_id, user_id)
            .await
            .map_err(internal)?
            .ok_or(CoordinatorError::ConversationNotFound)
    }

    fn spawn_medical_history(
        &self,
        conversation_id: Uuid,
        first_name: &str,
        last_name: &str,
        date_of_birth: NaiveDate,
    ) {
        let summarizer = self.deps.summarizer.clone();
        let medical_histories = self.deps.medical_histories.clone();
        let hub = self.deps.hub.clone();
        let patient_context = format!(
            "Patient: {first_name} {last_name}\nDate of birth: {date_of_birth}"
        );

        tokio::spawn(async move {
            let Some(content) = summarizer.generate_medical_history(&patient_context).await
            else {
                return;
            };

            if let Err(e) = medical_histories.upsert(conversation_id, &content).await {
                warn!(error = %e, conversation_id = %conversation_id, "Failed to store medical history");
                return;
            }

            hub.broadcast(
                conversation_id,
                &ServerEvent::MedicalHistoryData(MedicalHistoryPayload {
                    conversation_id,
                    content: Some(content),
                }),
            )
            .await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::service::CommandService;
    use crate::test_utils::{
        InMemoryConversations, InMemoryFollowUps, InMemoryMedicalHistories, InMemoryMessages,
        InMemoryNotes, InMemoryPatients, InMemoryPrescriptions, InMemorySummaries, StubDetector,
        StubLanguage, StubSummarizer, StubSynthesizer,
    };
    use tokio::sync::mpsc;
    use tokio::time::{timeout, Duration};

    struct Fixture {
        coordinator: ConversationCoordinator,
        conversations: Arc<InMemoryConversations>,
        messages: Arc<InMemoryMessages>,
        summaries: Arc<InMemorySummaries>,
        hub: Arc<NotificationHub>,
    }

    fn fixture(summarizer_answer: Option<&str>) -> Fixture {
        let summaries_store = InMemorySummaries::shared_store();
        let conversations = Arc::new(InMemoryConversations::new(summaries_store.clone()));
        let messages = Arc::new(InMemoryMessages::new());
        let patients = Arc::new(InMemoryPatients::new());
        let notes = Arc::new(InMemoryNotes::new());
        let follow_ups = Arc::new(InMemoryFollowUps::new());
        let prescriptions = Arc::new(InMemoryPrescriptions::new());
        let summaries = Arc::new(InMemorySummaries::new(summaries_store));
        let medical_histories = Arc::new(InMemoryMedicalHistories::new());
        let hub = Arc::new(NotificationHub::new());

        let commands = Arc::new(CommandService::new(
            notes.clone(),
            follow_ups.clone(),
            prescriptions.clone(),
            hub.clone(),
        ));
        let pipeline = Arc::new(TranscriptPipeline::new(
            conversations.clone(),
            messages.clone(),
            Arc::new(StubLanguage::new("en", None)),
            Arc::new(StubSynthesizer::none()),
            Arc::new(StubDetector::none()),
            commands,
            hub.clone(),
        ));

        let coordinator = ConversationCoordinator::new(CoordinatorDeps {
            conversations: conversations.clone(),
            messages: messages.clone(),
            patients,
            notes,
            follow_ups,
            prescriptions,
            summaries: summaries.clone(),
            medical_histories,
            summarizer: Arc::new(StubSummarizer::new(summarizer_answer)),
            actions: Arc::new(ActionService::new(
                Arc::new(InMemoryNotes::new()),
                Arc::new(InMemoryFollowUps::new()),
                Arc::new(InMemoryPrescriptions::new()),
            )),
            pipeline,
            hub: hub.clone(),
            endpoint: RealtimeEndpoint::new(
                "ws://127.0.0.1:1".to_string(),
                "test-key".to_string(),
            ),
            transcription_model: "gpt-4o-transcribe".to_string(),
            transcoder: Arc::new(Transcoder::new(&config::TranscodeConfig {
                ffmpeg_path: "ffmpeg".to_string(),
            })),
        });

        Fixture {
            coordinator,
            conversations,
            messages,
            summaries,
            hub,
        }
    }

    fn dob() -> NaiveDate {
        NaiveDate::from_ymd_opt(1984, 3, 14).unwrap()
    }

    #[tokio::test]
    async fn start_session_creates_patient_and_active_conversation() {
        let fx = fixture(Some("history"));
        let user_id = Uuid::new_v4();

        let started = fx
            .coordinator
            .start_session(user_id, "Maria", "Lopez", dob())
            .await
            .unwrap();

        let conversation = fx
            .conversations
            .get(started.conversation_id)
            .expect("conversation stored");
        assert_eq!(conversation.status, ConversationStatus::Active);
        assert_eq!(conversation.patient_language.as_deref(), Some("es"));
        assert_eq!(conversation.user_id, user_id);
        assert_eq!(conversation.patient_id, started.patient_id);
    }

    #[tokio::test]
    async fn medical_history_is_generated_and_broadcast() {
        let fx = fixture(Some("No prior records on file."));
        let user_id = Uuid::new_v4();

        let started = fx
            .coordinator
            .start_session(user_id, "Maria", "Lopez", dob())
            .await
            .unwrap();

        // Subscribe a client so the background broadcast has a receiver
        let (tx, mut rx) = mpsc::unbounded_channel();
        fx.hub
            .register_client(
                ClientHandle::new(Uuid::new_v4(), user_id, tx),
                started.conversation_id,
            )
            .await;

        let frame = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "medical_history_data");
        assert_eq!(value["payload"]["content"], "No prior records on file.");
    }

    #[tokio::test]
    async fn select_conversation_registers_client_and_reports_state() {
        let fx = fixture(None);
        let user_id = Uuid::new_v4();
        let started = fx
            .coordinator
            .start_session(user_id, "Maria", "Lopez", dob())
            .await
            .unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let selected = fx
            .coordinator
            .select_conversation(
                user_id,
                started.conversation_id,
                ClientHandle::new(Uuid::new_v4(), user_id, tx),
            )
            .await
            .unwrap();

        assert!(selected.is_active);
        assert_eq!(selected.status, ConversationStatus::Active);
        assert_eq!(selected.patient_language.as_deref(), Some("es"));
        assert!(selected.summary.is_none());
        assert_eq!(fx.hub.client_count(started.conversation_id).await, 1);
    }

    #[tokio::test]
    async fn selecting_someone_elses_conversation_is_not_found() {
        let fx = fixture(None);
        let owner = Uuid::new_v4();
        let started = fx
            .coordinator
            .start_session(owner, "Maria", "Lopez", dob())
            .await
            .unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = fx
            .coordinator
            .select_conversation(
                Uuid::new_v4(),
                started.conversation_id,
                ClientHandle::new(Uuid::new_v4(), Uuid::new_v4(), tx),
            )
            .await;

        assert!(matches!(result, Err(CoordinatorError::ConversationNotFound)));
    }

    #[tokio::test]
    async fn end_with_content_summarizes_and_broadcasts_once() {
        let fx = fixture(Some("Patient reported a headache."));
        let user_id = Uuid::new_v4();
        let started = fx
            .coordinator
            .start_session(user_id, "Maria", "Lopez", dob())
            .await
            .unwrap();
        let conversation_id = started.conversation_id;

        fx.messages.seed_user_message(conversation_id, "My head hurts");

        let (tx, mut rx) = mpsc::unbounded_channel();
        fx.hub
            .register_client(ClientHandle::new(Uuid::new_v4(), user_id, tx), conversation_id)
            .await;

        let ended = fx
            .coordinator
            .end_and_summarize(user_id, conversation_id)
            .await
            .unwrap();

        assert_eq!(ended.status, ConversationStatus::Summarized);
        assert_eq!(ended.summary.as_deref(), Some("Patient reported a headache."));
        assert!(ended.end_time.is_some());

        // Summary round-trip: get_summary returns the persisted content
        let summary = fx
            .coordinator
            .get_summary(user_id, conversation_id)
            .await
            .unwrap();
        assert_eq!(summary.summary.as_deref(), Some("Patient reported a headache."));

        let mut summary_events = 0;
        while let Ok(frame) = rx.try_recv() {
            let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
            if value["type"] == "summary_data" {
                summary_events += 1;
                assert_eq!(value["payload"]["summary"], "Patient reported a headache.");
            }
        }
        assert_eq!(summary_events, 1);
    }

    #[tokio::test]
    async fn end_with_llm_failure_is_ended_error_without_summary() {
        let fx = fixture(None);
        let user_id = Uuid::new_v4();
        let started = fx
            .coordinator
            .start_session(user_id, "Maria", "Lopez", dob())
            .await
            .unwrap();
        fx.messages
            .seed_user_message(started.conversation_id, "My head hurts");

        let ended = fx
            .coordinator
            .end_and_summarize(user_id, started.conversation_id)
            .await
            .unwrap();

        assert_eq!(ended.status, ConversationStatus::EndedError);
        assert!(ended.summary.is_none());
        assert!(fx.summaries.get(started.conversation_id).is_none());
    }

    #[tokio::test]
    async fn end_with_nothing_to_summarize_is_plain_ended() {
        let fx = fixture(Some("should not be called"));
        let user_id = Uuid::new_v4();
        let started = fx
            .coordinator
            .start_session(user_id, "Maria", "Lopez", dob())
            .await
            .unwrap();

        let ended = fx
            .coordinator
            .end_and_summarize(user_id, started.conversation_id)
            .await
            .unwrap();

        assert_eq!(ended.status, ConversationStatus::Ended);
        assert!(ended.summary.is_none());
        assert!(fx.summaries.get(started.conversation_id).is_none());
    }

    #[tokio::test]
    async fn get_summary_on_active_conversation_is_null() {
        let fx = fixture(None);
        let user_id = Uuid::new_v4();
        let started = fx
            .coordinator
            .start_session(user_id, "Maria", "Lopez", dob())
            .await
            .unwrap();

        let summary = fx
            .coordinator
            .get_summary(user_id, started.conversation_id)
            .await
            .unwrap();
        assert!(summary.summary.is_none());
    }

    #[tokio::test]
    async fn chat_message_is_persisted_and_broadcast() {
        let fx = fixture(None);
        let user_id = Uuid::new_v4();
        let started = fx
            .coordinator
            .start_session(user_id, "Maria", "Lopez", dob())
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        fx.hub
            .register_client(
                ClientHandle::new(Uuid::new_v4(), user_id, tx),
                started.conversation_id,
            )
            .await;

        let message = fx
            .coordinator
            .record_chat_message(user_id, started.conversation_id, "typed follow-up question")
            .await
            .unwrap();
        assert_eq!(message.sender_type, SenderType::User);

        let frame: serde_json::Value =
            serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["type"], "new_message");
        assert_eq!(frame["payload"]["originalText"], "typed follow-up question");
    }
}

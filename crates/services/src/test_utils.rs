//! In-memory repositories and stub services shared by unit tests

use crate::actions::models::{
    FollowUp, MedicalHistory, NewFollowUp, NewPrescription, Note, Prescription, Summary,
};
use crate::actions::ports::{
    FollowUpRepository, MedicalHistoryRepository, NoteRepository, PrescriptionRepository,
    SummaryRepository,
};
use crate::commands::models::CommandInvocation;
use crate::commands::ports::CommandDetector;
use crate::conversations::models::{
    Conversation, ConversationStatus, Message, NewMessage, SenderType,
};
use crate::conversations::ports::{ConversationRepository, MessageRepository};
use crate::language::ports::LanguageService;
use crate::patients::{Patient, PatientRepository};
use crate::speech::ports::{SpeechSynthesizer, SynthesizedSpeech};
use crate::summarize::ports::Summarizer;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub type SummaryStore = Arc<Mutex<HashMap<Uuid, Summary>>>;

pub struct InMemoryConversations {
    conversations: Mutex<HashMap<Uuid, Conversation>>,
    summaries: SummaryStore,
}

impl InMemoryConversations {
    pub fn new(summaries: SummaryStore) -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
            summaries,
        }
    }

    pub fn get(&self, id: Uuid) -> Option<Conversation> {
        self.conversations.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl ConversationRepository for InMemoryConversations {
    async fn create(
        &self,
        user_id: Uuid,
        patient_id: Uuid,
        patient_language: &str,
    ) -> Result<Conversation> {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_id,
            patient_id,
            status: ConversationStatus::Active,
            patient_language: Some(patient_language.to_string()),
            start_time: Utc::now(),
            end_time: None,
        };
        self.conversations
            .lock()
            .unwrap()
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Conversation>> {
        Ok(self.get(id))
    }

    async fn get_owned(&self, id: Uuid, user_id: Uuid) -> Result<Option<Conversation>> {
        Ok(self.get(id).filter(|c| c.user_id == user_id))
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let mut conversations: Vec<Conversation> = self
            .conversations
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(conversations)
    }

    async fn update_patient_language(&self, id: Uuid, language: &str) -> Result<()> {
        if let Some(conversation) = self.conversations.lock().unwrap().get_mut(&id) {
            conversation.patient_language = Some(language.to_string());
        }
        Ok(())
    }

    async fn finalize(
        &self,
        id: Uuid,
        status: ConversationStatus,
        end_time: DateTime<Utc>,
    ) -> Result<Option<Conversation>> {
        let mut conversations = self.conversations.lock().unwrap();
        Ok(conversations.get_mut(&id).map(|conversation| {
            conversation.status = status;
            conversation.end_time = Some(end_time);
            conversation.clone()
        }))
    }

    async fn finalize_with_summary(
        &self,
        id: Uuid,
        summary: &str,
        end_time: DateTime<Utc>,
    ) -> Result<Option<Conversation>> {
        let mut conversations = self.conversations.lock().unwrap();
        let Some(conversation) = conversations.get_mut(&id) else {
            return Ok(None);
        };

        conversation.status = ConversationStatus::Summarized;
        conversation.end_time = Some(end_time);
        self.summaries.lock().unwrap().insert(
            id,
            Summary {
                conversation_id: id,
                content: summary.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(Some(conversation.clone()))
    }
}

pub struct InMemoryMessages {
    messages: Mutex<Vec<Message>>,
}

impl InMemoryMessages {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn seed_user_message(&self, conversation_id: Uuid, text: &str) {
        self.messages.lock().unwrap().push(Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_type: SenderType::User,
            language: "en".to_string(),
            original_text: text.to_string(),
            translated_text: None,
            original_message_id: None,
            timestamp: Utc::now(),
        });
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessages {
    async fn create(&self, new_message: NewMessage) -> Result<Message> {
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

    async fn list_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }
}

pub struct InMemoryPatients {
    patients: Mutex<Vec<Patient>>,
}

impl InMemoryPatients {
    pub fn new() -> Self {
        Self {
            patients: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PatientRepository for InMemoryPatients {
    async fn find_or_create(
        &self,
        first_name: &str,
        last_name: &str,
        date_of_birth: NaiveDate,
    ) -> Result<Patient> {
        let mut patients = self.patients.lock().unwrap();
        if let Some(existing) = patients.iter().find(|p| {
            p.first_name == first_name && p.last_name == last_name && p.date_of_birth == date_of_birth
        }) {
            return Ok(existing.clone());
        }

        let patient = Patient {
            id: Uuid::new_v4(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            date_of_birth,
            created_at: Utc::now(),
        };
        patients.push(patient.clone());
        Ok(patient)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Patient>> {
        Ok(self
            .patients
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }
}

pub struct InMemoryNotes {
    notes: Mutex<Vec<Note>>,
}

impl InMemoryNotes {
    pub fn new() -> Self {
        Self {
            notes: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl NoteRepository for InMemoryNotes {
    async fn create(&self, conversation_id: Uuid, content: &str) -> Result<Note> {
        let now = Utc::now();
        let note = Note {
            id: Uuid::new_v4(),
            conversation_id,
            content: content.to_string(),
            status: "active".to_string(),
            created_at: now,
            updated_at: now,
        };
        self.notes.lock().unwrap().push(note.clone());
        Ok(note)
    }

    async fn list_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<Note>> {
        Ok(self
            .notes
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.conversation_id == conversation_id)
            .cloned()
            .collect())
    }
}

pub struct InMemoryFollowUps {
    follow_ups: Mutex<Vec<FollowUp>>,
}

impl InMemoryFollowUps {
    pub fn new() -> Self {
        Self {
            follow_ups: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl FollowUpRepository for InMemoryFollowUps {
    async fn create(&self, new_follow_up: NewFollowUp) -> Result<FollowUp> {
        let now = Utc::now();
        let follow_up = FollowUp {
            id: Uuid::new_v4(),
            conversation_id: new_follow_up.conversation_id,
            duration: new_follow_up.duration,
            unit: new_follow_up.unit,
            details: new_follow_up.details,
            scheduled_for: new_follow_up.scheduled_for,
            status: "scheduled".to_string(),
            created_at: now,
            updated_at: now,
        };
        self.follow_ups.lock().unwrap().push(follow_up.clone());
        Ok(follow_up)
    }

    async fn list_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<FollowUp>> {
        Ok(self
            .follow_ups
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.conversation_id == conversation_id)
            .cloned()
            .collect())
    }
}

pub struct InMemoryPrescriptions {
    prescriptions: Mutex<Vec<Prescription>>,
}

impl InMemoryPrescriptions {
    pub fn new() -> Self {
        Self {
            prescriptions: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PrescriptionRepository for InMemoryPrescriptions {
    async fn create(&self, new_prescription: NewPrescription) -> Result<Prescription> {
        let now = Utc::now();
        let prescription = Prescription {
            id: Uuid::new_v4(),
            conversation_id: new_prescription.conversation_id,
            medication_name: new_prescription.medication_name,
            dosage: new_prescription.dosage,
            frequency: new_prescription.frequency,
            details: new_prescription.details,
            status: "active".to_string(),
            created_at: now,
            updated_at: now,
        };
        self.prescriptions.lock().unwrap().push(prescription.clone());
        Ok(prescription)
    }

    async fn list_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<Prescription>> {
        Ok(self
            .prescriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.conversation_id == conversation_id)
            .cloned()
            .collect())
    }
}

pub struct InMemorySummaries {
    store: SummaryStore,
}

impl InMemorySummaries {
    pub fn shared_store() -> SummaryStore {
        Arc::new(Mutex::new(HashMap::new()))
    }

    pub fn new(store: SummaryStore) -> Self {
        Self { store }
    }

    pub fn get(&self, conversation_id: Uuid) -> Option<Summary> {
        self.store.lock().unwrap().get(&conversation_id).cloned()
    }
}

#[async_trait]
impl SummaryRepository for InMemorySummaries {
    async fn get_by_conversation(&self, conversation_id: Uuid) -> Result<Option<Summary>> {
        Ok(self.get(conversation_id))
    }
}

pub struct InMemoryMedicalHistories {
    histories: Mutex<HashMap<Uuid, MedicalHistory>>,
}

impl InMemoryMedicalHistories {
    pub fn new() -> Self {
        Self {
            histories: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl MedicalHistoryRepository for InMemoryMedicalHistories {
    async fn upsert(&self, conversation_id: Uuid, content: &str) -> Result<MedicalHistory> {
        let history = MedicalHistory {
            conversation_id,
            content: content.to_string(),
            updated_at: Utc::now(),
        };
        self.histories
            .lock()
            .unwrap()
            .insert(conversation_id, history.clone());
        Ok(history)
    }

    async fn get_by_conversation(&self, conversation_id: Uuid) -> Result<Option<MedicalHistory>> {
        Ok(self.histories.lock().unwrap().get(&conversation_id).cloned())
    }
}

pub struct StubLanguage {
    detected: String,
    translation: Option<String>,
}

impl StubLanguage {
    pub fn new(detected: &str, translation: Option<&str>) -> Self {
        Self {
            detected: detected.to_string(),
            translation: translation.map(str::to_string),
        }
    }
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

pub struct StubSynthesizer {
    audio: Option<String>,
}

impl StubSynthesizer {
    pub fn none() -> Self {
        Self { audio: None }
    }
}

#[async_trait]
impl SpeechSynthesizer for StubSynthesizer {
    async fn synthesize(&self, _text: &str, _language_hint: &str) -> Option<SynthesizedSpeech> {
        self.audio.clone().map(|audio_base64| SynthesizedSpeech {
            audio_base64,
            format: "audio/mpeg".to_string(),
        })
    }
}

pub struct StubDetector {
    invocation: Option<CommandInvocation>,
}

impl StubDetector {
    pub fn none() -> Self {
        Self { invocation: None }
    }
}

#[async_trait]
impl CommandDetector for StubDetector {
    async fn detect(&self, _text: &str) -> Option<CommandInvocation> {
        self.invocation.clone()
    }
}

pub struct StubSummarizer {
    answer: Option<String>,
}

impl StubSummarizer {
    pub fn new(answer: Option<&str>) -> Self {
        Self {
            answer: answer.map(str::to_string),
        }
    }
}

#[async_trait]
impl Summarizer for StubSummarizer {
    async fn summarize_conversation(&self, _context: &str) -> Option<String> {
        self.answer.clone()
    }

    async fn generate_medical_history(&self, _patient_context: &str) -> Option<String> {
        self.answer.clone()
    }
}

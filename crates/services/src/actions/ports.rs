use crate::actions::models::{
    FollowUp, MedicalHistory, NewFollowUp, NewPrescription, Note, Prescription, Summary,
};
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait NoteRepository: Send + Sync {
    async fn create(&self, conversation_id: Uuid, content: &str) -> Result<Note>;
    async fn list_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<Note>>;
}

#[async_trait]
pub trait FollowUpRepository: Send + Sync {
    async fn create(&self, new_follow_up: NewFollowUp) -> Result<FollowUp>;
    async fn list_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<FollowUp>>;
}

#[async_trait]
pub trait PrescriptionRepository: Send + Sync {
    async fn create(&self, new_prescription: NewPrescription) -> Result<Prescription>;
    async fn list_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<Prescription>>;
}

#[async_trait]
pub trait SummaryRepository: Send + Sync {
    async fn get_by_conversation(&self, conversation_id: Uuid) -> Result<Option<Summary>>;
}

#[async_trait]
pub trait MedicalHistoryRepository: Send + Sync {
    async fn upsert(&self, conversation_id: Uuid, content: &str) -> Result<MedicalHistory>;
    async fn get_by_conversation(&self, conversation_id: Uuid) -> Result<Option<MedicalHistory>>;
}

use crate::conversations::models::{Conversation, ConversationStatus, Message, NewMessage};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Create a new active conversation
    async fn create(
        &self,
        user_id: Uuid,
        patient_id: Uuid,
        patient_language: &str,
    ) -> Result<Conversation>;

    /// Get a conversation by ID
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Conversation>>;

    /// Get a conversation by ID, scoped to its owning clinician
    async fn get_owned(&self, id: Uuid, user_id: Uuid) -> Result<Option<Conversation>>;

    /// List a clinician's conversations, most recent first
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Conversation>>;

    /// Record the most recently detected patient language
    async fn update_patient_language(&self, id: Uuid, language: &str) -> Result<()>;

    /// Move a conversation to a terminal status without a summary
    async fn finalize(
        &self,
        id: Uuid,
        status: ConversationStatus,
        end_time: DateTime<Utc>,
    ) -> Result<Option<Conversation>>;

    /// Atomically store the summary and mark the conversation summarized.
    ///
    /// The summary upsert and the status/end-time update happen in one
    /// transaction; a failure leaves the conversation untouched.
    async fn finalize_with_summary(
        &self,
        id: Uuid,
        summary: &str,
        end_time: DateTime<Utc>,
    ) -> Result<Option<Conversation>>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Append a message to a conversation
    async fn create(&self, new_message: NewMessage) -> Result<Message>;

    /// List a conversation's messages in timestamp order
    async fn list_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<Message>>;
}

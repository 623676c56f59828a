use crate::actions::models::AggregatedAction;
use crate::actions::ports::{FollowUpRepository, NoteRepository, PrescriptionRepository};
use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

/// Aggregates notes, follow-ups, and prescriptions into the uniform
/// action projection returned by `get_actions`.
pub struct ActionService {
    notes: Arc<dyn NoteRepository>,
    follow_ups: Arc<dyn FollowUpRepository>,
    prescriptions: Arc<dyn PrescriptionRepository>,
}

impl ActionService {
    pub fn new(
        notes: Arc<dyn NoteRepository>,
        follow_ups: Arc<dyn FollowUpRepository>,
        prescriptions: Arc<dyn PrescriptionRepository>,
    ) -> Self {
        Self {
            notes,
            follow_ups,
            prescriptions,
        }
    }

    /// All actions for a conversation, sorted by creation time ascending
    pub async fn aggregate(&self, conversation_id: Uuid) -> Result<Vec<AggregatedAction>> {
        let (notes, follow_ups, prescriptions) = tokio::try_join!(
            self.notes.list_by_conversation(conversation_id),
            self.follow_ups.list_by_conversation(conversation_id),
            self.prescriptions.list_by_conversation(conversation_id),
        )?;

        let mut actions: Vec<AggregatedAction> = notes
            .iter()
            .map(AggregatedAction::from)
            .chain(follow_ups.iter().map(AggregatedAction::from))
            .chain(prescriptions.iter().map(AggregatedAction::from))
            .collect();

        actions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(actions)
    }
}

use async_trait::async_trait;

/// Contract for the LLM-backed summary operations
///
/// `None` signals failure; the coordinator maps that to the
/// `ended_error` terminal status for end-of-session summaries.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize_conversation(&self, context: &str) -> Option<String>;
    async fn generate_medical_history(&self, patient_context: &str) -> Option<String>;
}

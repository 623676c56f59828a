use crate::commands::models::CommandInvocation;
use async_trait::async_trait;

/// Contract for extracting a tool invocation from free text
///
/// Invoked only for clinician utterances. Detection failures are logged
/// by the implementation and surface as `None`; the pipeline's main
/// sequence never depends on this branch.
#[async_trait]
pub trait CommandDetector: Send + Sync {
    async fn detect(&self, text: &str) -> Option<CommandInvocation>;
}

use async_trait::async_trait;

/// Language operations the pipeline depends on
///
/// Failures never propagate: detection answers "unknown" and translation
/// answers `None`, and the caller degrades accordingly.
#[async_trait]
pub trait LanguageService: Send + Sync {
    /// ISO 639-1 code of the predominant language, or "unknown"
    async fn detect_language(&self, text: &str) -> String;

    /// Translate between two ISO 639-1 languages; `None` on failure or
    /// an empty result
    async fn translate(&self, text: &str, source: &str, target: &str) -> Option<String>;
}

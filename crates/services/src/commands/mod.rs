//! Voice command detection and execution
//!
//! Turns free-text clinician utterances into structured tool invocations
//! and applies them against the repositories.

pub mod detector;
pub mod models;
pub mod ports;
pub mod service;

pub use detector::LlmCommandDetector;
pub use models::*;
pub use ports::CommandDetector;
pub use service::CommandService;

use serde::{Deserialize, Serialize};

/// A structured tool invocation extracted from an utterance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandInvocation {
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Success,
    Error,
    NotFound,
}

/// Outcome of executing a detected command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandExecutionResult {
    pub status: CommandStatus,
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CommandExecutionResult {
    pub fn success(name: &str, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            status: CommandStatus::Success,
            name: name.to_string(),
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn acknowledged(name: &str, message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Success,
            name: name.to_string(),
            message: message.into(),
            data: None,
        }
    }

    pub fn error(name: &str, message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Error,
            name: name.to_string(),
            message: message.into(),
            data: None,
        }
    }

    pub fn not_found(name: &str) -> Self {
        Self {
            status: CommandStatus::NotFound,
            name: name.to_string(),
            message: format!("Unknown tool: {name}"),
            data: None,
        }
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

use crate::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub openai: OpenAiConfig,
    pub auth: AuthConfig,
    pub transcode: TranscodeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub max_connections: usize,
}

/// Upstream OpenAI-style provider configuration.
///
/// One key drives the realtime transcription socket, the chat completion
/// client, and the speech synthesis client; components receive it at
/// construction time and never re-read the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub api_base: String,
    pub realtime_url: String,
    pub transcription_model: String,
    pub chat_model: String,
    pub tts_model: String,
    pub tts_voice: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_ttl_hours: i64,
    pub refresh_token_ttl_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeConfig {
    /// Path to the ffmpeg binary used for audio decoding
    pub ffmpeg_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub modules: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut modules = HashMap::new();
        modules.insert("api".to_string(), "debug".to_string());
        modules.insert("services".to_string(), "debug".to_string());

        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            modules,
        }
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn optional(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse<T: std::str::FromStr>(name: &str, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidVar(name.to_string(), value))
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig {
                host: optional("SERVER_HOST", "0.0.0.0"),
                port: parse("SERVER_PORT", optional("SERVER_PORT", "3001"))?,
            },
            database: DatabaseConfig {
                host: optional("DATABASE_HOST", "localhost"),
                port: parse("DATABASE_PORT", optional("DATABASE_PORT", "5432"))?,
                database: optional("DATABASE_NAME", "interpreter"),
                username: optional("DATABASE_USER", "postgres"),
                password: optional("DATABASE_PASSWORD", "postgres"),
                max_connections: parse(
                    "DATABASE_MAX_CONNECTIONS",
                    optional("DATABASE_MAX_CONNECTIONS", "16"),
                )?,
            },
            openai: OpenAiConfig {
                api_key: required("OPENAI_API_KEY")?,
                api_base: optional("OPENAI_API_BASE", "https://api.openai.com/v1"),
                realtime_url: optional(
                    "OPENAI_REALTIME_URL",
                    "wss://api.openai.com/v1/realtime?intent=transcription",
                ),
                transcription_model: optional("OPENAI_TRANSCRIPTION_MODEL", "gpt-4o-transcribe"),
                chat_model: optional("OPENAI_CHAT_MODEL", "gpt-4o-mini"),
                tts_model: optional("OPENAI_TTS_MODEL", "tts-1"),
                tts_voice: optional("OPENAI_TTS_VOICE", "alloy"),
            },
            auth: AuthConfig {
                jwt_secret: required("JWT_SECRET")?,
                access_token_ttl_hours: parse(
                    "ACCESS_TOKEN_TTL_HOURS",
                    optional("ACCESS_TOKEN_TTL_HOURS", "1"),
                )?,
                refresh_token_ttl_hours: parse(
                    "REFRESH_TOKEN_TTL_HOURS",
                    optional("REFRESH_TOKEN_TTL_HOURS", "168"),
                )?,
            },
            transcode: TranscodeConfig {
                ffmpeg_path: optional("FFMPEG_PATH", "ffmpeg"),
            },
            logging: LoggingConfig {
                level: optional("LOG_LEVEL", "info"),
                format: optional("LOG_FORMAT", "pretty"),
                modules: LoggingConfig::default().modules,
            },
        })
    }
}

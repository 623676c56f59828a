//! Realtime transcription wire protocol
//!
//! Framed JSON protocol spoken over a WebSocket to the upstream realtime
//! transcription service. The session lifecycle (reconnects, backoff,
//! transcoder coupling) lives in the services crate; this module owns the
//! frame types and the dial.

use crate::ProviderError;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsSink = SplitSink<WsStream, Message>;
pub type WsSource = SplitStream<WsStream>;

/// Frames sent to the transcription service
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum OutboundFrame {
    #[serde(rename = "transcription_session.update")]
    SessionUpdate { session: TranscriptionSessionConfig },

    #[serde(rename = "input_audio_buffer.append")]
    Append {
        /// Base64-encoded PCM16 audio
        audio: String,
    },

    #[serde(rename = "input_audio_buffer.commit")]
    Commit,
}

/// Frames received from the transcription service
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum InboundFrame {
    #[serde(rename = "transcription_session.created")]
    SessionCreated { session: serde_json::Value },

    #[serde(rename = "transcription_session.updated")]
    SessionUpdated { session: serde_json::Value },

    #[serde(rename = "input_audio_buffer.committed")]
    Committed {
        #[serde(default)]
        item_id: Option<String>,
    },

    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    TranscriptionDelta {
        #[serde(default)]
        item_id: Option<String>,
        delta: String,
    },

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted {
        #[serde(default)]
        item_id: Option<String>,
        transcript: String,
    },

    #[serde(rename = "error")]
    Error { error: serde_json::Value },

    #[serde(other)]
    Unknown,
}

/// Session configuration sent once after the socket opens
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionSessionConfig {
    pub input_audio_transcription: TranscriptionModelConfig,
    pub turn_detection: TurnDetection,
    pub include: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionModelConfig {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// Server-side voice activity detection tuning
#[derive(Debug, Clone, Serialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub detection_type: String,
    pub silence_duration_ms: u32,
    pub prefix_padding_ms: u32,
    pub threshold: f32,
}

impl TranscriptionSessionConfig {
    /// Default configuration for a conversational transcription session
    pub fn for_model(model: &str) -> Self {
        Self {
            input_audio_transcription: TranscriptionModelConfig {
                model: model.to_string(),
                prompt: None,
            },
            turn_detection: TurnDetection {
                detection_type: "server_vad".to_string(),
                silence_duration_ms: 500,
                prefix_padding_ms: 300,
                threshold: 0.5,
            },
            include: vec!["item.input_audio_transcription.logprobs".to_string()],
        }
    }
}

/// Dial target for the realtime transcription service
#[derive(Debug, Clone)]
pub struct RealtimeEndpoint {
    pub url: String,
    pub api_key: String,
}

impl RealtimeEndpoint {
    pub fn new(url: String, api_key: String) -> Self {
        Self { url, api_key }
    }

    /// Open the WebSocket and split it into sink and source halves
    ///
    /// The handshake headers themselves are filled in by the client
    /// implementation; only auth and the beta opt-in are ours.
    pub async fn connect(&self) -> Result<(WsSink, WsSource), ProviderError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ProviderError::WebSocketError(format!("Invalid realtime URL: {e}")))?;

        let auth_value = format!("Bearer {}", self.api_key)
            .parse()
            .map_err(|_| ProviderError::WebSocketError("Invalid API key format".to_string()))?;
        request.headers_mut().insert("Authorization", auth_value);
        request
            .headers_mut()
            .insert("OpenAI-Beta", "realtime=v1".parse().expect("static header"));

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| ProviderError::WebSocketError(format!("WebSocket connect failed: {e}")))?;

        Ok(ws_stream.split())
    }
}

/// Encode an outbound frame as a WebSocket text message
pub fn encode_frame(frame: &OutboundFrame) -> Result<Message, ProviderError> {
    let json = serde_json::to_string(frame)
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
    Ok(Message::Text(json.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_update_frame_shape() {
        let frame = OutboundFrame::SessionUpdate {
            session: TranscriptionSessionConfig::for_model("gpt-4o-transcribe"),
        };
        let json = serde_json::to_value(&frame).unwrap();

        assert_eq!(json["type"], "transcription_session.update");
        assert_eq!(
            json["session"]["input_audio_transcription"]["model"],
            "gpt-4o-transcribe"
        );
        assert_eq!(json["session"]["turn_detection"]["type"], "server_vad");
        assert_eq!(json["session"]["turn_detection"]["silence_duration_ms"], 500);
    }

    #[test]
    fn append_and_commit_frames() {
        let append = serde_json::to_value(OutboundFrame::Append {
            audio: "cGNt".to_string(),
        })
        .unwrap();
        assert_eq!(append["type"], "input_audio_buffer.append");
        assert_eq!(append["audio"], "cGNt");

        let commit = serde_json::to_value(OutboundFrame::Commit).unwrap();
        assert_eq!(commit["type"], "input_audio_buffer.commit");
    }

    #[test]
    fn completed_frame_parses() {
        let raw = r#"{
            "type": "conversation.item.input_audio_transcription.completed",
            "item_id": "item_1",
            "transcript": "Me duele la cabeza"
        }"#;

        match serde_json::from_str::<InboundFrame>(raw).unwrap() {
            InboundFrame::TranscriptionCompleted {
                item_id,
                transcript,
            } => {
                assert_eq!(item_id.as_deref(), Some("item_1"));
                assert_eq!(transcript, "Me duele la cabeza");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn unknown_frames_are_tolerated() {
        let raw = r#"{"type": "rate_limits.updated", "rate_limits": []}"#;
        assert!(matches!(
            serde_json::from_str::<InboundFrame>(raw).unwrap(),
            InboundFrame::Unknown
        ));
    }

    #[test]
    fn realtime_url_parses_as_client_request() {
        let request = "wss://api.openai.com/v1/realtime?intent=transcription"
            .into_client_request()
            .unwrap();
        assert_eq!(request.uri().host(), Some("api.openai.com"));
        assert_eq!(request.uri().query(), Some("intent=transcription"));
    }
}

//! Speech synthesis client
//!
//! Client for an OpenAI-compatible `/audio/speech` endpoint. Returns the
//! synthesized audio as raw bytes; the pipeline base64-encodes it for the
//! control channel.

use crate::{ProviderError, SpeechParams, SpeechResponse};
use reqwest::header::HeaderValue;
use reqwest::Client;

pub struct SpeechClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SpeechClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url,
            api_key,
        }
    }

    pub async fn synthesize(&self, params: SpeechParams) -> Result<SpeechResponse, ProviderError> {
        let url = format!("{}/audio/speech", self.base_url);

        tracing::debug!(model = %params.model, voice = %params.voice, "Speech synthesis request");

        let auth_value = format!("Bearer {}", self.api_key);
        let header_value = HeaderValue::from_str(&auth_value)
            .map_err(|e| ProviderError::RequestError(format!("Invalid API key format: {e}")))?;

        let response = self
            .client
            .post(&url)
            .header("Authorization", header_value)
            .timeout(std::time::Duration::from_secs(60))
            .json(&params)
            .send()
            .await
            .map_err(|e| ProviderError::RequestError(e.to_string()))?;

        if !response.status().is_success() {
            let status_code = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|e| format!("Failed to read error response body: {e}"));
            return Err(ProviderError::HttpError {
                status_code,
                message,
            });
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();

        let audio_data = response
            .bytes()
            .await
            .map_err(|e| ProviderError::RequestError(e.to_string()))?
            .to_vec();

        Ok(SpeechResponse {
            audio_data,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn synthesize_returns_audio_bytes() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/audio/speech")
                .header("authorization", "Bearer test-key");
            then.status(200)
                .header("content-type", "audio/mpeg")
                .body(&[0x49u8, 0x44, 0x33, 0x04][..]);
        });

        let client = SpeechClient::new(server.base_url(), "test-key".to_string());
        let response = client
            .synthesize(SpeechParams {
                model: "tts-1".to_string(),
                input: "Me duele la cabeza".to_string(),
                voice: "alloy".to_string(),
                response_format: Some("mp3".to_string()),
                speed: None,
            })
            .await
            .unwrap();

        mock.assert();
        assert_eq!(response.content_type, "audio/mpeg");
        assert_eq!(response.audio_data, vec![0x49, 0x44, 0x33, 0x04]);
    }
}

//! Chat completion client
//!
//! Thin client for an OpenAI-compatible `/chat/completions` endpoint. The
//! interpreter uses it for language detection, translation, command
//! detection, and conversation summaries.

use crate::{ChatCompletionParams, ChatCompletionResponse, ProviderError};
use reqwest::header::HeaderValue;
use reqwest::Client;

pub struct ChatClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ChatClient {
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

    fn build_headers(&self) -> Result<reqwest::header::HeaderMap, ProviderError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        let auth_value = format!("Bearer {}", self.api_key);
        let header_value = HeaderValue::from_str(&auth_value)
            .map_err(|e| ProviderError::RequestError(format!("Invalid API key format: {e}")))?;
        headers.insert("Authorization", header_value);

        Ok(headers)
    }

    pub async fn chat_completion(
        &self,
        params: ChatCompletionParams,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let headers = self.build_headers()?;

        tracing::debug!(model = %params.model, messages = params.messages.len(), "Chat completion request");

        let response = self
            .client
            .post(&url)
            .headers(headers)
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

        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatMessage;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn chat_completion_round_trip() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer test-key");
            then.status(200).json_body(serde_json::json!({
                "id": "chatcmpl-1",
                "choices": [{
                    "index": 0,
                    "message": { "role": "assistant", "content": "hola" },
                    "finish_reason": "stop"
                }]
            }));
        });

        let client = ChatClient::new(server.base_url(), "test-key".to_string());
        let response = client
            .chat_completion(ChatCompletionParams {
                model: "gpt-4o-mini".to_string(),
                messages: vec![ChatMessage::user("translate: hello")],
                temperature: Some(0.0),
                max_tokens: None,
                tools: None,
                tool_choice: None,
            })
            .await
            .unwrap();

        mock.assert();
        assert_eq!(response.first_text(), Some("hola"));
    }

    #[tokio::test]
    async fn chat_completion_surfaces_http_errors() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(429).body("rate limited");
        });

        let client = ChatClient::new(server.base_url(), "test-key".to_string());
        let err = client
            .chat_completion(ChatCompletionParams {
                model: "gpt-4o-mini".to_string(),
                messages: vec![ChatMessage::user("hi")],
                temperature: None,
                max_tokens: None,
                tools: None,
                tool_choice: None,
            })
            .await
            .unwrap_err();

        match err {
            ProviderError::HttpError {
                status_code,
                message,
            } => {
                assert_eq!(status_code, 429);
                assert_eq!(message, "rate limited");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

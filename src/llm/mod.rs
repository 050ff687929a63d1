//! Answer generation through a hosted chat-completions API.
//!
//! The default deployment talks to Groq's OpenAI-compatible endpoint, but any server that
//! accepts `POST {base}/chat/completions` with a bearer key works. The processing layer only
//! depends on the [`ChatClient`] trait.

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced while generating an answer.
#[derive(Debug, Error)]
pub enum ChatClientError {
    /// Provider could not be reached or rejected the credentials.
    #[error("Chat provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Request passed to the chat provider.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Optional system instruction sent ahead of the prompt.
    pub system: Option<String>,
    /// Fully rendered user prompt.
    pub prompt: String,
}

/// Interface implemented by answer-generating providers.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Generate a completion for the supplied prompt.
    async fn complete(&self, request: ChatRequest) -> Result<String, ChatClientError>;
}

/// Build the chat client described by the configuration.
pub fn build_chat_client(
    config: &Config,
) -> Result<Box<dyn ChatClient + Send + Sync>, ChatClientError> {
    let client = GroqChatClient::new(
        config.llm_base_url.clone(),
        config.llm_model.clone(),
        config.groq_api_key.clone(),
        config.llm_temperature,
    )?;
    tracing::debug!(
        base_url = %config.llm_base_url,
        model = %config.llm_model,
        "Chat client initialized"
    );
    Ok(Box::new(client))
}

/// Chat client for Groq (or any OpenAI-compatible chat completions API).
pub struct GroqChatClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct CompletionPayload<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl GroqChatClient {
    /// Build a client for `base_url` (for example `https://api.groq.com/openai/v1`).
    pub fn new(
        base_url: String,
        model: String,
        api_key: String,
        temperature: Option<f32>,
    ) -> Result<Self, ChatClientError> {
        let http = Client::builder()
            .user_agent("docchat/chat")
            .build()
            .map_err(|error| ChatClientError::ProviderUnavailable(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            model,
            api_key,
            temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatClient for GroqChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, ChatClientError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(Message {
                role: "system",
                content: system,
            });
        }
        messages.push(Message {
            role: "user",
            content: &request.prompt,
        });
        let payload = CompletionPayload {
            model: &self.model,
            messages,
            stream: false,
            temperature: self.temperature,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                ChatClientError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ChatClientError::ProviderUnavailable(format!(
                "chat provider rejected credentials ({status})"
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatClientError::GenerationFailed(format!(
                "chat provider returned {status}: {body}"
            )));
        }

        let body: CompletionResponse = response.json().await.map_err(|error| {
            ChatClientError::InvalidResponse(format!("failed to decode completion: {error}"))
        })?;

        let answer = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ChatClientError::InvalidResponse("completion had no choices".into()))?;

        Ok(answer.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn client(server: &MockServer, temperature: Option<f32>) -> GroqChatClient {
        GroqChatClient::new(
            format!("{}/openai/v1", server.base_url()),
            "llama3-70b-8192".into(),
            "gsk-test".into(),
            temperature,
        )
        .expect("client")
    }

    #[tokio::test]
    async fn groq_client_returns_first_choice() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/openai/v1/chat/completions")
                    .header("authorization", "Bearer gsk-test")
                    .json_body(json!({
                        "model": "llama3-70b-8192",
                        "messages": [{ "role": "user", "content": "What is in the PDF?" }],
                        "stream": false
                    }));
                then.status(200).json_body(json!({
                    "id": "chatcmpl-1",
                    "choices": [
                        { "index": 0, "message": { "role": "assistant", "content": "  Hello! It is a lease.  " } }
                    ]
                }));
            })
            .await;

        let answer = client(&server, None)
            .complete(ChatRequest {
                system: None,
                prompt: "What is in the PDF?".into(),
            })
            .await
            .expect("answer");

        mock.assert_async().await;
        assert_eq!(answer, "Hello! It is a lease.");
    }

    #[tokio::test]
    async fn groq_client_sends_system_message_and_temperature() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/openai/v1/chat/completions")
                    .json_body(json!({
                        "model": "llama3-70b-8192",
                        "messages": [
                            { "role": "system", "content": "Be brief." },
                            { "role": "user", "content": "Q" }
                        ],
                        "stream": false,
                        "temperature": 0.5
                    }));
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "content": "A" } }]
                }));
            })
            .await;

        let answer = client(&server, Some(0.5))
            .complete(ChatRequest {
                system: Some("Be brief.".into()),
                prompt: "Q".into(),
            })
            .await
            .expect("answer");

        mock.assert_async().await;
        assert_eq!(answer, "A");
    }

    #[tokio::test]
    async fn groq_client_maps_unauthorized() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/openai/v1/chat/completions");
                then.status(401).body("invalid api key");
            })
            .await;

        let error = client(&server, None)
            .complete(ChatRequest {
                system: None,
                prompt: "Q".into(),
            })
            .await
            .expect_err("unauthorized");
        assert!(matches!(error, ChatClientError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn groq_client_rejects_empty_choices() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/openai/v1/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = client(&server, None)
            .complete(ChatRequest {
                system: None,
                prompt: "Q".into(),
            })
            .await
            .expect_err("no choices");
        assert!(matches!(error, ChatClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn groq_client_surfaces_rate_limits() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/openai/v1/chat/completions");
                then.status(429).body("rate limited");
            })
            .await;

        let error = client(&server, None)
            .complete(ChatRequest {
                system: None,
                prompt: "Q".into(),
            })
            .await
            .expect_err("rate limited");
        assert!(
            matches!(error, ChatClientError::GenerationFailed(ref message) if message.contains("429"))
        );
    }
}

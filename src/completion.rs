//! Abstractions for generating text with a language model.
//!
//! Summaries, answers, and quizzes all go through [`CompletionClient`]. The OpenAI adapter
//! talks to `/chat/completions`; the Ollama adapter issues a non-streaming `/api/generate`
//! request, folding system messages into the `system` field.

use crate::config::{CompletionProvider, Config};
use crate::embedding::{endpoint, http_client};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum CompletionClientError {
    /// The provider needs an API key that is not configured.
    #[error("OPENAI_API_KEY not set in environment.")]
    MissingApiKey,
    /// Provider was unreachable.
    #[error("Completion provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions and context.
    System,
    /// The end user's input.
    User,
}

/// One message of a chat prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Author of the message.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Prompt passed to the completion provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Messages in conversation order.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Interface implemented by language-model providers.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate the assistant reply for `request`.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionClientError>;
}

/// Build the completion client selected by `config`.
pub fn build_completion_client(config: &Config) -> Arc<dyn CompletionClient> {
    tracing::info!(
        provider = ?config.completion_provider,
        model = %config.completion_model,
        "Initializing completion client"
    );
    let http = http_client(config.request_timeout_secs);
    match config.completion_provider {
        CompletionProvider::OpenAI => Arc::new(OpenAiCompletionClient {
            http,
            base_url: config.openai_base_url.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.completion_model.clone(),
        }),
        CompletionProvider::Ollama => Arc::new(OllamaCompletionClient {
            http,
            base_url: config.ollama_url.clone(),
            model: config.completion_model.clone(),
        }),
    }
}

/// Client for the OpenAI chat completions API.
pub struct OpenAiCompletionClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompletionClient {
    /// Construct a client; a missing `api_key` surfaces as an error on first use.
    pub fn new(http: Client, base_url: String, api_key: Option<String>, model: String) -> Self {
        Self {
            http,
            base_url,
            api_key,
            model,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionClientError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(CompletionClientError::MissingApiKey)?;
        let payload = json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": request.temperature,
        });

        let response = self
            .http
            .post(endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                CompletionClientError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionClientError::GenerationFailed(format!(
                "OpenAI returned {status}: {body}"
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            CompletionClientError::InvalidResponse(format!("failed to decode response: {error}"))
        })?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CompletionClientError::InvalidResponse("response had no choices".into()))
    }
}

/// Client for a local Ollama runtime.
pub struct OllamaCompletionClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaCompletionClient {
    /// Construct a client for the runtime at `base_url`.
    pub fn new(http: Client, base_url: String, model: String) -> Self {
        Self {
            http,
            base_url,
            model,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

fn join_role(messages: &[ChatMessage], role: ChatRole) -> String {
    messages
        .iter()
        .filter(|message| message.role == role)
        .map(|message| message.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl CompletionClient for OllamaCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionClientError> {
        let system = join_role(&request.messages, ChatRole::System);
        let prompt = join_role(&request.messages, ChatRole::User);
        let payload = json!({
            "model": self.model,
            "system": system,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": request.temperature },
        });

        let response = self
            .http
            .post(endpoint(&self.base_url, "api/generate"))
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                CompletionClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CompletionClientError::ProviderUnavailable(format!(
                "Ollama model '{}' not found",
                self.model
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionClientError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            CompletionClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if !body.done {
            return Err(CompletionClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn request() -> CompletionRequest {
        CompletionRequest {
            messages: vec![
                ChatMessage::system("You are a professor."),
                ChatMessage::user("What is osmosis?"),
            ],
            temperature: 0.1,
        }
    }

    #[tokio::test]
    async fn openai_client_returns_first_choice() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .json_body_partial(
                        r#"{"model":"gpt-4o-mini","messages":[{"role":"system","content":"You are a professor."},{"role":"user","content":"What is osmosis?"}]}"#,
                    );
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "role": "assistant", "content": "Diffusion of water." } }]
                }));
            })
            .await;

        let client = OpenAiCompletionClient::new(
            Client::new(),
            server.base_url(),
            Some("sk-test".into()),
            "gpt-4o-mini".into(),
        );
        let answer = client.complete(request()).await.expect("completion");

        mock.assert_async().await;
        assert_eq!(answer, "Diffusion of water.");
    }

    #[tokio::test]
    async fn openai_client_rejects_empty_choices() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let client = OpenAiCompletionClient::new(
            Client::new(),
            server.base_url(),
            Some("sk-test".into()),
            "gpt-4o-mini".into(),
        );
        let error = client.complete(request()).await.unwrap_err();
        assert!(matches!(error, CompletionClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn openai_client_requires_api_key() {
        let client = OpenAiCompletionClient::new(
            Client::new(),
            "http://127.0.0.1:9".into(),
            None,
            "gpt-4o-mini".into(),
        );
        let error = client.complete(request()).await.unwrap_err();
        assert_eq!(error.to_string(), "OPENAI_API_KEY not set in environment.");
    }

    #[tokio::test]
    async fn ollama_client_splits_system_and_prompt() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate").json_body_partial(
                    r#"{"system":"You are a professor.","prompt":"What is osmosis?","stream":false}"#,
                );
                then.status(200).json_body(json!({
                    "response": "  Water moving across a membrane. ",
                    "done": true
                }));
            })
            .await;

        let client =
            OllamaCompletionClient::new(Client::new(), server.base_url(), "llama3".into());
        let answer = client.complete(request()).await.expect("completion");

        mock.assert_async().await;
        assert_eq!(answer, "Water moving across a membrane.");
    }

    #[tokio::test]
    async fn ollama_client_handles_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("boom");
            })
            .await;

        let client =
            OllamaCompletionClient::new(Client::new(), server.base_url(), "llama3".into());
        let error = client.complete(request()).await.unwrap_err();
        assert!(
            matches!(error, CompletionClientError::GenerationFailed(ref message) if message.contains("500"))
        );
    }
}

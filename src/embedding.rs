//! Embedding client abstraction and adapters.
//!
//! Three backends implement [`EmbeddingClient`]: the hosted OpenAI embeddings API, a local
//! Ollama runtime, and a deterministic hashing encoder that needs no network and is used for
//! offline runs and tests.

mod hashing;
mod ollama;
mod openai;

pub use hashing::HashingEmbeddingClient;
pub use ollama::OllamaEmbeddingClient;
pub use openai::OpenAiEmbeddingClient;

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// The provider needs an API key that is not configured.
    #[error("OPENAI_API_KEY not set in environment.")]
    MissingApiKey,
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider response could not be decoded or did not match the request.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Build the embedding client selected by `config`.
pub fn build_embedding_client(config: &Config) -> Arc<dyn EmbeddingClient> {
    tracing::info!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        "Initializing embedding client"
    );
    match config.embedding_provider {
        EmbeddingProvider::OpenAI => Arc::new(OpenAiEmbeddingClient::new(
            http_client(config.request_timeout_secs),
            config.openai_base_url.clone(),
            config.openai_api_key.clone(),
            config.embedding_model.clone(),
        )),
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbeddingClient::new(
            http_client(config.request_timeout_secs),
            config.ollama_url.clone(),
            config.embedding_model.clone(),
        )),
        EmbeddingProvider::Hashing => {
            Arc::new(HashingEmbeddingClient::new(config.embedding_dimension))
        }
    }
}

/// Shared `reqwest` client builder for provider adapters.
pub(crate) fn http_client(timeout_secs: Option<u64>) -> Client {
    let mut builder = Client::builder().user_agent(concat!("studyassist/", env!("CARGO_PKG_VERSION")));
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build().unwrap_or_else(|error| {
        tracing::warn!(error = %error, "Falling back to default HTTP client");
        Client::new()
    })
}

/// Join a base URL and an endpoint path with exactly one slash.
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_normalizes_slashes() {
        assert_eq!(
            endpoint("http://localhost:11434/", "/api/embed"),
            "http://localhost:11434/api/embed"
        );
        assert_eq!(
            endpoint("https://api.openai.com/v1", "embeddings"),
            "https://api.openai.com/v1/embeddings"
        );
    }

    #[tokio::test]
    async fn hashing_provider_is_selected_from_config() {
        let config = Config {
            embedding_provider: EmbeddingProvider::Hashing,
            embedding_dimension: 16,
            ..Config::default()
        };
        let client = build_embedding_client(&config);
        let vectors = client
            .generate_embeddings(vec!["photosynthesis".into()])
            .await
            .unwrap();
        assert_eq!(vectors[0].len(), 16);
    }
}

//! Embedding client abstraction and provider adapters.
//!
//! Every provider implements [`EmbeddingClient`]; the processing service only ever sees the
//! trait object returned by [`build_embedding_client`]. Providers talk to their runtime over
//! HTTP except [`HashEmbeddingClient`], which never leaves the process.

mod hash;
mod ollama;
mod openai;

pub use hash::HashEmbeddingClient;
pub use ollama::OllamaEmbeddingClient;
pub use openai::OpenAiEmbeddingClient;

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider response could not be decoded or did not match the request.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
    /// Returned vectors do not have the configured dimensionality.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured on the server.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient {
    /// Produce an embedding vector for each supplied chunk of text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Build an embedding client suitable for the supplied configuration.
pub fn build_embedding_client(
    config: &Config,
) -> Result<Box<dyn EmbeddingClient + Send + Sync>, EmbeddingClientError> {
    tracing::debug!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        dimension = ?config.embedding_dimension,
        "Building embedding client"
    );
    let client: Box<dyn EmbeddingClient + Send + Sync> = match config.embedding_provider {
        EmbeddingProvider::Ollama => Box::new(OllamaEmbeddingClient::new(
            config
                .embedding_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            config.embedding_model.clone(),
        )?),
        EmbeddingProvider::OpenAI => {
            let api_key = config.embedding_api_key.clone().ok_or_else(|| {
                EmbeddingClientError::ProviderUnavailable(
                    "EMBEDDING_API_KEY is required for the openai provider".into(),
                )
            })?;
            Box::new(OpenAiEmbeddingClient::new(
                config
                    .embedding_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
                config.embedding_model.clone(),
                api_key,
            )?)
        }
        EmbeddingProvider::Hash => Box::new(HashEmbeddingClient::new(
            config.embedding_dimension.unwrap_or(hash::DEFAULT_DIMENSION),
        )),
    };
    Ok(client)
}

/// Embed `texts` in batches of at most `batch_size`, preserving input order.
///
/// Every returned vector is checked against `expected_dimension` when one is configured, and
/// all vectors must share the dimension of the first.
pub async fn embed_in_batches(
    client: &(dyn EmbeddingClient + Send + Sync),
    texts: Vec<String>,
    batch_size: usize,
    expected_dimension: Option<usize>,
) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
    if texts.is_empty() {
        return Err(EmbeddingClientError::GenerationFailed(
            "no texts provided".to_string(),
        ));
    }

    let batch_size = batch_size.max(1);
    let total = texts.len();
    let mut vectors = Vec::with_capacity(total);
    let mut pending = texts.into_iter().peekable();
    let mut batch_index = 0usize;

    while pending.peek().is_some() {
        let batch: Vec<String> = pending.by_ref().take(batch_size).collect();
        let requested = batch.len();
        tracing::debug!(batch = batch_index, size = requested, total, "Embedding batch");
        let produced = client.generate_embeddings(batch).await?;
        if produced.len() != requested {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {requested} vectors, provider returned {}",
                produced.len()
            )));
        }
        vectors.extend(produced);
        batch_index += 1;
    }

    let expected = expected_dimension.or_else(|| vectors.first().map(Vec::len));
    if let Some(expected) = expected {
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != expected) {
            return Err(EmbeddingClientError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }
    }

    Ok(vectors)
}

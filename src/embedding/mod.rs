//! Text embeddings and nearest-neighbour lookup
//!
//! - [`Embedder`]: the text → vector boundary
//! - [`HashingEmbedder`]: deterministic local feature hashing (default)
//! - [`HttpEmbedder`]: OpenAI-compatible `/embeddings` endpoint
//! - [`nearest`] / [`most_similar`]: minimum cosine distance search

mod hashing;
mod http;
mod similarity;

pub use hashing::HashingEmbedder;
pub use http::HttpEmbedder;
pub use similarity::{cosine_distance, cosine_similarity, most_similar, nearest};

use crate::config::{EmbeddingBackendKind, EmbeddingConfig};
use crate::ConfigError;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while producing an embedding
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Nothing to embed")]
    EmptyInput,

    #[error("Embedding endpoint returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Expected {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Malformed embedding response: {0}")]
    Response(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Result type for embedding operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Text → vector function
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds one text
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Length of every vector this embedder returns
    fn dimensions(&self) -> usize;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// Builds the configured embedder
///
/// The HTTP backend reads its API key from the named environment variable here,
/// once; a missing variable is a configuration error.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, ConfigError> {
    match config.backend {
        EmbeddingBackendKind::Hashing => {
            let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(config.dimensions));
            Ok(embedder)
        }
        EmbeddingBackendKind::Http => {
            let endpoint = config.endpoint.clone().ok_or_else(|| {
                ConfigError::Validation("http embedding backend needs an endpoint".to_string())
            })?;

            let api_key = match &config.api_key_env {
                Some(var) => Some(
                    std::env::var(var).map_err(|_| ConfigError::MissingEnv(var.clone()))?,
                ),
                None => None,
            };

            let embedder = HttpEmbedder::new(
                endpoint,
                config
                    .model
                    .clone()
                    .unwrap_or_else(|| "text-embedding-3-small".to_string()),
                config.dimensions,
                api_key,
            )
            .map_err(|e| ConfigError::Validation(format!("embedding client: {}", e)))?;

            let embedder: Arc<dyn Embedder> = Arc::new(embedder);
            Ok(embedder)
        }
    }
}

//! Query-side feature extraction.
//!
//! Search requests need the query turned into a vector living in the same
//! space as the stored collection:
//!
//! - `openai`: hosted text embeddings (and chat completions, reused by `enhance`)
//! - `local`: fastembed text model running in-process
//! - `remote`: HTTP feature extraction service for image and audio bytes

#[cfg(feature = "local-embeddings")]
pub mod local;
pub mod openai;
pub mod remote;

#[cfg(feature = "local-embeddings")]
pub use local::LocalTextEmbedder;
pub use openai::{OpenAiClient, OpenAiEmbedder};
pub use remote::RemoteExtractor;

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),

    #[error("Embedding request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Embedding provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),
}

/// Embeds a free-text query.
pub trait TextEmbedder: Send + Sync {
    fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Get the name of this embedder for logging/debugging
    fn name(&self) -> &str;
}

/// Embeds raw media bytes (an uploaded image or audio clip).
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, data: &[u8], content_type: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Rejects empty or non-finite vectors before they reach the store.
pub(crate) fn check_embedding(embedding: Vec<f32>) -> Result<Vec<f32>, EmbeddingError> {
    if embedding.is_empty() {
        return Err(EmbeddingError::EmbeddingFailed(
            "No embedding returned".to_string(),
        ));
    }
    if embedding.iter().any(|x| !x.is_finite()) {
        return Err(EmbeddingError::EmbeddingFailed(
            "Embedding contains non-finite values".to_string(),
        ));
    }
    Ok(embedding)
}

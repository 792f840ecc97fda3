use crate::{catalog::BirdId, embeddings::EmbeddingError, media::MediaError, store::StoreError};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Bird with ID {0} not found")]
    NotFound(BirdId),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    InvalidMedia(#[from] MediaError),

    #[error("{0}")]
    TooLarge(String),

    /// A modality whose extractor is not configured.
    #[error("{0}")]
    Unavailable(String),

    #[error("vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

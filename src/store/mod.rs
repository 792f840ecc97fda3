//! Vector database access.
//!
//! The rest of the crate only sees the [`VectorStore`] trait: a full export
//! (`scroll`) used to build the catalog snapshot, and similarity `search`
//! used per request. [`QdrantStore`] talks to Qdrant's REST API.

mod qdrant;

pub use qdrant::QdrantStore;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::catalog::Payload;

/// A stored record without score, as returned by a scroll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: Value,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub payload: Payload,
}

/// A similarity search hit. `score` is the store's native metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: Value,
    pub score: f64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub payload: Payload,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub status: Option<String>,
    pub points_count: Option<u64>,
    pub vector_size: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("vector store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("vector store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed vector store response: {0}")]
    Malformed(String),
}

pub trait VectorStore: Send + Sync {
    /// Exports every point of a collection, `page_size` points per request.
    fn scroll(&self, collection: &str, page_size: usize) -> Result<Vec<Point>, StoreError>;

    /// Returns up to `limit` nearest points, best first.
    fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError>;

    fn collection_info(&self, collection: &str) -> Result<CollectionInfo, StoreError>;
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Payload, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Payload>::deserialize(deserializer)?.unwrap_or_default())
}

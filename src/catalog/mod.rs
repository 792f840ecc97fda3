//! The bird catalog as the API sees it.
//!
//! - `types`: records stored in the three collections and the joined results
//! - `snapshot`: the in-memory replica of the collections and its refresh
//! - `joiner`: hit -> result assembly and per-bird deduplication

pub mod joiner;
pub mod snapshot;
pub mod types;

pub use joiner::{bird_detail, catalog, deduplicate_by_entity, join, join_all};
pub use snapshot::{CatalogLoader, Snapshot, SnapshotCache, SnapshotCounts};
pub use types::{
    bird_id_of, AudioRecord, BirdDetail, BirdId, CatalogEntry, ComprehensiveResult, ImageRecord,
    Modality, Payload, TextRecord, UNKNOWN_SPECIES,
};

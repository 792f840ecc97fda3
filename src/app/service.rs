//! Search service: the layer between HTTP handlers and the catalog.
//!
//! Validates requests, turns queries into vectors, asks the vector store for
//! neighbours and hands the hits to the joiner. Everything here is blocking;
//! the web layer runs it inside `block_in_place`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::catalog::{
    self, BirdDetail, BirdId, CatalogEntry, ComprehensiveResult, Modality, SnapshotCache,
    SnapshotCounts,
};
use crate::config::{CollectionsConfig, SearchConfig};
use crate::embeddings::{FeatureExtractor, TextEmbedder};
use crate::enhance::DescriptionEnhancer;
use crate::media::{self, MediaKind};
use crate::store::VectorStore;

use super::errors::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<ComprehensiveResult>,
    pub total_found: usize,
    pub search_type: Modality,
}

impl SearchResponse {
    fn new(results: Vec<ComprehensiveResult>, search_type: Modality) -> Self {
        Self {
            total_found: results.len(),
            results,
            search_type,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogResponse {
    pub results: Vec<CatalogEntry>,
    pub total_found: usize,
    pub search_type: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshResponse {
    pub message: &'static str,
    pub counts: SnapshotCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModalityStats {
    pub total_points: usize,
    pub status: &'static str,
}

impl ModalityStats {
    fn new(total_points: usize) -> Self {
        Self {
            total_points,
            status: if total_points > 0 { "loaded" } else { "empty" },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub text: ModalityStats,
    pub image: ModalityStats,
    pub audio: ModalityStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub database_stats: DatabaseStats,
    pub total_collections: usize,
    pub loaded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CollectionStatus {
    Active {
        points_count: Option<u64>,
        vector_size: Option<u64>,
    },
    Error {
        error: String,
    },
}

pub struct SearchService {
    store: Arc<dyn VectorStore>,
    cache: Arc<SnapshotCache>,
    collections: CollectionsConfig,
    search: SearchConfig,

    text_embedder: Option<Arc<dyn TextEmbedder>>,
    image_extractor: Option<Arc<dyn FeatureExtractor>>,
    audio_extractor: Option<Arc<dyn FeatureExtractor>>,
    enhancer: Option<Arc<dyn DescriptionEnhancer>>,
}

impl SearchService {
    /// Create a service with no extractors attached.
    ///
    /// Searches for a modality without an extractor answer `Unavailable`.
    pub fn new(
        store: Arc<dyn VectorStore>,
        cache: Arc<SnapshotCache>,
        collections: CollectionsConfig,
        search: SearchConfig,
    ) -> Self {
        Self {
            store,
            cache,
            collections,
            search,
            text_embedder: None,
            image_extractor: None,
            audio_extractor: None,
            enhancer: None,
        }
    }

    pub fn with_text_embedder(mut self, embedder: Arc<dyn TextEmbedder>) -> Self {
        self.text_embedder = Some(embedder);
        self
    }

    pub fn with_image_extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.image_extractor = Some(extractor);
        self
    }

    pub fn with_audio_extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.audio_extractor = Some(extractor);
        self
    }

    pub fn with_enhancer(mut self, enhancer: Arc<dyn DescriptionEnhancer>) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    fn check_limit(&self, limit: Option<usize>) -> Result<usize, AppError> {
        let limit = limit.unwrap_or(self.search.default_limit);
        if limit == 0 || limit > self.search.max_limit {
            return Err(AppError::InvalidInput(format!(
                "limit must be between 1 and {}, got {limit}",
                self.search.max_limit
            )));
        }
        Ok(limit)
    }

    /// Search birds by a free-text description.
    pub fn search_text(&self, query: &str, limit: Option<usize>) -> Result<SearchResponse, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidInput("query must not be empty".to_string()));
        }
        let limit = self.check_limit(limit)?;

        let embedder = self
            .text_embedder
            .as_ref()
            .ok_or_else(|| AppError::Unavailable("text search is not configured".to_string()))?;

        log::debug!("search_text embedder={} limit={limit}", embedder.name());
        let vector = embedder.embed_text(query)?;

        let hits = self
            .store
            .search(self.collections.name(Modality::Text), &vector, limit)?;

        let snapshot = self.cache.snapshot();
        let results = catalog::join_all(&snapshot, &hits, Modality::Text);

        Ok(SearchResponse::new(results, Modality::Text))
    }

    /// Search birds by an uploaded photo.
    pub fn search_image(
        &self,
        data: &[u8],
        content_type: Option<&str>,
        limit: Option<usize>,
    ) -> Result<SearchResponse, AppError> {
        media::check_upload(MediaKind::Image, content_type, data)?;
        let limit = self.check_limit(limit)?;

        let extractor = self
            .image_extractor
            .as_ref()
            .ok_or_else(|| AppError::Unavailable("image search is not configured".to_string()))?;

        let prepared = media::prepare_image(data)?;
        let vector = extractor.extract(&prepared, "image/png")?;

        self.search_media(Modality::Image, &vector, limit)
    }

    /// Search birds by an uploaded recording.
    pub fn search_audio(
        &self,
        data: &[u8],
        content_type: Option<&str>,
        limit: Option<usize>,
    ) -> Result<SearchResponse, AppError> {
        let content_type = media::check_upload(MediaKind::Audio, content_type, data)?;
        let limit = self.check_limit(limit)?;

        let extractor = self
            .audio_extractor
            .as_ref()
            .ok_or_else(|| AppError::Unavailable("audio search is not configured".to_string()))?;

        let vector = extractor.extract(data, &content_type)?;

        self.search_media(Modality::Audio, &vector, limit)
    }

    /// Media collections hold many records per bird: over-fetch, keep the
    /// first hit of each bird, then cut down to `limit`.
    fn search_media(
        &self,
        modality: Modality,
        vector: &[f32],
        limit: usize,
    ) -> Result<SearchResponse, AppError> {
        let raw_limit = limit.saturating_mul(self.search.overfetch_factor);
        let hits = self
            .store
            .search(self.collections.name(modality), vector, raw_limit)?;

        let snapshot = self.cache.snapshot();
        let mut results = catalog::deduplicate_by_entity(&snapshot, &hits, modality);
        results.truncate(limit);

        log::debug!(
            "search modality={modality} hits={} results={}",
            hits.len(),
            results.len()
        );
        Ok(SearchResponse::new(results, modality))
    }

    /// Everything cached about one bird.
    pub fn bird(&self, bird_id: BirdId) -> Result<BirdDetail, AppError> {
        catalog::bird_detail(&self.cache.snapshot(), bird_id).ok_or(AppError::NotFound(bird_id))
    }

    pub fn all_birds(&self) -> CatalogResponse {
        let results = catalog::catalog(&self.cache.snapshot());
        CatalogResponse {
            total_found: results.len(),
            results,
            search_type: "all_records",
        }
    }

    pub fn refresh(&self) -> RefreshResponse {
        RefreshResponse {
            message: "Cache refreshed",
            counts: self.cache.refresh(),
        }
    }

    pub fn stats(&self) -> StatsResponse {
        let snapshot = self.cache.snapshot();
        let counts = snapshot.counts();

        StatsResponse {
            database_stats: DatabaseStats {
                text: ModalityStats::new(counts.text),
                image: ModalityStats::new(counts.images),
                audio: ModalityStats::new(counts.audio),
            },
            total_collections: Modality::ALL.len(),
            loaded_at: snapshot.loaded_at(),
        }
    }

    /// Live status of the three collections. One failing collection does not
    /// hide the others.
    pub fn collections_status(&self) -> BTreeMap<String, CollectionStatus> {
        Modality::ALL
            .iter()
            .map(|modality| {
                let name = self.collections.name(*modality);
                let status = match self.store.collection_info(name) {
                    Ok(info) => CollectionStatus::Active {
                        points_count: info.points_count,
                        vector_size: info.vector_size,
                    },
                    Err(err) => {
                        log::warn!("collection={name} status=error err={err}");
                        CollectionStatus::Error {
                            error: err.to_string(),
                        }
                    }
                };
                (name.to_string(), status)
            })
            .collect()
    }

    /// Summarises `raw_text_data.searchable_text`. Failures are reported in
    /// the returned text.
    pub fn enhance_description(&self, raw_text_data: &Value) -> String {
        let searchable_text = raw_text_data
            .get("searchable_text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim();

        if searchable_text.is_empty() {
            return "No text data available for enhancement".to_string();
        }

        let Some(enhancer) = &self.enhancer else {
            return "Error enhancing description: description enhancement is not configured"
                .to_string();
        };

        match enhancer.enhance(searchable_text) {
            Ok(description) => description,
            Err(err) => {
                log::warn!("enhance_description outcome=error err={err}");
                format!("Error enhancing description: {err}")
            }
        }
    }
}

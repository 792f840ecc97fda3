//! Cross-module tests, run against in-memory fakes of the store and the
//! extractors.

mod snapshot;

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use crate::app::service::SearchService;
use crate::catalog::{CatalogLoader, Payload, SnapshotCache};
use crate::config::{CollectionsConfig, Config, SearchConfig};
use crate::embeddings::{EmbeddingError, FeatureExtractor, TextEmbedder};
use crate::enhance::DescriptionEnhancer;
use crate::store::{CollectionInfo, Point, ScoredPoint, StoreError, VectorStore};

pub const TEXT: &str = "bird_text_search";
pub const IMAGE: &str = "bird_image_search";
pub const AUDIO: &str = "bird_audio_search";
pub const AUDIO_BASE_URL: &str = "http://localhost:8000/audio";

pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("payload must be an object, got {other}"),
    }
}

pub fn hit(score: f64, value: Value) -> ScoredPoint {
    ScoredPoint {
        id: json!(format!("hit-{score}")),
        score,
        payload: payload(value),
    }
}

/// Vector store that serves fixed exports and canned search hits.
#[derive(Default)]
pub struct FakeStore {
    points: Mutex<HashMap<String, Vec<Point>>>,
    hits: Mutex<HashMap<String, Vec<ScoredPoint>>>,
    failing: Mutex<HashSet<String>>,
    pub scroll_calls: AtomicUsize,
    pub last_search_limit: AtomicUsize,
}

impl FakeStore {
    pub fn with_points(self, collection: &str, payloads: Vec<Value>) -> Self {
        self.set_points(collection, payloads);
        self
    }

    pub fn with_hits(self, collection: &str, hits: Vec<ScoredPoint>) -> Self {
        self.hits
            .lock()
            .unwrap()
            .insert(collection.to_string(), hits);
        self
    }

    pub fn failing(self, collection: &str) -> Self {
        self.set_failing(collection, true);
        self
    }

    pub fn set_points(&self, collection: &str, payloads: Vec<Value>) {
        let points = payloads
            .into_iter()
            .enumerate()
            .map(|(idx, value)| Point {
                id: json!(idx),
                payload: payload(value),
            })
            .collect();
        self.points
            .lock()
            .unwrap()
            .insert(collection.to_string(), points);
    }

    pub fn set_failing(&self, collection: &str, failing: bool) {
        let mut set = self.failing.lock().unwrap();
        if failing {
            set.insert(collection.to_string());
        } else {
            set.remove(collection);
        }
    }

    fn check(&self, collection: &str) -> Result<(), StoreError> {
        if self.failing.lock().unwrap().contains(collection) {
            return Err(StoreError::Status {
                status: 503,
                body: format!("{collection} unavailable"),
            });
        }
        Ok(())
    }
}

impl VectorStore for FakeStore {
    fn scroll(&self, collection: &str, _page_size: usize) -> Result<Vec<Point>, StoreError> {
        self.scroll_calls.fetch_add(1, Ordering::SeqCst);
        self.check(collection)?;
        Ok(self
            .points
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    fn search(
        &self,
        collection: &str,
        _vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        self.last_search_limit.store(limit, Ordering::SeqCst);
        self.check(collection)?;
        let mut hits = self
            .hits
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default();
        hits.truncate(limit);
        Ok(hits)
    }

    fn collection_info(&self, collection: &str) -> Result<CollectionInfo, StoreError> {
        self.check(collection)?;
        let points_count = self
            .points
            .lock()
            .unwrap()
            .get(collection)
            .map(|points| points.len() as u64)
            .unwrap_or_default();

        Ok(CollectionInfo {
            status: Some("green".to_string()),
            points_count: Some(points_count),
            vector_size: Some(4),
        })
    }
}

pub struct FakeEmbedder;

impl TextEmbedder for FakeEmbedder {
    fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.contains("explode") {
            return Err(EmbeddingError::EmbeddingFailed("boom".to_string()));
        }
        Ok(vec![0.1, 0.2, 0.3, 0.4])
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Remembers the content type and size of the last extracted upload.
#[derive(Default)]
pub struct FakeExtractor {
    pub last_upload: Mutex<Option<(String, usize)>>,
}

impl FeatureExtractor for FakeExtractor {
    fn extract(&self, data: &[u8], content_type: &str) -> Result<Vec<f32>, EmbeddingError> {
        *self.last_upload.lock().unwrap() = Some((content_type.to_string(), data.len()));
        Ok(vec![1.0, 0.0, 0.0, 0.0])
    }
}

pub struct FakeEnhancer;

impl DescriptionEnhancer for FakeEnhancer {
    fn enhance(&self, searchable_text: &str) -> Result<String, EmbeddingError> {
        if searchable_text.contains("rate limited") {
            return Err(EmbeddingError::Status {
                status: 429,
                body: "slow down".to_string(),
            });
        }
        Ok(format!("Summary: {searchable_text}"))
    }
}

/// Three species with text; two photos of the robin; one clip of the wren.
pub fn bird_store() -> FakeStore {
    FakeStore::default()
        .with_points(
            TEXT,
            vec![
                json!({
                    "bird_id": 1,
                    "species_name": "European Robin",
                    "scientific_name": "Erithacus rubecula",
                    "family": "Muscicapidae",
                    "searchable_text": "small bird with an orange-red breast",
                    "size": "12.5-14 cm",
                    "habitats": ["woodland", "gardens"],
                }),
                json!({
                    "bird_id": 2,
                    "species_name": "Eurasian Wren",
                    "scientific_name": "Troglodytes troglodytes",
                    "family": "Troglodytidae",
                    "searchable_text": "tiny brown bird with a loud song",
                }),
                json!({
                    "bird_id": 3,
                    "species_name": "Common Blackbird",
                    "scientific_name": "Turdus merula",
                    "family": "Turdidae",
                    "searchable_text": "black thrush with a yellow bill",
                }),
            ],
        )
        .with_points(
            IMAGE,
            vec![
                json!({"bird_id": 1, "species_name": "European Robin", "image_path": "robin_a.jpg", "quality_score": 0.4}),
                json!({"bird_id": 1, "species_name": "European Robin", "image_path": "robin_b.jpg", "quality_score": 0.9}),
            ],
        )
        .with_points(
            AUDIO,
            vec![json!({"bird_id": 2, "clip_path": r"C:\clips\wren_01.wav", "duration": 10.0})],
        )
}

pub fn loader(store: Arc<FakeStore>) -> CatalogLoader {
    CatalogLoader::new(store, CollectionsConfig::default(), 2, AUDIO_BASE_URL)
}

/// Service over `store` with every extractor attached and the snapshot loaded.
pub fn create_service(store: Arc<FakeStore>) -> (SearchService, Arc<FakeExtractor>, Arc<FakeExtractor>) {
    let cache = Arc::new(SnapshotCache::load(loader(store.clone())));
    let image = Arc::new(FakeExtractor::default());
    let audio = Arc::new(FakeExtractor::default());

    let service = SearchService::new(
        store,
        cache,
        CollectionsConfig::default(),
        SearchConfig::default(),
    )
    .with_text_embedder(Arc::new(FakeEmbedder))
    .with_image_extractor(image.clone())
    .with_audio_extractor(audio.clone())
    .with_enhancer(Arc::new(FakeEnhancer));

    (service, image, audio)
}

pub fn test_config(audio_dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.media.audio_dir = audio_dir.to_string_lossy().to_string();
    config
}

pub fn create_test_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 80, 40]));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

pub fn create_test_wav() -> Vec<u8> {
    let mut wav = Vec::new();
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&36u32.to_le_bytes());
    wav.extend_from_slice(b"WAVEfmt ");
    wav.extend_from_slice(&[0u8; 24]);
    wav
}

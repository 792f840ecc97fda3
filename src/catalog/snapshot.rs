//! In-memory read replica of the three catalog collections.
//!
//! A [`Snapshot`] is immutable once built. [`SnapshotCache`] owns the current
//! one behind a single `Arc` swap point: readers clone the `Arc` and keep a
//! consistent view for as long as they hold it, `refresh` builds a complete
//! replacement before swapping it in.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::{bird_id_of, AudioRecord, BirdId, ImageRecord, Modality, Payload, TextRecord};
use crate::config::CollectionsConfig;
use crate::store::{Point, VectorStore};

/// Number of distinct birds cached per modality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotCounts {
    pub text: usize,
    pub images: usize,
    pub audio: usize,
}

#[derive(Debug, Default)]
pub struct Snapshot {
    text: HashMap<BirdId, TextRecord>,
    images: HashMap<BirdId, Vec<ImageRecord>>,
    audio: HashMap<BirdId, Vec<AudioRecord>>,
    loaded_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn new(
        text: HashMap<BirdId, TextRecord>,
        images: HashMap<BirdId, Vec<ImageRecord>>,
        audio: HashMap<BirdId, Vec<AudioRecord>>,
    ) -> Self {
        Self {
            text,
            images,
            audio,
            loaded_at: Some(Utc::now()),
        }
    }

    pub fn text(&self, id: BirdId) -> Option<&TextRecord> {
        self.text.get(&id)
    }

    pub fn images(&self, id: BirdId) -> &[ImageRecord] {
        self.images.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn audio(&self, id: BirdId) -> &[AudioRecord] {
        self.audio.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    /// True if any of the three mappings knows the bird.
    pub fn contains(&self, id: BirdId) -> bool {
        self.text.contains_key(&id) || self.images.contains_key(&id) || self.audio.contains_key(&id)
    }

    /// Text records ordered by bird id.
    pub fn text_records(&self) -> Vec<&TextRecord> {
        let mut records: Vec<_> = self.text.values().collect();
        records.sort_by_key(|record| record.bird_id);
        records
    }

    pub fn counts(&self) -> SnapshotCounts {
        SnapshotCounts {
            text: self.text.len(),
            images: self.images.len(),
            audio: self.audio.len(),
        }
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }
}

// load time is ignored: two loads of unchanged data compare equal
impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text && self.images == other.images && self.audio == other.audio
    }
}

/// Builds snapshot mappings from full collection exports.
pub struct CatalogLoader {
    store: Arc<dyn VectorStore>,
    collections: CollectionsConfig,
    page_size: usize,
    audio_base_url: String,
}

impl CatalogLoader {
    pub fn new(
        store: Arc<dyn VectorStore>,
        collections: CollectionsConfig,
        page_size: usize,
        audio_base_url: &str,
    ) -> Self {
        Self {
            store,
            collections,
            page_size: page_size.max(1),
            audio_base_url: audio_base_url.to_string(),
        }
    }

    /// bird id -> text record. Empty when the store is unreachable.
    pub fn load_text(&self) -> HashMap<BirdId, TextRecord> {
        let mut text = HashMap::new();
        for (id, payload) in self.export(Modality::Text) {
            match TextRecord::from_payload(id, payload) {
                Ok(record) => {
                    text.insert(id, record);
                }
                Err(err) => log::warn!("skipping text record bird_id={id}: {err}"),
            }
        }
        text
    }

    /// bird id -> images in scroll order. Empty when the store is unreachable.
    pub fn load_images(&self) -> HashMap<BirdId, Vec<ImageRecord>> {
        let mut images: HashMap<BirdId, Vec<ImageRecord>> = HashMap::new();
        for (id, payload) in self.export(Modality::Image) {
            match ImageRecord::from_payload(id, payload) {
                Ok(record) => images.entry(id).or_default().push(record),
                Err(err) => log::warn!("skipping image record bird_id={id}: {err}"),
            }
        }
        images
    }

    /// bird id -> audio clips in scroll order, with playback URLs.
    pub fn load_audio(&self) -> HashMap<BirdId, Vec<AudioRecord>> {
        let mut audio: HashMap<BirdId, Vec<AudioRecord>> = HashMap::new();
        for (id, payload) in self.export(Modality::Audio) {
            match AudioRecord::from_payload(id, payload, &self.audio_base_url) {
                Ok(record) => audio.entry(id).or_default().push(record),
                Err(err) => log::warn!("skipping audio record bird_id={id}: {err}"),
            }
        }
        audio
    }

    pub fn load(&self) -> Snapshot {
        Snapshot::new(self.load_text(), self.load_images(), self.load_audio())
    }

    /// Scrolls one collection and pairs every payload with its bird id.
    /// Store failures and id-less points are logged and dropped.
    fn export(&self, modality: Modality) -> Vec<(BirdId, Payload)> {
        let collection = self.collections.name(modality);

        let points = match self.store.scroll(collection, self.page_size) {
            Ok(points) => points,
            Err(err) => {
                log::error!("collection={collection} outcome=error err={err}");
                return Vec::new();
            }
        };

        let total = points.len();
        let records: Vec<_> = points
            .into_iter()
            .filter_map(|Point { id, payload }| match bird_id_of(&payload) {
                Some(bird_id) => Some((bird_id, payload)),
                None => {
                    log::warn!("collection={collection} point={id} has no bird_id");
                    None
                }
            })
            .collect();

        log::info!(
            "collection={collection} outcome=success points={total} records={}",
            records.len()
        );
        records
    }
}

/// Owns the current [`Snapshot`] and replaces it wholesale on refresh.
pub struct SnapshotCache {
    loader: CatalogLoader,
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotCache {
    /// Creates a cache holding an empty snapshot. Nothing is fetched.
    pub fn new(loader: CatalogLoader) -> Self {
        Self {
            loader,
            current: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    /// Creates a cache and performs the initial load.
    pub fn load(loader: CatalogLoader) -> Self {
        let cache = Self::new(loader);
        cache.refresh();
        cache
    }

    /// The current snapshot. Never blocks on I/O.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Reloads all three collections and swaps them in together.
    pub fn refresh(&self) -> SnapshotCounts {
        let next = Arc::new(self.loader.load());
        let counts = next.counts();

        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = next;

        log::info!(
            "snapshot refreshed text={} images={} audio={}",
            counts.text,
            counts.images,
            counts.audio
        );
        counts
    }

    pub fn text(&self, id: BirdId) -> Option<TextRecord> {
        self.snapshot().text(id).cloned()
    }

    pub fn images(&self, id: BirdId) -> Vec<ImageRecord> {
        self.snapshot().images(id).to_vec()
    }

    pub fn audio(&self, id: BirdId) -> Vec<AudioRecord> {
        self.snapshot().audio(id).to_vec()
    }
}

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::json;

use super::{bird_store, loader, FakeStore, AUDIO, IMAGE, TEXT};
use crate::catalog::{SnapshotCache, SnapshotCounts};

#[test]
fn test_load_groups_media_by_bird() {
    let snapshot = loader(Arc::new(bird_store())).load();

    assert_eq!(
        snapshot.counts(),
        SnapshotCounts {
            text: 3,
            images: 1,
            audio: 1
        }
    );
    assert_eq!(snapshot.images(1).len(), 2);
    assert!(snapshot.images(2).is_empty());
    assert!(snapshot.loaded_at().is_some());
}

#[test]
fn test_audio_url_from_windows_path() {
    let snapshot = loader(Arc::new(bird_store())).load();

    let clip = &snapshot.audio(2)[0];
    assert_eq!(clip.clip_path, r"C:\clips\wren_01.wav");
    assert_eq!(
        clip.audio_url.as_deref(),
        Some("http://localhost:8000/audio/wren_01.wav")
    );
}

#[test]
fn test_store_failure_leaves_modality_empty() {
    let store = bird_store().failing(IMAGE);
    let snapshot = loader(Arc::new(store)).load();

    let counts = snapshot.counts();
    assert_eq!(counts.images, 0);
    assert_eq!(counts.text, 3);
    assert_eq!(counts.audio, 1);
}

#[test]
fn test_unreachable_store_gives_empty_cache() {
    let store = FakeStore::default()
        .failing(TEXT)
        .failing(IMAGE)
        .failing(AUDIO);
    let cache = SnapshotCache::load(loader(Arc::new(store)));

    assert_eq!(cache.snapshot().counts(), SnapshotCounts::default());
    assert!(cache.text(1).is_none());
    assert!(cache.images(1).is_empty());
    assert!(cache.audio(2).is_empty());
}

#[test]
fn test_records_without_bird_id_are_skipped() {
    let store = FakeStore::default().with_points(
        TEXT,
        vec![
            json!({"bird_id": 1, "species_name": "European Robin"}),
            json!({"species_name": "Nameless"}),
            json!({"bird_id": null, "species_name": "Null id"}),
            json!({"bird_id": "7", "species_name": "Stringly Typed"}),
        ],
    );
    let snapshot = loader(Arc::new(store)).load();

    assert_eq!(snapshot.counts().text, 2);
    assert_eq!(
        snapshot.text(7).and_then(|t| t.species_name.as_deref()),
        Some("Stringly Typed")
    );
}

#[test]
fn test_duplicate_text_record_last_wins() {
    let store = FakeStore::default().with_points(
        TEXT,
        vec![
            json!({"bird_id": 1, "species_name": "Robin"}),
            json!({"bird_id": 1, "species_name": "European Robin"}),
        ],
    );
    let snapshot = loader(Arc::new(store)).load();

    assert_eq!(snapshot.counts().text, 1);
    assert_eq!(
        snapshot.text(1).and_then(|t| t.species()),
        Some("European Robin")
    );
}

#[test]
fn test_refresh_is_idempotent() {
    let store = Arc::new(bird_store());
    let cache = SnapshotCache::load(loader(store.clone()));

    let first = cache.snapshot();
    let counts = cache.refresh();
    let second = cache.snapshot();

    assert_eq!(counts, first.counts());
    assert_eq!(*first, *second);
    assert!(!Arc::ptr_eq(&first, &second));
    // one scroll per collection, per load
    assert_eq!(store.scroll_calls.load(Ordering::SeqCst), 6);
}

#[test]
fn test_held_snapshot_survives_refresh() {
    let store = Arc::new(bird_store());
    let cache = SnapshotCache::load(loader(store.clone()));

    let before = cache.snapshot();
    store.set_points(TEXT, vec![json!({"bird_id": 9, "species_name": "Hoopoe"})]);
    store.set_failing(IMAGE, true);
    cache.refresh();

    // the old view is untouched
    assert_eq!(before.counts().text, 3);
    assert_eq!(before.images(1).len(), 2);

    let after = cache.snapshot();
    assert_eq!(after.counts().text, 1);
    assert!(after.text(9).is_some());
    assert!(after.images(1).is_empty());
}

#[test]
fn test_new_cache_starts_empty() {
    let store = Arc::new(bird_store());
    let cache = SnapshotCache::new(loader(store.clone()));

    assert_eq!(cache.snapshot().counts(), SnapshotCounts::default());
    assert!(cache.snapshot().loaded_at().is_none());
    assert_eq!(store.scroll_calls.load(Ordering::SeqCst), 0);
}

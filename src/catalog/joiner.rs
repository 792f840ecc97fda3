//! Turns raw similarity hits into self-contained result records.

use std::collections::HashSet;

use serde_json::Value;

use super::snapshot::Snapshot;
use super::types::{
    bird_id_of, payload_str, BirdDetail, BirdId, CatalogEntry, ComprehensiveResult, MediaCounts,
    Modality, TextRecord, UNKNOWN_SPECIES,
};
use crate::store::ScoredPoint;

/// Joins one hit with the cached records of its bird.
///
/// Returns `None` only when the hit carries no usable `bird_id`. A bird the
/// snapshot does not know still yields a result filled with defaults.
pub fn join(snapshot: &Snapshot, hit: &ScoredPoint, modality: Modality) -> Option<ComprehensiveResult> {
    let bird_id = bird_id_of(&hit.payload)?;

    let text = snapshot.text(bird_id);
    let images = snapshot.images(bird_id).to_vec();
    let audio_clips = snapshot.audio(bird_id).to_vec();

    let identity = |key: &str, cached: Option<&str>| {
        payload_str(&hit.payload, key)
            .or(cached.filter(|s| !s.is_empty()))
            .map(str::to_string)
    };

    Some(ComprehensiveResult {
        bird_id,
        species_name: identity("species_name", text.and_then(TextRecord::species))
            .unwrap_or_else(|| UNKNOWN_SPECIES.to_string()),
        scientific_name: identity("scientific_name", text.map(|t| t.scientific_name.as_str()))
            .unwrap_or_default(),
        family: identity("family", text.map(|t| t.family.as_str())).unwrap_or_default(),
        confidence_score: hit.score,
        search_match_type: modality,

        text_description: text.map(|t| t.searchable_text.clone()).unwrap_or_default(),
        raw_text_data: raw_text(text),

        habitats: descriptive(text, "habitats"),
        geographic_regions: descriptive(text, "geographic_regions"),
        size: text.map(|t| t.size.clone()).unwrap_or_default(),
        ecology: descriptive(text, "ecology"),
        group_dynamics: descriptive(text, "group_dynamics"),
        extract: descriptive(text, "extract"),
        url: text.map(TextRecord::wikipedia_url).unwrap_or_default(),

        primary_image: images.first().cloned(),
        images,
        primary_audio: audio_clips.first().cloned(),
        audio_clips,
    })
}

/// Joins every hit, dropping the ones without a bird id.
pub fn join_all(snapshot: &Snapshot, hits: &[ScoredPoint], modality: Modality) -> Vec<ComprehensiveResult> {
    hits.iter()
        .filter_map(|hit| join(snapshot, hit, modality))
        .collect()
}

/// Keeps the first hit of every bird, in the order the store ranked them.
///
/// Later hits for an already-seen bird are discarded even if they point at a
/// different image or clip.
pub fn deduplicate_by_entity(
    snapshot: &Snapshot,
    hits: &[ScoredPoint],
    modality: Modality,
) -> Vec<ComprehensiveResult> {
    let mut seen = HashSet::new();

    hits.iter()
        .filter(|hit| match bird_id_of(&hit.payload) {
            Some(bird_id) => seen.insert(bird_id),
            None => false,
        })
        .filter_map(|hit| join(snapshot, hit, modality))
        .collect()
}

/// Full record of one bird, or `None` if no collection knows it.
pub fn bird_detail(snapshot: &Snapshot, bird_id: BirdId) -> Option<BirdDetail> {
    if !snapshot.contains(bird_id) {
        return None;
    }

    let text = snapshot.text(bird_id);
    let images = snapshot.images(bird_id).to_vec();
    let audio_clips = snapshot.audio(bird_id).to_vec();

    Some(BirdDetail {
        bird_id,
        species_name: species_or_unknown(text),
        scientific_name: text.map(|t| t.scientific_name.clone()).unwrap_or_default(),
        family: text.map(|t| t.family.clone()).unwrap_or_default(),
        text_information: raw_text(text),
        raw_text_data: raw_text(text),
        counts: MediaCounts {
            images: images.len(),
            audio_clips: audio_clips.len(),
        },
        images,
        audio_clips,
    })
}

/// One entry per cached text record, ordered by bird id.
pub fn catalog(snapshot: &Snapshot) -> Vec<CatalogEntry> {
    snapshot
        .text_records()
        .into_iter()
        .map(|text| {
            let images = snapshot.images(text.bird_id).to_vec();
            let audio_clips = snapshot.audio(text.bird_id).to_vec();

            CatalogEntry {
                bird_id: text.bird_id,
                species_name: species_or_unknown(Some(text)),
                scientific_name: text.scientific_name.clone(),
                family: text.family.clone(),
                text_description: text.searchable_text.clone(),
                raw_text_data: raw_text(Some(text)),
                size: text.size.clone(),
                url: text.wikipedia_url(),
                primary_image: images.first().cloned(),
                images,
                primary_audio: audio_clips.first().cloned(),
                audio_clips,
            }
        })
        .collect()
}

/// Empty and missing names both read as "Unknown".
fn species_or_unknown(text: Option<&TextRecord>) -> String {
    text.and_then(TextRecord::species)
        .unwrap_or(UNKNOWN_SPECIES)
        .to_string()
}

fn raw_text(text: Option<&TextRecord>) -> Value {
    text.and_then(|t| serde_json::to_value(t).ok())
        .unwrap_or_else(|| Value::Object(Default::default()))
}

fn descriptive(text: Option<&TextRecord>, key: &str) -> String {
    text.map(|t| t.descriptive(key)).unwrap_or_default()
}

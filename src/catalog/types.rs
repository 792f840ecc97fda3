use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Integer primary key shared by the text, image and audio collections.
pub type BirdId = u64;

/// Raw payload stored next to a vector.
pub type Payload = Map<String, Value>;

pub const UNKNOWN_SPECIES: &str = "Unknown";

const BIRD_ID_FIELD: &str = "bird_id";
const WIKIPEDIA_BASE: &str = "https://en.wikipedia.org/wiki/";

/// Which collection produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Audio,
}

impl Modality {
    pub const ALL: [Modality; 3] = [Modality::Text, Modality::Image, Modality::Audio];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Image => "image",
            Modality::Audio => "audio",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reads `bird_id` out of a payload.
///
/// Accepts integers, integral floats (pandas exports) and integer strings.
pub fn bird_id_of(payload: &Payload) -> Option<BirdId> {
    match payload.get(BIRD_ID_FIELD)? {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Returns a payload string field, ignoring empty values.
pub fn payload_str<'a>(payload: &'a Payload, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Textual description of one species. One per bird.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextRecord {
    #[serde(skip_deserializing)]
    pub bird_id: BirdId,

    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub species_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub scientific_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub family: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub searchable_text: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub size: String,

    /// Every other payload field, kept verbatim.
    #[serde(flatten)]
    pub extra: Payload,
}

impl TextRecord {
    pub fn from_payload(bird_id: BirdId, payload: Payload) -> Result<Self, serde_json::Error> {
        let mut record: Self = serde_json::from_value(Value::Object(strip_id(payload)))?;
        record.bird_id = bird_id;
        Ok(record)
    }

    /// Species name if the record carries a non-empty one.
    pub fn species(&self) -> Option<&str> {
        self.species_name.as_deref().filter(|s| !s.is_empty())
    }

    /// Descriptive field from the extra payload. Arrays are joined with ", ".
    pub fn descriptive(&self, key: &str) -> String {
        match self.extra.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect::<Vec<_>>()
                .join(", "),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    pub fn wikipedia_url(&self) -> String {
        match self.species() {
            Some(name) => format!("{WIKIPEDIA_BASE}{}", name.replace(' ', "_")),
            None => String::new(),
        }
    }
}

/// One stored photo of a species.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(skip_deserializing)]
    pub bird_id: BirdId,

    #[serde(default, deserialize_with = "lenient_string")]
    pub species_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub image_path: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub source_url: String,
    #[serde(default, deserialize_with = "lenient_u64", skip_serializing_if = "Option::is_none")]
    pub width: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64", skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,

    #[serde(flatten)]
    pub extra: Payload,
}

impl ImageRecord {
    pub fn from_payload(bird_id: BirdId, payload: Payload) -> Result<Self, serde_json::Error> {
        let mut record: Self = serde_json::from_value(Value::Object(strip_id(payload)))?;
        record.bird_id = bird_id;
        Ok(record)
    }
}

/// One stored recording of a species.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioRecord {
    #[serde(skip_deserializing)]
    pub bird_id: BirdId,

    #[serde(default, deserialize_with = "lenient_string")]
    pub clip_path: String,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    /// Public playback URL derived from `clip_path`.
    #[serde(default, deserialize_with = "lenient_opt_string", skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,

    #[serde(flatten)]
    pub extra: Payload,
}

impl AudioRecord {
    /// Decodes an audio payload and derives its playback URL.
    pub fn from_payload(
        bird_id: BirdId,
        payload: Payload,
        audio_base_url: &str,
    ) -> Result<Self, serde_json::Error> {
        let mut record: Self = serde_json::from_value(Value::Object(strip_id(payload)))?;
        record.bird_id = bird_id;
        if let Some(url) = crate::media::audio_url(audio_base_url, &record.clip_path) {
            record.audio_url = Some(url);
        }
        Ok(record)
    }
}

/// A search hit joined with everything cached for its bird.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComprehensiveResult {
    pub bird_id: BirdId,
    pub species_name: String,
    pub scientific_name: String,
    pub family: String,
    pub confidence_score: f64,
    pub search_match_type: Modality,

    pub text_description: String,
    pub raw_text_data: Value,

    pub habitats: String,
    pub geographic_regions: String,
    pub size: String,
    pub ecology: String,
    pub group_dynamics: String,
    pub extract: String,
    pub url: String,

    pub images: Vec<ImageRecord>,
    pub primary_image: Option<ImageRecord>,
    pub audio_clips: Vec<AudioRecord>,
    pub primary_audio: Option<AudioRecord>,
}

/// Everything known about one bird, for the detail endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BirdDetail {
    pub bird_id: BirdId,
    pub species_name: String,
    pub scientific_name: String,
    pub family: String,
    pub text_information: Value,
    /// Same record as `text_information`, under the key `/enhance-description` expects.
    pub raw_text_data: Value,
    pub images: Vec<ImageRecord>,
    pub audio_clips: Vec<AudioRecord>,
    pub counts: MediaCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MediaCounts {
    pub images: usize,
    pub audio_clips: usize,
}

/// One row of the full catalog listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub bird_id: BirdId,
    pub species_name: String,
    pub scientific_name: String,
    pub family: String,
    pub text_description: String,
    pub raw_text_data: Value,
    pub size: String,
    pub url: String,
    pub images: Vec<ImageRecord>,
    pub primary_image: Option<ImageRecord>,
    pub audio_clips: Vec<AudioRecord>,
    pub primary_audio: Option<AudioRecord>,
}

fn strip_id(mut payload: Payload) -> Payload {
    payload.remove(BIRD_ID_FIELD);
    payload
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_opt_string(deserializer)?.unwrap_or_default())
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    })
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_f64(deserializer)?
        .filter(|f| *f >= 0.0)
        .map(|f| f.round() as u64))
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

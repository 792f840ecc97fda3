use crate::catalog::Modality;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
/// Uploaded images and clips are small; 25MB is plenty
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

const DEFAULT_STORE_ENDPOINT: &str = "http://localhost:6333";
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;
/// Points requested per scroll call while loading the snapshot
const DEFAULT_PAGE_SIZE: usize = 256;

const DEFAULT_TEXT_COLLECTION: &str = "bird_text_search";
const DEFAULT_IMAGE_COLLECTION: &str = "bird_image_search";
const DEFAULT_AUDIO_COLLECTION: &str = "bird_audio_search";

const DEFAULT_AUDIO_DIR: &str = "clips_10sec";
const DEFAULT_AUDIO_BASE_URL: &str = "http://localhost:8000/audio";

const DEFAULT_LIMIT: usize = 12;
const DEFAULT_MAX_LIMIT: usize = 100;
/// Image/audio searches fetch this many raw hits per requested result
const DEFAULT_OVERFETCH_FACTOR: usize = 5;

const DEFAULT_TEXT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_EMBEDDING_TIMEOUT_SECS: u64 = 60;

const DEFAULT_ENHANCE_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_ENHANCE_MAX_TOKENS: u32 = 2000;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins, "*" allows any
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Vector database connection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_endpoint")]
    pub endpoint: String,
    /// Prefer the QDRANT_API_KEY environment variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_store_endpoint(),
            api_key: None,
            timeout_secs: default_store_timeout_secs(),
            page_size: default_page_size(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionsConfig {
    #[serde(default = "default_text_collection")]
    pub text: String,
    #[serde(default = "default_image_collection")]
    pub image: String,
    #[serde(default = "default_audio_collection")]
    pub audio: String,
}

impl CollectionsConfig {
    pub fn name(&self, modality: Modality) -> &str {
        match modality {
            Modality::Text => &self.text,
            Modality::Image => &self.image,
            Modality::Audio => &self.audio,
        }
    }
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            text: default_text_collection(),
            image: default_image_collection(),
            audio: default_audio_collection(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Directory served under /audio
    #[serde(default = "default_audio_dir")]
    pub audio_dir: String,
    /// Prefix of the playback URL attached to every audio clip
    #[serde(default = "default_audio_base_url")]
    pub audio_base_url: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            audio_dir: default_audio_dir(),
            audio_base_url: default_audio_base_url(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            overfetch_factor: default_overfetch_factor(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEmbeddingProvider {
    /// OpenAI-compatible /embeddings endpoint
    #[default]
    OpenAi,
    /// fastembed model running in-process
    Local,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextEmbeddingConfig {
    #[serde(default)]
    pub provider: TextEmbeddingProvider,
    /// Must match the model the text collection was embedded with
    #[serde(default = "default_text_model")]
    pub model: String,
    #[serde(default = "default_openai_api_base")]
    pub api_base: String,
}

impl Default for TextEmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: TextEmbeddingProvider::default(),
            model: default_text_model(),
            api_base: default_openai_api_base(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default)]
    pub text: TextEmbeddingConfig,
    /// Feature extraction service for uploaded images. Image search is off when unset.
    #[serde(default)]
    pub image_extractor_url: Option<String>,
    /// Feature extraction service for uploaded clips. Audio search is off when unset.
    #[serde(default)]
    pub audio_extractor_url: Option<String>,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            text: TextEmbeddingConfig::default(),
            image_extractor_url: None,
            audio_extractor_url: None,
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

/// LLM summaries for /enhance-description
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnhanceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_enhance_model")]
    pub model: String,
    #[serde(default = "default_enhance_max_tokens")]
    pub max_tokens: u32,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: default_enhance_model(),
            max_tokens: default_enhance_max_tokens(),
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_store_endpoint() -> String {
    DEFAULT_STORE_ENDPOINT.to_string()
}

fn default_store_timeout_secs() -> u64 {
    DEFAULT_STORE_TIMEOUT_SECS
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_text_collection() -> String {
    DEFAULT_TEXT_COLLECTION.to_string()
}

fn default_image_collection() -> String {
    DEFAULT_IMAGE_COLLECTION.to_string()
}

fn default_audio_collection() -> String {
    DEFAULT_AUDIO_COLLECTION.to_string()
}

fn default_audio_dir() -> String {
    DEFAULT_AUDIO_DIR.to_string()
}

fn default_audio_base_url() -> String {
    DEFAULT_AUDIO_BASE_URL.to_string()
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_max_limit() -> usize {
    DEFAULT_MAX_LIMIT
}

fn default_overfetch_factor() -> usize {
    DEFAULT_OVERFETCH_FACTOR
}

fn default_text_model() -> String {
    DEFAULT_TEXT_MODEL.to_string()
}

fn default_openai_api_base() -> String {
    DEFAULT_OPENAI_API_BASE.to_string()
}

fn default_embedding_timeout_secs() -> u64 {
    DEFAULT_EMBEDDING_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

fn default_enhance_model() -> String {
    DEFAULT_ENHANCE_MODEL.to_string()
}

fn default_enhance_max_tokens() -> u32 {
    DEFAULT_ENHANCE_MAX_TOKENS
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub collections: CollectionsConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub enhance: EnhanceConfig,

    /// Only ever read from OPENAI_API_KEY
    #[serde(skip_serializing, skip_deserializing)]
    pub openai_api_key: Option<String>,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.store.page_size == 0 {
            bail!("store.page_size must be greater than 0");
        }

        if self.store.timeout_secs == 0 {
            bail!("store.timeout_secs must be greater than 0");
        }

        if self.embeddings.timeout_secs == 0 {
            bail!("embeddings.timeout_secs must be greater than 0");
        }

        let search = &self.search;
        if search.max_limit == 0 {
            bail!("search.max_limit must be greater than 0");
        }
        if !(1..=search.max_limit).contains(&search.default_limit) {
            bail!(
                "search.default_limit must be between 1 and {}, got {}",
                search.max_limit,
                search.default_limit
            );
        }
        if search.overfetch_factor == 0 {
            bail!("search.overfetch_factor must be greater than 0");
        }

        for modality in Modality::ALL {
            if self.collections.name(modality).trim().is_empty() {
                bail!("collections.{modality} must not be empty");
            }
        }

        check_url("store.endpoint", &self.store.endpoint)?;
        check_url("media.audio_base_url", &self.media.audio_base_url)?;
        check_url("embeddings.text.api_base", &self.embeddings.text.api_base)?;
        if let Some(url) = &self.embeddings.image_extractor_url {
            check_url("embeddings.image_extractor_url", url)?;
        }
        if let Some(url) = &self.embeddings.audio_extractor_url {
            check_url("embeddings.audio_extractor_url", url)?;
        }

        if self.server.cors_origins.is_empty() {
            bail!("server.cors_origins must list at least one origin (use \"*\" for any)");
        }

        Ok(())
    }

    /// Loads `config.yaml` from `base_path`, creating it with defaults if missing.
    ///
    /// Environment overrides are applied after the file is (re)saved so secrets
    /// never end up on disk.
    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(base_path)
            .with_context(|| format!("failed to create {}", base_path.display()))?;

        let path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !path.exists() {
            let defaults = serde_yml::to_string(&Self::default())?;
            std::fs::write(&path, defaults)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }

        let config_str = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str)
            .with_context(|| format!("{} is malformed", path.display()))?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Overrides endpoint and secrets from the environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(endpoint) = lookup("QDRANT_ENDPOINT") {
            self.store.endpoint = endpoint;
        }
        if let Some(api_key) = lookup("QDRANT_API_KEY") {
            self.store.api_key = Some(api_key);
        }
        if let Some(api_key) = lookup("OPENAI_API_KEY") {
            self.openai_api_key = Some(api_key);
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = self.base_path.join(CONFIG_FILE);
        let config_str = serde_yml::to_string(&self)?;
        std::fs::write(&path, config_str)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

fn check_url(field: &str, value: &str) -> anyhow::Result<()> {
    let url = url::Url::parse(value).with_context(|| format!("{field} is not a valid url: {value:?}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("{field} must be an http(s) url, got {value:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_load_creates_default_config() {
        let tmp = tempfile::tempdir().unwrap();

        let config = Config::load_with(tmp.path()).unwrap();

        assert!(tmp.path().join(CONFIG_FILE).exists());
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.collections.name(Modality::Image), "bird_image_search");
        assert_eq!(config.search.overfetch_factor, 5);
        assert_eq!(config.embeddings.text.provider, TextEmbeddingProvider::OpenAi);
    }

    #[test]
    fn test_partial_config_is_filled_and_resaved() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "store:\n  page_size: 50\nsearch:\n  default_limit: 3\n",
        )
        .unwrap();

        let config = Config::load_with(tmp.path()).unwrap();
        assert_eq!(config.store.page_size, 50);
        assert_eq!(config.search.default_limit, 3);
        assert_eq!(config.search.max_limit, 100);

        let saved = std::fs::read_to_string(tmp.path().join(CONFIG_FILE)).unwrap();
        assert!(saved.contains("overfetch_factor"));
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "store: [not, a, map]\n").unwrap();

        assert!(Config::load_with(tmp.path()).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.store.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.search.default_limit = 500;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.store.endpoint = "localhost:6333".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.embeddings.image_extractor_url = Some("not a url".to_string());
        assert!(config.validate().is_err());

        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("QDRANT_ENDPOINT", "https://qdrant.example.com:6333"),
            ("QDRANT_API_KEY", " secret "),
            ("OPENAI_API_KEY", ""),
        ]);

        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.store.endpoint, "https://qdrant.example.com:6333");
        assert_eq!(config.store.api_key.as_deref(), Some("secret"));
        assert_eq!(config.openai_api_key, None);
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let mut config = Config::default();
        config.openai_api_key = Some("sk-test".to_string());

        let yaml = serde_yml::to_string(&config).unwrap();
        assert!(!yaml.contains("sk-test"));
    }
}

use crate::{
    app::service::SearchService,
    catalog::{CatalogLoader, SnapshotCache},
    config::{Config, TextEmbeddingProvider},
    embeddings::{OpenAiClient, OpenAiEmbedder, RemoteExtractor, TextEmbedder},
    enhance::OpenAiEnhancer,
    store::{QdrantStore, VectorStore},
};
use anyhow::{Context, Result};
use homedir::my_home;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Application factory for creating and configuring application components
pub struct AppFactory;

impl AppFactory {
    /// Load `config.yaml` from the base path, creating the directory if needed
    pub fn create_config() -> Result<Config> {
        let base_path = Self::get_base_path()?;
        Config::load_with(&base_path)
    }

    /// Get the base path for the application
    ///
    /// `BIRDSEARCH_BASE_PATH` wins over `~/.local/share/birdsearch`.
    pub fn get_base_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var("BIRDSEARCH_BASE_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
        {
            return Ok(PathBuf::from(path));
        }

        let home = my_home()
            .context("Could not determine home directory")?
            .context("Home directory path is empty")?;

        Ok(home.join(".local/share/birdsearch"))
    }

    pub fn create_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
        log::info!("Using vector store: {}", config.store.endpoint);
        let store = QdrantStore::new(
            &config.store.endpoint,
            config.store.api_key.clone(),
            Duration::from_secs(config.store.timeout_secs),
        )?;

        Ok(Arc::new(store))
    }

    /// Build the search service and load the first snapshot.
    ///
    /// The load never fails: an unreachable store leaves the cache empty
    /// until the next refresh.
    pub fn create_service(config: &Config) -> Result<SearchService> {
        let store = Self::create_store(config)?;

        let loader = CatalogLoader::new(
            store.clone(),
            config.collections.clone(),
            config.store.page_size,
            &config.media.audio_base_url,
        );
        let cache = Arc::new(SnapshotCache::load(loader));

        let mut service = SearchService::new(
            store,
            cache,
            config.collections.clone(),
            config.search.clone(),
        );

        let timeout = Duration::from_secs(config.embeddings.timeout_secs);
        let openai = match &config.openai_api_key {
            Some(key) => Some(OpenAiClient::new(&config.embeddings.text.api_base, key, timeout)?),
            None => None,
        };

        match Self::create_text_embedder(config, openai.clone())? {
            Some(embedder) => service = service.with_text_embedder(embedder),
            None => log::warn!("text search disabled: OPENAI_API_KEY is not set"),
        }

        match &config.embeddings.image_extractor_url {
            Some(url) => {
                service = service.with_image_extractor(Arc::new(RemoteExtractor::new(url, timeout)?))
            }
            None => log::warn!("image search disabled: embeddings.image_extractor_url is not set"),
        }

        match &config.embeddings.audio_extractor_url {
            Some(url) => {
                service = service.with_audio_extractor(Arc::new(RemoteExtractor::new(url, timeout)?))
            }
            None => log::warn!("audio search disabled: embeddings.audio_extractor_url is not set"),
        }

        if config.enhance.enabled {
            match openai {
                Some(client) => {
                    service = service.with_enhancer(Arc::new(OpenAiEnhancer::new(
                        client,
                        &config.enhance.model,
                        config.enhance.max_tokens,
                    )))
                }
                None => log::warn!("description enhancement disabled: OPENAI_API_KEY is not set"),
            }
        }

        Ok(service)
    }

    fn create_text_embedder(
        config: &Config,
        openai: Option<OpenAiClient>,
    ) -> Result<Option<Arc<dyn TextEmbedder>>> {
        let model = &config.embeddings.text.model;

        match config.embeddings.text.provider {
            TextEmbeddingProvider::OpenAi => Ok(openai.map(|client| {
                Arc::new(OpenAiEmbedder::new(client, model)) as Arc<dyn TextEmbedder>
            })),

            #[cfg(feature = "local-embeddings")]
            TextEmbeddingProvider::Local => {
                let embedder = crate::embeddings::LocalTextEmbedder::new(
                    model,
                    config.base_path().to_path_buf(),
                )?;
                Ok(Some(Arc::new(embedder)))
            }

            #[cfg(not(feature = "local-embeddings"))]
            TextEmbeddingProvider::Local => {
                anyhow::bail!("embeddings.text.provider is local but the local-embeddings feature is disabled")
            }
        }
    }
}

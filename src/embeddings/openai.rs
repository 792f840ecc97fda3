use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;

use super::{check_embedding, EmbeddingError, TextEmbedder};

/// Minimal blocking client for an OpenAI-compatible API.
#[derive(Clone)]
pub struct OpenAiClient {
    api_base: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize, Debug)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize, Debug)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(api_base: &str, api_key: &str, timeout: Duration) -> Result<Self, EmbeddingError> {
        let api_base = api_base.strip_suffix("/").unwrap_or(api_base).to_string();
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            api_base,
            api_key: api_key.to_string(),
            client,
        })
    }

    fn post(&self, path: &str) -> reqwest::blocking::RequestBuilder {
        log::debug!("POST {}{}", self.api_base, path);
        self.client
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.api_key)
    }

    /// Embeds a single input with `model`.
    pub fn embeddings(&self, model: &str, input: &str) -> Result<Vec<f32>, EmbeddingError> {
        let resp = self
            .post("/embeddings")
            .json(&json!({
                "model": model,
                "input": input,
            }))
            .send()?;

        let response: EmbeddingsResponse = handle_response(resp)?;
        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .unwrap_or_default();

        check_embedding(embedding)
    }

    /// Single-turn chat completion, returns the first choice's content.
    pub fn chat(&self, model: &str, prompt: &str, max_tokens: u32) -> Result<String, EmbeddingError> {
        let resp = self
            .post("/chat/completions")
            .json(&json!({
                "model": model,
                "messages": [{"role": "user", "content": prompt}],
                "max_tokens": max_tokens,
            }))
            .send()?;

        let response: ChatResponse = handle_response(resp)?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No completion returned".to_string()))
    }
}

fn handle_response<T>(response: reqwest::blocking::Response) -> Result<T, EmbeddingError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let text = response.text()?;

    if !status.is_success() {
        return Err(EmbeddingError::Status {
            status: status.as_u16(),
            body: text,
        });
    }

    serde_json::from_str(&text).map_err(|err| {
        log::error!("{err}. tried to parse: {text:?}");
        EmbeddingError::EmbeddingFailed(err.to_string())
    })
}

/// [`TextEmbedder`] backed by the `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: OpenAiClient,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(client: OpenAiClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }
}

impl TextEmbedder for OpenAiEmbedder {
    fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.client.embeddings(&self.model, text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

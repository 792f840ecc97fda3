use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

use super::{CollectionInfo, Point, ScoredPoint, StoreError, VectorStore};

/// Blocking client for Qdrant's REST API.
pub struct QdrantStore {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize, Debug)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Deserialize, Debug)]
struct ScrollPage {
    #[serde(default)]
    points: Vec<Point>,
    #[serde(default)]
    next_page_offset: Option<Value>,
}

#[derive(Deserialize, Debug)]
struct CollectionDescription {
    status: Option<String>,
    points_count: Option<u64>,
    config: Option<CollectionConfig>,
}

#[derive(Deserialize, Debug)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Deserialize, Debug)]
struct CollectionParams {
    vectors: Option<Value>,
}

impl QdrantStore {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<QdrantStore, StoreError> {
        let endpoint = endpoint.strip_suffix("/").unwrap_or(endpoint).to_string();
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(QdrantStore {
            endpoint,
            api_key,
            client,
        })
    }

    fn get(&self, path: &str) -> reqwest::blocking::RequestBuilder {
        log::debug!("GET {}{}", self.endpoint, path);
        self.authorize(self.client.get(format!("{}{}", self.endpoint, path)))
    }

    fn post(&self, path: &str) -> reqwest::blocking::RequestBuilder {
        log::debug!("POST {}{}", self.endpoint, path);
        self.authorize(self.client.post(format!("{}{}", self.endpoint, path)))
    }

    fn authorize(&self, request: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }
}

fn handle_response<T>(response: reqwest::blocking::Response) -> Result<T, StoreError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let text = response.text()?;

    if !status.is_success() {
        return Err(StoreError::Status {
            status: status.as_u16(),
            body: text,
        });
    }

    serde_json::from_str::<QdrantResponse<T>>(&text)
        .map(|response| response.result)
        .map_err(|err| {
            log::error!("{err}. tried to parse: {text:?}");
            StoreError::Malformed(err.to_string())
        })
}

impl VectorStore for QdrantStore {
    fn scroll(&self, collection: &str, page_size: usize) -> Result<Vec<Point>, StoreError> {
        let path = format!("/collections/{collection}/points/scroll");
        let mut points = Vec::new();
        let mut offset = Value::Null;

        loop {
            let resp = self
                .post(&path)
                .json(&json!({
                    "limit": page_size,
                    "offset": offset,
                    "with_payload": true,
                    "with_vector": false,
                }))
                .send()?;
            let page: ScrollPage = handle_response(resp)?;
            points.extend(page.points);

            match page.next_page_offset {
                Some(next) if !next.is_null() && next != offset => offset = next,
                _ => break,
            }
        }

        log::debug!("collection={collection} scrolled={}", points.len());
        Ok(points)
    }

    fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let resp = self
            .post(&format!("/collections/{collection}/points/search"))
            .json(&json!({
                "vector": vector,
                "limit": limit,
                "with_payload": true,
            }))
            .send()?;

        handle_response(resp)
    }

    fn collection_info(&self, collection: &str) -> Result<CollectionInfo, StoreError> {
        let resp = self.get(&format!("/collections/{collection}")).send()?;
        let description: CollectionDescription = handle_response(resp)?;

        // only the unnamed-vector layout reports a single size
        let vector_size = description
            .config
            .and_then(|config| config.params.vectors)
            .and_then(|vectors| vectors.get("size").and_then(Value::as_u64));

        Ok(CollectionInfo {
            status: description.status,
            points_count: description.points_count,
            vector_size,
        })
    }
}

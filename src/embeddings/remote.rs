use std::time::Duration;

use serde::Deserialize;

use super::{check_embedding, EmbeddingError, FeatureExtractor};

/// Posts raw media bytes to a feature extraction service.
///
/// The service answers with `{"embedding": [...]}` or a bare JSON array.
pub struct RemoteExtractor {
    url: String,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum ExtractorResponse {
    Wrapped { embedding: Vec<f32> },
    Bare(Vec<f32>),
}

impl RemoteExtractor {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, EmbeddingError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

impl FeatureExtractor for RemoteExtractor {
    fn extract(&self, data: &[u8], content_type: &str) -> Result<Vec<f32>, EmbeddingError> {
        log::debug!("POST {} bytes={} type={content_type}", self.url, data.len());

        let resp = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data.to_vec())
            .send()?;

        let status = resp.status();
        let text = resp.text()?;
        if !status.is_success() {
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let embedding = match serde_json::from_str::<ExtractorResponse>(&text) {
            Ok(ExtractorResponse::Wrapped { embedding }) => embedding,
            Ok(ExtractorResponse::Bare(embedding)) => embedding,
            Err(err) => {
                log::error!("{err}. tried to parse: {text:?}");
                return Err(EmbeddingError::EmbeddingFailed(err.to_string()));
            }
        };

        check_embedding(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(server: &mockito::Server) -> RemoteExtractor {
        RemoteExtractor::new(&format!("{}/extract/image", server.url()), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_wrapped_and_bare_responses() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/extract/image")
            .match_header("content-type", "image/png")
            .with_status(200)
            .with_body(r#"{"embedding": [0.5, 0.25]}"#)
            .create();

        assert_eq!(
            extractor(&server).extract(&[1, 2, 3], "image/png").unwrap(),
            vec![0.5, 0.25]
        );
        mock.assert();

        let mut server = mockito::Server::new();
        server
            .mock("POST", "/extract/image")
            .with_status(200)
            .with_body("[1.0, 2.0, 3.0]")
            .create();

        assert_eq!(
            extractor(&server).extract(&[9], "image/png").unwrap(),
            vec![1.0, 2.0, 3.0]
        );
    }

    #[test]
    fn test_failure_status() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/extract/image")
            .with_status(503)
            .with_body("model loading")
            .create();

        let err = extractor(&server).extract(&[1], "image/png").unwrap_err();
        assert!(matches!(err, EmbeddingError::Status { status: 503, .. }));
    }
}

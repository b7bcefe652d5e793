//! Turning text into vectors. [`Embedder`] is the seam; [`RemoteEmbedder`] talks to the
//! site's `/api/v1/embeddings` endpoint, [`crate::ollama::OllamaClient`] to a local Ollama.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

const EMBEDDINGS_PATH: &str = "api/v1/embeddings";

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single string. Returns the embedding vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Client for `GET {base}/api/v1/embeddings?input=<text>`.
#[derive(Debug, Clone)]
pub struct RemoteEmbedder {
    client: reqwest::Client,
    endpoint: Url,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

impl RemoteEmbedder {
    /// `base` is the site root, e.g. `https://jsar.netlify.app`.
    pub fn new(base: &str, timeout: Duration) -> Result<Self, EmbedError> {
        let endpoint = endpoint_url(base, EMBEDDINGS_PATH)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(EmbedError::Request)?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        tracing::debug!(chars = text.chars().count(), "requesting query embedding");
        let resp = self
            .client
            .get(self.endpoint.clone())
            .query(&[("input", text)])
            .send()
            .await
            .map_err(EmbedError::from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EmbedError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body: EmbeddingsResponse = resp.json().await.map_err(EmbedError::from_reqwest)?;
        body.data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .filter(|e| !e.is_empty())
            .ok_or(EmbedError::EmptyResponse)
    }
}

/// Joins `path` under `base`, keeping any path prefix `base` already has.
pub(crate) fn endpoint_url(base: &str, path: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(base)?;
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path)
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("invalid embeddings URL: {0}")]
    ParseUrl(#[from] url::ParseError),
    #[error("embedding request failed: {0}")]
    Request(reqwest::Error),
    #[error("embedding request timed out")]
    Timeout,
    #[error("embedding service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("embedding service returned no embedding")]
    EmptyResponse,
    #[error("Ollama request failed: {0}")]
    Ollama(#[from] ollama_rs::error::OllamaError),
}

impl EmbedError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(e)
        }
    }
}

//! OpenAI-compatible embedding client: the production [`EmbeddingProvider`]
//! behind the trajectory store.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::traits::EmbeddingProvider;
use crate::config::ModelConfig;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// One vector of the response; `index` is its position in the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmbeddingObject {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct EmbeddingUsage {
    prompt_tokens: usize,
    total_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingObject>,
    #[serde(default)]
    usage: EmbeddingUsage,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Calls `POST {base_url}/embeddings` with one batched request per
/// [`EmbeddingProvider::embed`] call.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    model_id: String,
    dimension: usize,
}

impl EmbeddingClient {
    /// `dimension` is what the model is configured to return; responses are
    /// not checked against it.
    pub fn new(base_url: &str, api_key: &str, model_id: &str, dimension: usize) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build reqwest client for embedding")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model_id: model_id.to_string(),
            dimension,
        })
    }

    /// Build a client from the `model` configuration section.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        Self::new(
            &config.embedding_api_base,
            &config.embedding_api_key,
            &config.embedding_model_id,
            config.embedding_dimension,
        )
    }
}

impl EmbeddingProvider for EmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        debug!(
            model = %self.model_id,
            batch_size = texts.len(),
            "embedding batch"
        );

        let body = serde_json::json!({
            "model": self.model_id,
            "input": texts,
        });

        let resp = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("failed to send embedding request")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("embedding API returned {status}: {text}");
        }

        let emb_resp: EmbeddingResponse = resp
            .json()
            .await
            .context("failed to parse embedding response")?;

        let usage = emb_resp.usage.clone();
        let embeddings = into_ordered_vectors(emb_resp, texts.len())?;

        info!(
            model = %self.model_id,
            batch_size = embeddings.len(),
            dim = embeddings.first().map(|v| v.len()).unwrap_or(0),
            prompt_tokens = usage.prompt_tokens,
            total_tokens = usage.total_tokens,
            "batch embedding computed"
        );

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// The API may return objects out of order; sort by index and check the count.
fn into_ordered_vectors(resp: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut sorted = resp.data;
    sorted.sort_by_key(|e| e.index);
    if sorted.len() != expected {
        anyhow::bail!(
            "embedding API returned {} vectors for {expected} inputs",
            sorted.len()
        );
    }
    Ok(sorted.into_iter().map(|e| e.embedding).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_embed_restores_request_order() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/embeddings")
            .match_header("authorization", "Bearer key")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "small",
                "input": ["first", "second"]
            })))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]}"#,
            )
            .create_async()
            .await;

        let client = EmbeddingClient::new(&server.url(), "key", "small", 2).unwrap();
        let vectors = client
            .embed(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_embed_single_rejects_short_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/embeddings")
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": []}"#)
            .create_async()
            .await;

        let client = EmbeddingClient::new(&server.url(), "key", "small", 2).unwrap();
        assert!(client.embed_single("lonely").await.is_err());
    }

    #[test]
    fn test_count_mismatch_is_an_error() {
        let resp: EmbeddingResponse =
            serde_json::from_str(r#"{"data": [{"index": 0, "embedding": [1.0]}]}"#).unwrap();
        assert!(into_ordered_vectors(resp, 2).is_err());
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_request() {
        // Nothing listens on the discard port; a request would fail.
        let client = EmbeddingClient::new("http://127.0.0.1:9", "", "m", 8).unwrap();
        let out = client.embed(&[]).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(client.dimension(), 8);
    }
}

//! ============================================================================
//! Embedding Service - Vector embeddings for post text
//! ============================================================================
//! Generates text embeddings through an OpenAI-compatible `/embeddings` API.
//! Results come back in input order; callers rely on that positional mapping.
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default embedding model (OpenAI compatible)
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-large";

/// Requested output dimension
pub const EMBEDDING_DIM: usize = 3072;

/// Anything that turns an ordered batch of texts into an ordered batch of vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model(&self) -> &str;

    /// Output `i` must correspond to input `i`.
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
}

/// Embedding service for generating text vectors
pub struct EmbeddingService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    model: String,
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct EmbeddingUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl EmbeddingService {
    /// Create against the OpenAI API with the default model
    pub fn new_openai(api_key: String) -> Self {
        Self::new_custom(
            api_key,
            "https://api.openai.com/v1".to_string(),
            DEFAULT_EMBEDDING_MODEL.to_string(),
            Some(EMBEDDING_DIM),
        )
    }

    /// Create with custom base URL, model and output dimension
    pub fn new_custom(api_key: String, base_url: String, model: String, dimensions: Option<usize>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            dimensions,
        }
    }

    /// Replace the HTTP client with one that enforces a request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(self)
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingService {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("Generating embeddings for {} texts", texts.len());
        let expected = texts.len();

        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: texts,
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send embedding request: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body: {}", e))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(anyhow!(
                    "Embedding API error ({}): {}",
                    status,
                    error.error.message
                ));
            }
            return Err(anyhow!("Embedding API error ({}): {}", status, body));
        }

        let embedding_response: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to parse embedding response: {}", e))?;

        if let Some(usage) = &embedding_response.usage {
            debug!(
                "Embedding tokens used: {} (model: {})",
                usage.total_tokens, embedding_response.model
            );
        }

        let embeddings = order_by_index(embedding_response.data);
        if embeddings.len() != expected {
            return Err(anyhow!(
                "Embedding API returned {} vectors for {} inputs",
                embeddings.len(),
                expected
            ));
        }
        Ok(embeddings)
    }
}

fn order_by_index(data: Vec<EmbeddingData>) -> Vec<Vec<f32>> {
    let mut embeddings: Vec<(usize, Vec<f32>)> = data
        .into_iter()
        .map(|d| (d.index, d.embedding))
        .collect();
    embeddings.sort_by_key(|(idx, _)| *idx);
    embeddings.into_iter().map(|(_, e)| e).collect()
}

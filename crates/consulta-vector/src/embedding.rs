//! Embedding client for generating vector representations
//!
//! Talks to the Hugging Face inference API feature-extraction pipeline.
//! The response is decoded into a typed shape and reduced to a single
//! vector before it leaves this module.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use consulta_core::{ConsultaError, EmbeddingVector, Result, UpstreamConfig};
use reqwest::Client;
use serde::{Deserialize, Serialize};

// ============================================================================
// Embedding Trait
// ============================================================================

/// Trait for embedding generation
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Generate the embedding for a single text
    async fn embed(&self, text: &str) -> Result<EmbeddingVector>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Hugging Face Feature Extraction Client
// ============================================================================

/// Hugging Face inference API embedding client
pub struct HuggingFaceEmbedding {
    client: Client,
    api_key: String,
    url: String,
    wait_for_model: bool,
}

#[derive(Debug, Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<FeatureExtractionOptions>,
}

#[derive(Debug, Serialize)]
struct FeatureExtractionOptions {
    wait_for_model: bool,
}

/// Shapes the feature-extraction pipeline answers with.
///
/// Sentence-transformer models return one pooled vector; raw transformer
/// models return one row per token.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeatureExtractionResponse {
    Vector(Vec<f32>),
    Matrix(Vec<Vec<f32>>),
}

impl FeatureExtractionResponse {
    fn into_vector(self) -> Result<Vec<f32>> {
        match self {
            Self::Vector(values) => Ok(values),
            Self::Matrix(mut rows) => match rows.len() {
                0 => Err(ConsultaError::Embedding(
                    "Embedding response contained no rows".to_string(),
                )),
                1 => Ok(rows.swap_remove(0)),
                _ => mean_pool(&rows),
            },
        }
    }
}

/// Average token rows into one sentence vector
fn mean_pool(rows: &[Vec<f32>]) -> Result<Vec<f32>> {
    let width = rows[0].len();
    if width == 0 || rows.iter().any(|row| row.len() != width) {
        return Err(ConsultaError::Embedding(
            "Embedding rows have inconsistent widths".to_string(),
        ));
    }

    let mut pooled = vec![0.0f32; width];
    for row in rows {
        for (acc, value) in pooled.iter_mut().zip(row) {
            *acc += value;
        }
    }
    let count = rows.len() as f32;
    for value in &mut pooled {
        *value /= count;
    }
    Ok(pooled)
}

impl HuggingFaceEmbedding {
    /// Create a new client against a feature-extraction URL
    pub fn new(api_key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            url: url.into(),
            wait_for_model: true,
        }
    }

    /// Create from config, sharing a pooled HTTP client
    pub fn from_config(config: &UpstreamConfig, client: Client) -> Result<Self> {
        let api_key = config.huggingface_key()?;
        Ok(Self::new(api_key, config.embedding_url.clone())
            .with_client(client)
            .with_wait_for_model(config.wait_for_model))
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Toggle the `wait_for_model` request option
    pub fn with_wait_for_model(mut self, wait: bool) -> Self {
        self.wait_for_model = wait;
        self
    }
}

#[async_trait]
impl EmbeddingClient for HuggingFaceEmbedding {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        let request = FeatureExtractionRequest {
            inputs: text,
            options: self.wait_for_model.then_some(FeatureExtractionOptions {
                wait_for_model: true,
            }),
        };

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| ConsultaError::Embedding(format!("Embedding request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ConsultaError::Embedding(format!(
                "Hugging Face returned {status}: {error_text}"
            )));
        }

        let decoded: FeatureExtractionResponse = response.json().await.map_err(|e| {
            ConsultaError::Embedding(format!("Unexpected embedding response shape: {e}"))
        })?;

        let vector = EmbeddingVector::new(decoded.into_vector()?)?;
        tracing::debug!(dimension = vector.dimension(), "Embedding generated");
        Ok(vector)
    }

    fn name(&self) -> &str {
        "huggingface"
    }
}

// ============================================================================
// Tests
// ============================================================================

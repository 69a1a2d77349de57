//! Embeddings support for semantic memory retrieval.
//!
//! This module provides the [`Embedder`] trait and implementations for
//! turning text into dense vectors.
//!
//! # Implementations
//!
//! - [`MockEmbedder`]: Returns deterministic embeddings for testing
//! - [`OpenAiEmbedder`]: Any OpenAI-compatible `/embeddings` endpoint (OpenAI, OpenRouter)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{LlmError, Result};
use crate::openai::OPENROUTER_BASE;

/// Default cap on characters sent to an embedding endpoint.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 8_000;

// ─────────────────────────────────────────────────────────────────────────────
// Embedder Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for generating text embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts in a batch.
    ///
    /// Default implementation calls `embed` for each text sequentially.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Get the dimensionality of embeddings produced by this embedder.
    fn dimensions(&self) -> usize;

    /// Get the name of this embedder.
    fn name(&self) -> &str;
}

/// A shared embedder that can be used across tasks.
pub type SharedEmbedder = Arc<dyn Embedder>;

/// Collapse whitespace (newlines included) and cut to `max_chars`.
///
/// Returns `None` when nothing but whitespace remains.
pub fn normalize_input(text: &str, max_chars: usize) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    Some(collapsed.chars().take(max_chars).collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// A mock embedder for testing purposes.
///
/// Generates deterministic unit vectors from a hash of the text, so the same
/// text always embeds identically and different texts are nearly orthogonal.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimensions: usize,
}

impl MockEmbedder {
    /// Create a new mock embedder with the specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = normalize_input(text, DEFAULT_MAX_INPUT_CHARS)
            .ok_or_else(|| LlmError::InvalidRequest("cannot embed empty text".to_string()))?;

        let mut state = simple_hash(&text);
        let mut embedding: Vec<f32> = (0..self.dimensions)
            .map(|_| {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                ((state >> 16) as u16 as f32 / 32768.0) - 1.0
            })
            .collect();

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// djb2 hash for deterministic embedding generation.
fn simple_hash(s: &str) -> u64 {
    let mut hash: u64 = 5381;
    for byte in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(byte as u64);
    }
    hash
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI-compatible Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for an OpenAI-compatible embeddings endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedderConfig {
    /// API key for authentication.
    pub api_key: Option<String>,
    /// Base URL for the API.
    pub base_url: String,
    /// Model to use for embeddings.
    pub model: String,
    /// Requested output dimensions, for models that support shortening.
    pub dimensions: Option<usize>,
    /// Input is truncated to this many characters.
    pub max_input_chars: usize,
    /// Request timeout.
    pub timeout: Duration,
}

impl OpenAiEmbedderConfig {
    /// Config for OpenRouter's OpenAI embedding models.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: OPENROUTER_BASE.to_string(),
            model: "openai/text-embedding-3-small".to_string(),
            dimensions: None,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            timeout: Duration::from_secs(10),
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Request shortened vectors.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the input truncation limit.
    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }
}

/// Known output sizes, keyed by model name without a provider prefix.
fn model_dimensions(model: &str) -> usize {
    let bare = model.rsplit('/').next().unwrap_or(model);
    match bare {
        "text-embedding-3-large" => 3072,
        "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
        _ => 1536,
    }
}

/// OpenAI-compatible embeddings API client.
pub struct OpenAiEmbedder {
    client: Client,
    config: OpenAiEmbedderConfig,
    dimensions: usize,
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

impl OpenAiEmbedder {
    /// Create a new embedder.
    pub fn new(config: OpenAiEmbedderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let dimensions = config
            .dimensions
            .unwrap_or_else(|| model_dimensions(&config.model));

        Ok(Self {
            client,
            config,
            dimensions,
        })
    }

    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.config.base_url.trim_end_matches('/'))
    }

    fn prepare(&self, text: &str) -> Result<String> {
        normalize_input(text, self.config.max_input_chars)
            .ok_or_else(|| LlmError::InvalidRequest("cannot embed empty text".to_string()))
    }

    async fn request(&self, input: EmbeddingInput, expected: usize) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: self.config.model.clone(),
            input,
            dimensions: self.config.dimensions,
        };

        let mut builder = self
            .client
            .post(self.embeddings_url())
            .header("Content-Type", "application/json");
        if let Some(ref api_key) = self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }
        let response = builder.json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => LlmError::Auth(format!("Embedding request rejected: {}", body)),
                429 => LlmError::rate_limit(body),
                _ => LlmError::Backend(format!(
                    "Embedding request failed: HTTP {} - {}",
                    status, body
                )),
            });
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Serialization(format!("Failed to parse response: {}", e)))?;

        let mut data = result.data;
        data.sort_by_key(|e| e.index);
        if data.len() != expected {
            return Err(LlmError::Serialization(format!(
                "expected {} embeddings, got {}",
                expected,
                data.len()
            )));
        }
        if data.iter().any(|e| e.embedding.is_empty()) {
            return Err(LlmError::Serialization(
                "provider returned an empty embedding".to_string(),
            ));
        }

        Ok(data.into_iter().map(|e| e.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = EmbeddingInput::Single(self.prepare(text)?);
        self.request(input, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Serialization("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inputs = texts
            .iter()
            .map(|t| self.prepare(t))
            .collect::<Result<Vec<_>>>()?;
        self.request(EmbeddingInput::Batch(inputs), texts.len()).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: EmbeddingInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedder Factory
// ─────────────────────────────────────────────────────────────────────────────

/// Provider-agnostic description of an embedder, filled in from config.
#[derive(Debug, Clone, Default)]
pub struct EmbedderSpec {
    /// Provider name: "openai" or "mock".
    pub provider: String,
    /// API key (required for "openai").
    pub api_key: Option<String>,
    /// Model name override.
    pub model: Option<String>,
    /// Base URL override.
    pub base_url: Option<String>,
    /// Requested dimensions.
    pub dimensions: Option<usize>,
    /// Input truncation limit.
    pub max_input_chars: Option<usize>,
    /// Request timeout.
    pub timeout: Option<Duration>,
}

/// Build a `SharedEmbedder` from a spec.
pub fn build_embedder(spec: &EmbedderSpec) -> Result<SharedEmbedder> {
    match spec.provider.as_str() {
        "openai" | "openrouter" => {
            let api_key = spec.api_key.as_deref().ok_or_else(|| {
                LlmError::Config(
                    "Embedding provider requires an API key. \
                     Set OPENROUTER_API_KEY or configure [embedding] api_key."
                        .to_string(),
                )
            })?;
            let mut config = OpenAiEmbedderConfig::new(api_key);
            if let Some(ref model) = spec.model {
                config = config.with_model(model);
            }
            if let Some(ref base_url) = spec.base_url {
                config = config.with_base_url(base_url);
            }
            if let Some(dimensions) = spec.dimensions {
                config = config.with_dimensions(dimensions);
            }
            if let Some(max) = spec.max_input_chars {
                config = config.with_max_input_chars(max);
            }
            if let Some(timeout) = spec.timeout {
                config = config.with_timeout(timeout);
            }
            Ok(Arc::new(OpenAiEmbedder::new(config)?))
        }
        "mock" => Ok(Arc::new(MockEmbedder::new(spec.dimensions.unwrap_or(64)))),
        other => Err(LlmError::Config(format!(
            "Unknown embedding provider '{}'. Valid: openai, openrouter, mock",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn embedder_for(server: &MockServer) -> OpenAiEmbedder {
        OpenAiEmbedder::new(
            OpenAiEmbedderConfig::new("k")
                .with_base_url(server.uri())
                .with_model("test-embed"),
        )
        .unwrap()
    }

    #[test]
    fn test_normalize_input() {
        assert_eq!(
            normalize_input("  likes\ntea \t a lot ", 100).as_deref(),
            Some("likes tea a lot")
        );
        assert_eq!(normalize_input("abcdef", 3).as_deref(), Some("abc"));
        assert_eq!(normalize_input(" \n ", 10), None);
    }

    #[tokio::test]
    async fn test_mock_embedder_deterministic_unit_vectors() {
        let embedder = MockEmbedder::new(32);
        let a = embedder.embed("exam on Friday").await.unwrap();
        let b = embedder.embed("exam on\nFriday").await.unwrap();
        let c = embedder.embed("likes tea").await.unwrap();

        assert_eq!(a.len(), 32);
        assert_eq!(a, b);
        assert_ne!(a, c);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_mock_embedder_rejects_empty() {
        assert!(MockEmbedder::default().embed("   ").await.is_err());
    }

    #[test]
    fn test_model_dimensions() {
        assert_eq!(model_dimensions("openai/text-embedding-3-small"), 1536);
        assert_eq!(model_dimensions("text-embedding-3-large"), 3072);
        let embedder =
            OpenAiEmbedder::new(OpenAiEmbedderConfig::new("k").with_dimensions(256)).unwrap();
        assert_eq!(embedder.dimensions(), 256);
    }

    #[tokio::test]
    async fn test_openai_embed_sends_single_normalized_input() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_json(json!({"model": "test-embed", "input": "struggles with calculus"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [0.1, 0.2, 0.3]}]
            })))
            .mount(&server)
            .await;

        let vector = embedder_for(&server)
            .embed("struggles\nwith   calculus")
            .await
            .unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_openai_batch_sorted_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]
            })))
            .mount(&server)
            .await;

        let vectors = embedder_for(&server).embed_batch(&["a", "b"]).await.unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_openai_missing_vector_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let err = embedder_for(&server).embed("x").await.unwrap_err();
        assert!(matches!(err, LlmError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_openai_non_200_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = embedder_for(&server).embed("x").await.unwrap_err();
        assert!(matches!(err, LlmError::Backend(_)));
    }

    #[tokio::test]
    async fn test_openai_unreachable_is_network_error() {
        let embedder = OpenAiEmbedder::new(
            OpenAiEmbedderConfig::new("k")
                .with_base_url("http://127.0.0.1:1")
                .with_timeout(Duration::from_secs(2)),
        )
        .unwrap();
        let err = embedder.embed("x").await.unwrap_err();
        assert!(matches!(err, LlmError::Network(_)));
    }

    #[test]
    fn test_build_embedder() {
        let spec = EmbedderSpec {
            provider: "mock".to_string(),
            dimensions: Some(8),
            ..Default::default()
        };
        assert_eq!(build_embedder(&spec).unwrap().dimensions(), 8);

        let spec = EmbedderSpec {
            provider: "openai".to_string(),
            ..Default::default()
        };
        assert!(matches!(build_embedder(&spec), Err(LlmError::Config(_))));

        let spec = EmbedderSpec {
            provider: "onnx".to_string(),
            ..Default::default()
        };
        assert!(build_embedder(&spec).is_err());
    }
}

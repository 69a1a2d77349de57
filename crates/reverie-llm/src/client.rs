//! Ordered provider routing with a uniform timeout.
//!
//! The [`ProviderChain`] holds a list of named backends and tries them in
//! sequence. Every attempt is bounded by the same deadline and every failure
//! is treated the same way: log it and move on to the next entry.
//!
//! # Example
//!
//! ```rust,ignore
//! use reverie_llm::{ProviderChain, ProviderSpec, Provider};
//!
//! let chain = ProviderChain::from_specs(&specs, Duration::from_secs(15))?;
//! let response = chain.complete(request).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{LlmBackend, SharedBackend};
use crate::error::{LlmError, Result};
use crate::openai::{OpenAiBackend, OpenAiConfig};
use crate::types::{CompletionRequest, CompletionResponse};

// ─────────────────────────────────────────────────────────────────────────────
// Provider Enum
// ─────────────────────────────────────────────────────────────────────────────

/// Supported completion providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// OpenRouter aggregator
    OpenRouter,
    /// DeepSeek API
    DeepSeek,
    /// OpenAI API
    OpenAi,
    /// Groq cloud inference
    Groq,
    /// Local Ollama instance
    Ollama,
}

impl Provider {
    /// Get the string name for this provider.
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenRouter => "openrouter",
            Provider::DeepSeek => "deepseek",
            Provider::OpenAi => "openai",
            Provider::Groq => "groq",
            Provider::Ollama => "ollama",
        }
    }

    /// Parse a provider from a string name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "openrouter" => Some(Provider::OpenRouter),
            "deepseek" => Some(Provider::DeepSeek),
            "openai" | "gpt" => Some(Provider::OpenAi),
            "groq" => Some(Provider::Groq),
            "ollama" | "local" => Some(Provider::Ollama),
            _ => None,
        }
    }

    /// Check if this provider requires an API key.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Provider::Ollama)
    }

    /// Environment variable consulted for this provider's key.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Provider::OpenRouter => Some("OPENROUTER_API_KEY"),
            Provider::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::Groq => Some("GROQ_API_KEY"),
            Provider::Ollama => None,
        }
    }

    /// Preset configuration for this provider.
    pub fn preset(&self, api_key: Option<String>) -> OpenAiConfig {
        let key = api_key.clone().unwrap_or_default();
        let mut config = match self {
            Provider::OpenRouter => OpenAiConfig::openrouter(key),
            Provider::DeepSeek => OpenAiConfig::deepseek(key),
            Provider::OpenAi => OpenAiConfig::openai(key),
            Provider::Groq => OpenAiConfig::groq(key),
            Provider::Ollama => OpenAiConfig::ollama(),
        };
        if !matches!(self, Provider::Ollama) {
            config.api_key = api_key;
        }
        config
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider Spec
// ─────────────────────────────────────────────────────────────────────────────

/// One entry of the ordered provider list, resolved from configuration.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    /// Which provider preset to start from.
    pub provider: Provider,
    /// Model override.
    pub model: Option<String>,
    /// Base URL override.
    pub base_url: Option<String>,
    /// Resolved API key.
    pub api_key: Option<String>,
    /// Retries for transient errors inside this entry.
    pub max_retries: u32,
}

impl ProviderSpec {
    /// A spec using the provider's preset model and URL.
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            model: None,
            base_url: None,
            api_key: None,
            max_retries: 0,
        }
    }

    /// Pin the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Point at a different base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Display label: `provider/model`.
    pub fn label(&self, config: &OpenAiConfig) -> String {
        format!("{}/{}", self.provider, config.model)
    }
}

/// Build a backend for one spec.
///
/// The HTTP client timeout is set to the chain timeout so a stuck socket
/// cannot outlive the deadline.
pub fn build_backend(spec: &ProviderSpec, timeout: Duration) -> Result<SharedBackend> {
    if spec.provider.requires_api_key() && spec.api_key.is_none() {
        return Err(LlmError::Config(format!(
            "Provider '{}' requires an API key{}",
            spec.provider,
            spec.provider
                .api_key_env()
                .map(|env| format!(" (set {})", env))
                .unwrap_or_default()
        )));
    }

    let mut config = spec
        .provider
        .preset(spec.api_key.clone())
        .with_timeout(timeout)
        .with_max_retries(spec.max_retries);
    if let Some(ref model) = spec.model {
        config = config.with_model(model);
    }
    if let Some(ref base_url) = spec.base_url {
        config = config.with_base_url(base_url);
    }
    let label = spec.label(&config);
    config = config.with_name(label);

    Ok(Arc::new(OpenAiBackend::new(config)?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider Chain
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered list of backends tried in sequence.
pub struct ProviderChain {
    backends: Vec<SharedBackend>,
    timeout: Duration,
}

impl std::fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderChain")
            .field(
                "backends",
                &self.backends.iter().map(|b| b.name()).collect::<Vec<_>>(),
            )
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderChain {
    /// Create a chain from already-built backends.
    pub fn new(backends: Vec<SharedBackend>, timeout: Duration) -> Result<Self> {
        if backends.is_empty() {
            return Err(LlmError::Config(
                "No completion providers configured".to_string(),
            ));
        }
        Ok(Self { backends, timeout })
    }

    /// Build every spec and chain them in order.
    ///
    /// Entries that cannot be built (usually a missing key) are skipped with a
    /// warning; the chain only fails when none remain.
    pub fn from_specs(specs: &[ProviderSpec], timeout: Duration) -> Result<Self> {
        let mut backends = Vec::with_capacity(specs.len());
        let mut last_error = None;
        for spec in specs {
            match build_backend(spec, timeout) {
                Ok(backend) => backends.push(backend),
                Err(e) => {
                    tracing::warn!(provider = %spec.provider, error = %e, "Skipping provider");
                    last_error = Some(e);
                }
            }
        }
        if backends.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                LlmError::Config("No completion providers configured".to_string())
            }));
        }
        Ok(Self { backends, timeout })
    }

    /// Names of the chained backends, in order.
    pub fn names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// The per-attempt deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Try each backend in order until one succeeds.
    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let mut last_error = None;

        for (position, backend) in self.backends.iter().enumerate() {
            let attempt = tokio::time::timeout(self.timeout, backend.complete(request.clone()));
            let error = match attempt.await {
                Ok(Ok(response)) => {
                    if position > 0 {
                        tracing::info!(provider = backend.name(), "Fallback provider succeeded");
                    }
                    return Ok(response);
                }
                Ok(Err(e)) => e,
                Err(_) => LlmError::Timeout(self.timeout),
            };

            tracing::warn!(
                provider = backend.name(),
                position,
                error = %error,
                "Provider failed"
            );
            let fall_back = error.should_fall_back();
            last_error = Some(error);
            if !fall_back {
                break;
            }
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::Config("No completion providers configured".to_string())))
    }
}

#[async_trait]
impl LlmBackend for ProviderChain {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        ProviderChain::complete(self, request).await
    }

    fn name(&self) -> &str {
        "chain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::types::Message;

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![Message::user("summarise")], 100)
    }

    #[test]
    fn test_provider_from_name() {
        assert_eq!(Provider::from_name("OpenRouter"), Some(Provider::OpenRouter));
        assert_eq!(Provider::from_name("local"), Some(Provider::Ollama));
        assert_eq!(Provider::from_name("anthropic"), None);
        assert!(!Provider::Ollama.requires_api_key());
        assert_eq!(Provider::DeepSeek.api_key_env(), Some("DEEPSEEK_API_KEY"));
    }

    #[test]
    fn test_build_backend_requires_key() {
        let err = build_backend(&ProviderSpec::new(Provider::DeepSeek), Duration::from_secs(5))
            .err().unwrap();
        assert!(err.to_string().contains("DEEPSEEK_API_KEY"));

        let backend = build_backend(
            &ProviderSpec::new(Provider::OpenRouter)
                .with_api_key("k")
                .with_model("some/model"),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(backend.name(), "openrouter/some/model");
    }

    #[test]
    fn test_from_specs_skips_unbuildable() {
        let specs = vec![
            ProviderSpec::new(Provider::OpenAi),
            ProviderSpec::new(Provider::Ollama),
        ];
        let chain = ProviderChain::from_specs(&specs, Duration::from_secs(5)).unwrap();
        assert_eq!(chain.names(), vec!["ollama/llama3.2"]);

        let specs = vec![ProviderSpec::new(Provider::OpenAi)];
        assert!(ProviderChain::from_specs(&specs, Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_empty_chain_rejected() {
        assert!(ProviderChain::new(Vec::new(), Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let first = Arc::new(MockBackend::with_text("one"));
        let second = Arc::new(MockBackend::with_text("two"));
        let backends: Vec<SharedBackend> = vec![first.clone(), second.clone()];
        let chain = ProviderChain::new(backends, Duration::from_secs(5)).unwrap();

        let response = chain.complete(request()).await.unwrap();
        assert_eq!(response.text(), "one");
        assert_eq!(second.request_count(), 0);
    }

    #[tokio::test]
    async fn test_falls_back_on_failure() {
        let first = Arc::new(MockBackend::failing("down"));
        let second = Arc::new(MockBackend::with_text("two"));
        let backends: Vec<SharedBackend> = vec![first.clone(), second.clone()];
        let chain = ProviderChain::new(backends, Duration::from_secs(5)).unwrap();

        let response = chain.complete(request()).await.unwrap();
        assert_eq!(response.text(), "two");
        assert_eq!(first.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_moves_to_next() {
        let slow = Arc::new(MockBackend::with_text("late").with_delay(Duration::from_secs(60)));
        let fast = Arc::new(MockBackend::with_text("fast"));
        let backends: Vec<SharedBackend> = vec![slow, fast];
        let chain = ProviderChain::new(backends, Duration::from_secs(5)).unwrap();

        let response = chain.complete(request()).await.unwrap();
        assert_eq!(response.text(), "fast");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_returns_last_error() {
        let slow = Arc::new(MockBackend::with_text("late").with_delay(Duration::from_secs(60)));
        let failing = Arc::new(MockBackend::failing("boom"));
        let backends: Vec<SharedBackend> = vec![failing, slow];
        let chain = ProviderChain::new(backends, Duration::from_secs(5)).unwrap();

        let err = chain.complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout(d) if d == Duration::from_secs(5)));
    }
}

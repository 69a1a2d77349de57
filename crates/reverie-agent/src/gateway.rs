//! Bounded access to embedding and completion providers.
//!
//! Every network call made by the memory pipeline goes through
//! [`ExternalCalls`], which caps how many run at once and gives each one the
//! same deadline. The deadline covers waiting for a permit as well as the
//! call itself, so a caller is never held longer than the timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use reverie_llm::{
    CompletionRequest, CompletionResponse, Embedder, LlmBackend, LlmError, SharedBackend,
    SharedEmbedder,
};

/// Default number of concurrent external calls.
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 4;

/// Default deadline for one external call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Concurrency-limited, deadline-bounded provider access.
pub struct ExternalCalls {
    embedder: SharedEmbedder,
    completer: SharedBackend,
    permits: Semaphore,
    timeout: Duration,
}

impl std::fmt::Debug for ExternalCalls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalCalls")
            .field("embedder", &self.embedder.name())
            .field("completer", &self.completer.name())
            .field("available_permits", &self.permits.available_permits())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ExternalCalls {
    /// Create a gateway with default limits.
    pub fn new(embedder: SharedEmbedder, completer: SharedBackend) -> Self {
        Self {
            embedder,
            completer,
            permits: Semaphore::new(DEFAULT_MAX_CONCURRENT_CALLS),
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Set the number of calls allowed in flight at once (at least one).
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.permits = Semaphore::new(max.max(1));
        self
    }

    /// Set the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The per-call deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Name of the embedder in use.
    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    async fn bounded<T, F>(&self, call: F) -> reverie_llm::Result<T>
    where
        F: Future<Output = reverie_llm::Result<T>>,
    {
        let attempt = async {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| LlmError::Internal("call gateway closed".to_string()))?;
            call.await
        };
        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(self.timeout)),
        }
    }

    /// Embed `text`, or `None` if the provider is unreachable, slow or
    /// returns something unusable.
    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        if text.trim().is_empty() {
            debug!("Skipping embedding of blank text");
            return None;
        }
        match self.bounded(self.embedder.embed(text)).await {
            Ok(vector) if vector.is_empty() => {
                warn!(embedder = self.embedder.name(), "Embedder returned an empty vector");
                None
            }
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(embedder = self.embedder.name(), error = %e, "Embedding failed");
                None
            }
        }
    }

    /// Embed several texts in one request, in order.
    ///
    /// `None` if the call fails or any vector comes back missing or empty.
    pub async fn embed_batch(&self, texts: &[&str]) -> Option<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Some(Vec::new());
        }
        match self.bounded(self.embedder.embed_batch(texts)).await {
            Ok(vectors) if vectors.len() != texts.len() || vectors.iter().any(Vec::is_empty) => {
                warn!(
                    embedder = self.embedder.name(),
                    requested = texts.len(),
                    returned = vectors.len(),
                    "Embedder returned an incomplete batch"
                );
                None
            }
            Ok(vectors) => Some(vectors),
            Err(e) => {
                warn!(embedder = self.embedder.name(), error = %e, batch = texts.len(), "Batch embedding failed");
                None
            }
        }
    }

    /// Run a completion and return its trimmed text.
    ///
    /// An empty reply is reported as a serialization error.
    pub async fn complete(&self, request: CompletionRequest) -> reverie_llm::Result<String> {
        let response = self.bounded(self.completer.complete(request)).await?;
        let text = response.text().trim();
        if text.is_empty() {
            return Err(LlmError::Serialization(
                "provider returned an empty completion".to_string(),
            ));
        }
        Ok(text.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unavailable Provider
// ─────────────────────────────────────────────────────────────────────────────

/// Stand-in for a provider that could not be configured.
///
/// Every call fails with the configuration error captured at startup, so the
/// pipeline degrades the same way it does for an unreachable provider.
#[derive(Debug, Clone)]
pub struct UnavailableProvider {
    reason: String,
    dimensions: usize,
}

impl UnavailableProvider {
    /// Create a stand-in that reports `reason` on every call.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            dimensions: 0,
        }
    }

    /// Shared embedder form.
    pub fn embedder(reason: impl Into<String>) -> SharedEmbedder {
        Arc::new(Self::new(reason))
    }

    /// Shared backend form.
    pub fn backend(reason: impl Into<String>) -> SharedBackend {
        Arc::new(Self::new(reason))
    }
}

#[async_trait]
impl Embedder for UnavailableProvider {
    async fn embed(&self, _text: &str) -> reverie_llm::Result<Vec<f32>> {
        Err(LlmError::Config(self.reason.clone()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

#[async_trait]
impl LlmBackend for UnavailableProvider {
    async fn complete(&self, _request: CompletionRequest) -> reverie_llm::Result<CompletionResponse> {
        Err(LlmError::Config(self.reason.clone()))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverie_llm::{Message, MockBackend, MockEmbedder};

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![Message::user("hi")], 10)
    }

    #[tokio::test]
    async fn test_embed_success_and_blank() {
        let gateway = ExternalCalls::new(
            Arc::new(MockEmbedder::new(8)),
            Arc::new(MockBackend::with_text("x")),
        );
        assert_eq!(gateway.embed("likes tea").await.unwrap().len(), 8);
        assert!(gateway.embed("   ").await.is_none());
    }

    /// Answers batches with one vector too few.
    struct ShortBatchEmbedder;

    #[async_trait]
    impl Embedder for ShortBatchEmbedder {
        async fn embed(&self, _text: &str) -> reverie_llm::Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[&str]) -> reverie_llm::Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0, 0.0]; texts.len().saturating_sub(1)])
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "short"
        }
    }

    #[tokio::test]
    async fn test_embed_batch() {
        let gateway = ExternalCalls::new(
            Arc::new(MockEmbedder::new(8)),
            Arc::new(MockBackend::new(vec![])),
        );
        let vectors = gateway.embed_batch(&["likes tea", "exam on friday"]).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], gateway.embed("likes tea").await.unwrap());
        assert_eq!(gateway.embed_batch(&[]).await, Some(Vec::new()));

        let short = ExternalCalls::new(Arc::new(ShortBatchEmbedder), Arc::new(MockBackend::new(vec![])));
        assert!(short.embed_batch(&["a", "b"]).await.is_none());
    }

    #[tokio::test]
    async fn test_unavailable_embedder_yields_none() {
        let gateway = ExternalCalls::new(
            UnavailableProvider::embedder("no key"),
            UnavailableProvider::backend("no key"),
        );
        assert!(gateway.embed("anything").await.is_none());
        let err = gateway.complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Config(_)));
    }

    #[tokio::test]
    async fn test_complete_trims_and_rejects_empty() {
        let gateway = ExternalCalls::new(
            Arc::new(MockEmbedder::new(8)),
            Arc::new(MockBackend::with_texts(["  answer \n", "   "])),
        );
        assert_eq!(gateway.complete(request()).await.unwrap(), "answer");
        assert!(matches!(
            gateway.complete(request()).await,
            Err(LlmError::Serialization(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_completion_times_out() {
        let gateway = ExternalCalls::new(
            Arc::new(MockEmbedder::new(8)),
            Arc::new(MockBackend::with_text("late").with_delay(Duration::from_secs(600))),
        )
        .with_timeout(Duration::from_secs(2));

        let err = gateway.complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout(d) if d == Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_for_permit_counts_against_deadline() {
        let backend = Arc::new(MockBackend::with_texts(["a", "b"]).with_delay(Duration::from_secs(10)));
        let gateway = Arc::new(
            ExternalCalls::new(Arc::new(MockEmbedder::new(8)), backend)
                .with_max_concurrent(1)
                .with_timeout(Duration::from_secs(15)),
        );

        let first = {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.complete(request()).await })
        };
        tokio::task::yield_now().await;
        let second = gateway.complete(request()).await;

        assert_eq!(first.await.unwrap().unwrap(), "a");
        // The second call waits 10s for the permit and then needs 10s more.
        assert!(matches!(second, Err(LlmError::Timeout(_))));
    }
}

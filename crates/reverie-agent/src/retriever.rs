//! Reminiscence: relevant memories rendered for prompt injection.
//!
//! Retrieval never fails from the caller's point of view. If the query
//! cannot be embedded, or storage misbehaves, the result is an empty string
//! and the conversation carries on without extra context.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use reverie_config::RecallConfig;
use reverie_memory::{MemoryRecord, ScoredMemory, UserMemoryStore};

use crate::error::Result;
use crate::gateway::ExternalCalls;

/// Records embedded per request when indexing lazily.
pub const INDEX_BATCH_SIZE: usize = 16;

/// Marker appended to a line cut to fit the budget.
const ELLIPSIS: char = '…';

/// Similarity search plus rendering.
pub struct Retriever {
    gateway: Arc<ExternalCalls>,
    config: RecallConfig,
}

impl Retriever {
    /// Create a retriever.
    pub fn new(gateway: Arc<ExternalCalls>, config: RecallConfig) -> Self {
        Self { gateway, config }
    }

    /// The recall settings in use.
    pub fn config(&self) -> &RecallConfig {
        &self.config
    }

    /// Records relevant to `query`, best first.
    ///
    /// Initialises the store if needed and embeds a bounded batch of records
    /// that have no vector yet before searching. An unembeddable query
    /// yields no hits.
    pub async fn recall(&self, store: &UserMemoryStore, query: &str) -> Result<Vec<ScoredMemory>> {
        store.ensure_initialized()?;

        let Some(query_vector) = self.gateway.embed(query).await else {
            debug!(user = %store.user_id(), "Query not embedded, no recall");
            return Ok(Vec::new());
        };

        self.index_missing(store, self.config.lazy_index_limit).await?;

        let hits = store.similarity_search(&query_vector, self.config.top_k, self.config.min_score)?;
        debug!(user = %store.user_id(), hits = hits.len(), "Recall complete");
        Ok(hits)
    }

    /// The reminiscence block for `query`, or `""` when nothing relevant
    /// is found or anything goes wrong.
    pub async fn reminiscence(&self, store: &UserMemoryStore, query: &str) -> String {
        match self.recall(store, query).await {
            Ok(hits) => self.render(&hits),
            Err(e) => {
                warn!(user = %store.user_id(), error = %e, "Reminiscence failed");
                String::new()
            }
        }
    }

    /// Embed up to `limit` records that have no vector, oldest first.
    ///
    /// Records are embedded in batches of [`INDEX_BATCH_SIZE`], with the
    /// batches running concurrently through the gateway; vectors are stored
    /// as each batch comes back. Returns how many records were indexed.
    pub async fn index_missing(&self, store: &UserMemoryStore, limit: usize) -> Result<usize> {
        let missing = store.records_missing_vectors()?;
        if missing.is_empty() || limit == 0 {
            return Ok(0);
        }
        let missing: Vec<MemoryRecord> = missing.into_iter().take(limit).collect();

        let mut tasks = JoinSet::new();
        for batch in missing.chunks(INDEX_BATCH_SIZE) {
            let gateway = self.gateway.clone();
            let batch = batch.to_vec();
            tasks.spawn(async move {
                let texts: Vec<&str> = batch.iter().map(|r| r.content.as_str()).collect();
                let vectors = gateway.embed_batch(&texts).await;
                (batch, vectors)
            });
        }

        let mut indexed = 0;
        while let Some(joined) = tasks.join_next().await {
            let (batch, vectors) = match joined {
                Ok((batch, Some(vectors))) => (batch, vectors),
                Ok((_, None)) => continue,
                Err(e) => {
                    warn!(error = %e, "Indexing task failed");
                    continue;
                }
            };
            for (record, vector) in batch.iter().zip(vectors) {
                match store.upsert_vector(record.id, vector) {
                    Ok(true) => indexed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(user = %store.user_id(), id = %record.id, error = %e, "Lazy index write failed")
                    }
                }
            }
        }

        if indexed > 0 {
            debug!(user = %store.user_id(), indexed, "Lazily indexed records");
        }
        Ok(indexed)
    }

    /// Render hits as `header` followed by one `- [timestamp] content` line
    /// each, kept within `max_chars` by dropping the lowest-scoring lines.
    pub fn render(&self, hits: &[ScoredMemory]) -> String {
        if hits.is_empty() {
            return String::new();
        }

        let header = self.config.header.trim_end();
        let header_chars = header.chars().count();
        let max_chars = self.config.max_chars;

        let mut lines: Vec<String> = hits
            .iter()
            .map(|hit| format!("- [{}] {}", hit.record.display_timestamp(), hit.record.content))
            .collect();

        let rendered_len =
            |lines: &[String]| header_chars + lines.iter().map(|l| 1 + l.chars().count()).sum::<usize>();

        while lines.len() > 1 && rendered_len(&lines) > max_chars {
            lines.pop();
        }

        if rendered_len(&lines) > max_chars {
            let budget = max_chars.saturating_sub(header_chars + 1);
            if budget == 0 {
                return String::new();
            }
            let mut cut: String = lines[0].chars().take(budget - 1).collect();
            cut.push(ELLIPSIS);
            lines[0] = cut;
        }

        let mut out = String::from(header);
        for line in lines {
            out.push('\n');
            out.push_str(&line);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use reverie_llm::{Embedder, MockBackend, MockEmbedder};
    use reverie_memory::{
        Category, MemoryId, MemoryRecord, MemorySource, MemoryStore, UserId,
    };

    use crate::gateway::UnavailableProvider;

    fn make_retriever(config: RecallConfig) -> Retriever {
        let gateway = Arc::new(ExternalCalls::new(
            Arc::new(MockEmbedder::new(32)),
            Arc::new(MockBackend::new(vec![])),
        ));
        Retriever::new(gateway, config)
    }

    fn strict() -> RecallConfig {
        RecallConfig {
            min_score: 0.99,
            ..Default::default()
        }
    }

    fn hit(id: i64, content: &str, score: f32) -> ScoredMemory {
        ScoredMemory {
            record: MemoryRecord {
                id: MemoryId::from(id),
                content: content.to_string(),
                category: Category::User,
                timestamp: Utc::now(),
                source: MemorySource::Conversation,
            },
            score,
        }
    }

    #[tokio::test]
    async fn test_recall_indexes_lazily() {
        let retriever = make_retriever(strict());
        let store = MemoryStore::in_memory().user(&UserId::from(42_i64)).unwrap();
        store.append("Likes tea", Category::User, MemorySource::Conversation).unwrap();
        store.append("Exam on Friday", Category::User, MemorySource::Conversation).unwrap();
        assert_eq!(store.records_missing_vectors().unwrap().len(), 2);

        let hits = retriever.recall(&store, "Exam on Friday").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.content, "Exam on Friday");
        assert!(store.records_missing_vectors().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lazy_index_limit() {
        let config = RecallConfig {
            lazy_index_limit: 1,
            ..strict()
        };
        let retriever = make_retriever(config);
        let store = MemoryStore::in_memory().user(&UserId::from(1_i64)).unwrap();
        for text in ["one", "two", "three"] {
            store.append(text, Category::Fact, MemorySource::Conversation).unwrap();
        }
        assert_eq!(retriever.index_missing(&store, 1).await.unwrap(), 1);
        let missing = store.records_missing_vectors().unwrap();
        assert_eq!(missing.len(), 2);
        assert_eq!(missing[0].content, "two");
    }

    /// Counts batch requests on top of the mock embedder.
    struct CountingEmbedder {
        inner: MockEmbedder,
        batches: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, text: &str) -> reverie_llm::Result<Vec<f32>> {
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, texts: &[&str]) -> reverie_llm::Result<Vec<Vec<f32>>> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.inner.embed_batch(texts).await
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_index_missing_batches_requests() {
        let embedder = Arc::new(CountingEmbedder {
            inner: MockEmbedder::new(8),
            batches: AtomicUsize::new(0),
        });
        let gateway = Arc::new(ExternalCalls::new(
            embedder.clone(),
            Arc::new(MockBackend::new(vec![])),
        ));
        let retriever = Retriever::new(gateway, RecallConfig::default());
        let store = MemoryStore::in_memory().user(&UserId::from(11_i64)).unwrap();
        let total = INDEX_BATCH_SIZE * 2 + 3;
        for i in 0..total {
            store
                .append(&format!("fact {}", i), Category::Fact, MemorySource::Operator)
                .unwrap();
        }

        assert_eq!(retriever.index_missing(&store, usize::MAX).await.unwrap(), total);
        assert!(store.records_missing_vectors().unwrap().is_empty());
        assert_eq!(embedder.batches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_reminiscence_empty_store_initializes() {
        let retriever = make_retriever(strict());
        let store = MemoryStore::in_memory().user(&UserId::from(9_i64)).unwrap();
        assert_eq!(retriever.reminiscence(&store, "anything").await, "");
        assert!(store.exists().unwrap());
    }

    #[tokio::test]
    async fn test_reminiscence_without_embedder() {
        let gateway = Arc::new(ExternalCalls::new(
            UnavailableProvider::embedder("no key"),
            UnavailableProvider::backend("no key"),
        ));
        let retriever = Retriever::new(gateway, RecallConfig::default());
        let store = MemoryStore::in_memory().user(&UserId::from(2_i64)).unwrap();
        store.append("Likes tea", Category::User, MemorySource::Conversation).unwrap();
        assert_eq!(retriever.reminiscence(&store, "tea").await, "");
    }

    #[test]
    fn test_render_header_and_order() {
        let retriever = make_retriever(RecallConfig::default());
        let out = retriever.render(&[hit(2, "Struggles with calculus", 0.9), hit(1, "Exam on Friday", 0.5)]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "[Intuition] Relevant memories:");
        assert!(lines[1].starts_with("- ["));
        assert!(lines[1].ends_with("] Struggles with calculus"));
        assert!(lines[2].ends_with("] Exam on Friday"));
        assert_eq!(retriever.render(&[]), "");
    }

    #[test]
    fn test_render_drops_lowest_first() {
        let config = RecallConfig {
            header: "H".into(),
            max_chars: 60,
            ..Default::default()
        };
        let retriever = make_retriever(config);
        let out = retriever.render(&[
            hit(1, "first fact", 0.9),
            hit(2, "second fact", 0.8),
            hit(3, "third fact", 0.7),
        ]);
        assert!(out.chars().count() <= 60);
        assert!(out.contains("first fact"));
        assert!(!out.contains("third fact"));
    }

    #[test]
    fn test_render_truncates_single_line() {
        let config = RecallConfig {
            header: "H".into(),
            max_chars: 30,
            ..Default::default()
        };
        let retriever = make_retriever(config);
        let out = retriever.render(&[hit(1, &"x".repeat(200), 0.9)]);
        assert_eq!(out.chars().count(), 30);
        assert!(out.ends_with('…'));

        let tiny = make_retriever(RecallConfig {
            header: "Header".into(),
            max_chars: 7,
            ..Default::default()
        });
        assert_eq!(tiny.render(&[hit(1, "long content", 0.9)]), "");
    }
}

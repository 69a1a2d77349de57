//! The memory pipeline as one context object.
//!
//! [`MemoryService`] owns the store, the call gateway and every component,
//! and exposes the `(user, text)`-shaped operations the surrounding bot
//! calls. Nothing here is global; hosts build one service and share it.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use reverie_config::{
    EmbeddingConfig, EmbeddingProvider, LlmConfig, MemoryConfig, ReverieConfig, StorageKind,
    resolve_api_key,
};
use reverie_llm::{
    EmbedderSpec, Provider, ProviderChain, ProviderSpec, SharedBackend, SharedEmbedder,
    build_embedder,
};
use reverie_memory::{
    Category, ListOrder, MemoryRecord, MemorySource, MemoryStore, ScoredMemory, UserId,
    UserMemoryStore, UserProfile, UserStats, load_lore,
};

use crate::consolidator::{ConsolidationReport, ConsolidationTarget, Consolidator};
use crate::error::Result;
use crate::extraction::Extractor;
use crate::gateway::{ExternalCalls, UnavailableProvider};
use crate::profile::{ProfileOutcome, ProfileUpdater};
use crate::retriever::Retriever;
use crate::validator::{Validator, Verdict};

// ─────────────────────────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// Result of asking to remember something.
#[derive(Debug, Clone, PartialEq)]
pub enum AddMemoryOutcome {
    /// Stored. `indexed` is false when the vector will be built lazily.
    Saved {
        record: MemoryRecord,
        rewritten: bool,
        indexed: bool,
    },
    /// The validator refused it; nothing was written.
    Rejected { reason: String },
    /// Accepted but storage failed; nothing was written.
    NotSaved { reason: String },
}

impl AddMemoryOutcome {
    /// Whether a record was written.
    pub fn is_saved(&self) -> bool {
        matches!(self, AddMemoryOutcome::Saved { .. })
    }
}

impl fmt::Display for AddMemoryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddMemoryOutcome::Saved { record, .. } => write!(f, "saved: {}", record.content),
            AddMemoryOutcome::Rejected { reason } => write!(f, "rejected: {}", reason),
            AddMemoryOutcome::NotSaved { reason } => write!(f, "not saved: {}", reason),
        }
    }
}

/// What a reindex pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReindexReport {
    /// Vectors dropped because their record no longer exists.
    pub orphans_removed: usize,
    /// Records that gained a vector.
    pub indexed: usize,
    /// Records still without a vector (embedder unavailable).
    pub remaining: usize,
}

type InFlight = Arc<Mutex<HashSet<(UserId, ConsolidationTarget)>>>;

/// Clears an in-flight consolidation marker when the task ends, even on panic.
struct InFlightGuard {
    in_flight: InFlight,
    key: (UserId, ConsolidationTarget),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────────────────

/// Per-user long-term memory: write path, retrieval and maintenance.
pub struct MemoryService {
    store: Arc<MemoryStore>,
    gateway: Arc<ExternalCalls>,
    validator: Validator,
    retriever: Retriever,
    consolidator: Arc<Consolidator>,
    profiler: ProfileUpdater,
    extractor: Extractor,
    config: MemoryConfig,
    in_flight: InFlight,
    background: Mutex<JoinSet<ConsolidationReport>>,
}

impl fmt::Debug for MemoryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryService")
            .field("store", &self.store)
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

impl MemoryService {
    /// Assemble a service from its parts.
    pub fn new(store: Arc<MemoryStore>, gateway: Arc<ExternalCalls>, config: MemoryConfig) -> Self {
        let persona = config.validator.persona.clone();
        Self {
            validator: Validator::new(gateway.clone(), config.validator.clone()),
            retriever: Retriever::new(gateway.clone(), config.recall.clone()),
            consolidator: Arc::new(Consolidator::new(
                gateway.clone(),
                config.consolidation.clone(),
                persona.clone(),
            )),
            profiler: ProfileUpdater::new(gateway.clone(), config.profile.clone(), persona.clone()),
            extractor: Extractor::new(gateway.clone(), config.extraction.clone(), persona),
            store,
            gateway,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            background: Mutex::new(JoinSet::new()),
        }
    }

    /// Build everything from configuration.
    ///
    /// Missing API keys do not fail construction: the affected provider is
    /// replaced by a stand-in whose calls fail, which the pipeline already
    /// treats as "nothing learned" / "no context".
    pub fn from_config(config: &ReverieConfig) -> Result<Self> {
        config.validate()?;
        let memory = config.memory();

        let store = match memory.storage {
            StorageKind::Sqlite => MemoryStore::open_sqlite(memory.effective_path())?,
            StorageKind::Json => MemoryStore::open_json_dir(memory.effective_path())?,
            StorageKind::Memory => MemoryStore::in_memory(),
        };
        let store = match &memory.lore_path {
            Some(path) => {
                let lore = load_lore(path)?;
                info!(path = %path.display(), entries = lore.len(), "Loaded lore");
                store.with_lore(lore)
            }
            None => store,
        };

        let timeout = Duration::from_secs(memory.workers.call_timeout_secs);
        let gateway = ExternalCalls::new(
            configured_embedder(&config.embedding(), timeout),
            configured_completer(&config.llm(), timeout),
        )
        .with_max_concurrent(memory.workers.max_concurrent_calls)
        .with_timeout(timeout);
        info!(?gateway, storage = ?memory.storage, "Memory service configured");

        Ok(Self::new(Arc::new(store), Arc::new(gateway), memory))
    }

    /// The underlying store registry.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// The memory settings in use.
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    fn user_store(&self, user: &UserId) -> Result<UserMemoryStore> {
        Ok(self.store.user(user)?)
    }

    // ── write path ─────────────────────────────────────────────────────────

    /// Validate `content` and, if accepted, store it with its embedding.
    ///
    /// Never fails: storage problems come back as [`AddMemoryOutcome::NotSaved`].
    /// A write that pushes its scope past the ceiling schedules a background
    /// consolidation when `auto` is on.
    pub async fn process_add_memory(
        &self,
        user: &UserId,
        content: &str,
        category: Category,
        source: MemorySource,
    ) -> AddMemoryOutcome {
        // Lore seeding happens inside `commit`, so a rejected first write
        // leaves no archive behind.
        let store = match self.user_store(user) {
            Ok(store) => store,
            Err(e) => {
                error!(user = %user, error = %e, "Memory store unavailable");
                return AddMemoryOutcome::NotSaved {
                    reason: e.to_string(),
                };
            }
        };

        let (text, rewritten) = match self.validator.validate(content).await {
            Verdict::Accepted { text, rewritten } => (text, rewritten),
            Verdict::Rejected { reason } => {
                info!(user = %user, reason = %reason, "Memory rejected");
                return AddMemoryOutcome::Rejected { reason };
            }
        };

        let embedding = self.gateway.embed(&text).await;
        let indexed = embedding.is_some();
        let record = match store.commit(&text, category, source, embedding) {
            Ok(record) => record,
            Err(e) => {
                error!(user = %user, error = %e, "Failed to store memory");
                return AddMemoryOutcome::NotSaved {
                    reason: e.to_string(),
                };
            }
        };
        info!(user = %user, id = %record.id, category = %category, rewritten, indexed, "Memory saved");

        if self.config.consolidation.auto {
            let target = self.consolidator.target_for(category);
            match self.consolidator.needs_consolidation(&store, target) {
                Ok(true) => {
                    self.spawn_consolidation(user, target);
                }
                Ok(false) => {}
                Err(e) => warn!(user = %user, error = %e, "Could not check consolidation ceiling"),
            }
        }

        AddMemoryOutcome::Saved {
            record,
            rewritten,
            indexed,
        }
    }

    /// Extract candidates from one exchange and run each through
    /// [`Self::process_add_memory`].
    ///
    /// Refreshes the profile (subject to its cooldown) when a new user fact
    /// was saved.
    pub async fn learn_from_turn(
        &self,
        user: &UserId,
        user_text: &str,
        assistant_text: &str,
    ) -> Vec<AddMemoryOutcome> {
        let candidates = self.extractor.extract(user_text, assistant_text).await;
        let mut outcomes = Vec::with_capacity(candidates.len());
        let mut new_user_fact = false;
        for candidate in candidates {
            let outcome = self
                .process_add_memory(user, &candidate.content, candidate.category, MemorySource::Extraction)
                .await;
            new_user_fact |= outcome.is_saved() && candidate.category == Category::User;
            outcomes.push(outcome);
        }

        if new_user_fact && self.config.profile.enabled {
            match self.refresh_profile(user, false).await {
                Ok(outcome) => debug!(user = %user, ?outcome, "Profile check after turn"),
                Err(e) => warn!(user = %user, error = %e, "Profile check failed"),
            }
        }
        outcomes
    }

    // ── retrieval ──────────────────────────────────────────────────────────

    /// Reminiscence block for `query`, or `""`.
    pub async fn get_relevant_context(&self, user: &UserId, query: &str) -> String {
        match self.user_store(user) {
            Ok(store) => self.retriever.reminiscence(&store, query).await,
            Err(e) => {
                warn!(user = %user, error = %e, "Memory store unavailable for recall");
                String::new()
            }
        }
    }

    /// Scored records relevant to `query`.
    pub async fn recall(&self, user: &UserId, query: &str) -> Result<Vec<ScoredMemory>> {
        let store = self.user_store(user)?;
        self.retriever.recall(&store, query).await
    }

    // ── maintenance ────────────────────────────────────────────────────────

    /// Consolidate one category, or every scope over the ceiling.
    ///
    /// With `force`, scopes are compacted even under the ceiling as long as
    /// they hold more records than `max_insights`. A target that already has
    /// a pass running is reported as aborted.
    pub async fn consolidate(
        &self,
        user: &UserId,
        category: Option<Category>,
        force: bool,
    ) -> Result<Vec<(ConsolidationTarget, ConsolidationReport)>> {
        let store = self.user_store(user)?;
        let targets = match category {
            Some(category) => vec![self.consolidator.target_for(category)],
            None if force => {
                let mut targets: Vec<ConsolidationTarget> = Category::ALL
                    .iter()
                    .map(|c| self.consolidator.target_for(*c))
                    .collect();
                targets.dedup();
                targets
            }
            None => self.consolidator.targets_over_ceiling(&store)?,
        };

        let mut reports = Vec::with_capacity(targets.len());
        for target in targets {
            let Some(_guard) = self.claim(user, target) else {
                reports.push((
                    target,
                    ConsolidationReport::Aborted {
                        reason: "consolidation already running".to_string(),
                    },
                ));
                continue;
            };
            let report = if force {
                self.consolidator.force_consolidate(&store, target).await?
            } else {
                self.consolidator.consolidate(&store, target).await?
            };
            reports.push((target, report));
        }
        Ok(reports)
    }

    /// Mark a pass for `target` as running, unless one already is.
    fn claim(&self, user: &UserId, target: ConsolidationTarget) -> Option<InFlightGuard> {
        let key = (user.clone(), target);
        if !self.in_flight.lock().insert(key.clone()) {
            debug!(user = %user, target = %target, "Consolidation already running");
            return None;
        }
        Some(InFlightGuard {
            in_flight: self.in_flight.clone(),
            key,
        })
    }

    /// Run consolidation for `target` in the background.
    ///
    /// Returns `false` if a pass for the same user and target is already
    /// running, or the user id is invalid.
    pub fn spawn_consolidation(&self, user: &UserId, target: ConsolidationTarget) -> bool {
        let store = match self.user_store(user) {
            Ok(store) => store,
            Err(e) => {
                warn!(user = %user, error = %e, "Cannot schedule consolidation");
                return false;
            }
        };

        let Some(guard) = self.claim(user, target) else {
            return false;
        };
        let consolidator = self.consolidator.clone();

        info!(user = %user, target = %target, "Scheduling consolidation");
        let mut background = self.background.lock();
        while background.try_join_next().is_some() {}
        background.spawn(async move {
            let _guard = guard;
            match consolidator.consolidate(&store, target).await {
                Ok(report) => report,
                Err(e) => {
                    error!(user = %store.user_id(), target = %target, error = %e, "Background consolidation failed");
                    ConsolidationReport::Aborted {
                        reason: e.to_string(),
                    }
                }
            }
        });
        true
    }

    /// Wait for every background consolidation started so far.
    ///
    /// Short-lived hosts call this before exiting so scheduled passes are
    /// not cut off.
    pub async fn finish_background(&self) -> Vec<ConsolidationReport> {
        let mut pending = std::mem::take(&mut *self.background.lock());
        let mut reports = Vec::new();
        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!(error = %e, "Background consolidation task failed"),
            }
        }
        reports
    }

    /// Regenerate the user's profile if due (or unconditionally with `force`).
    pub async fn refresh_profile(&self, user: &UserId, force: bool) -> Result<ProfileOutcome> {
        if !self.config.profile.enabled && !force {
            return Ok(ProfileOutcome::NotDue {
                reason: "profile updates disabled".to_string(),
            });
        }
        let store = self.user_store(user)?;
        self.profiler.refresh(&store, force).await
    }

    /// The stored profile, if any.
    pub fn profile(&self, user: &UserId) -> Result<Option<UserProfile>> {
        Ok(self.user_store(user)?.profile()?)
    }

    /// Drop orphan vectors and embed every record that lacks one.
    pub async fn reindex(&self, user: &UserId) -> Result<ReindexReport> {
        let store = self.user_store(user)?;
        let orphans_removed = store.repair()?;
        let indexed = self.retriever.index_missing(&store, usize::MAX).await?;
        let remaining = store.records_missing_vectors()?.len();
        info!(user = %user, orphans_removed, indexed, remaining, "Reindex complete");
        Ok(ReindexReport {
            orphans_removed,
            indexed,
            remaining,
        })
    }

    /// Delete every record containing any of `keywords` (case-insensitive).
    ///
    /// Blank keywords are ignored; with none left nothing is deleted.
    pub fn purge_keywords(&self, user: &UserId, keywords: &[String]) -> Result<Vec<MemoryRecord>> {
        let needles: Vec<String> = keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if needles.is_empty() {
            return Ok(Vec::new());
        }

        let store = self.user_store(user)?;
        let removed = store.delete_matching(|record| {
            let content = record.content.to_lowercase();
            needles.iter().any(|needle| content.contains(needle))
        })?;
        info!(user = %user, removed = removed.len(), "Purged memories by keyword");
        Ok(removed)
    }

    /// Delete everything stored for the user.
    pub fn reset_user(&self, user: &UserId) -> Result<bool> {
        Ok(self.user_store(user)?.wipe()?)
    }

    /// Records, newest first.
    pub fn list(
        &self,
        user: &UserId,
        category: Option<Category>,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>> {
        Ok(self
            .user_store(user)?
            .list(category, limit, ListOrder::NewestFirst)?)
    }

    /// Counts for one user.
    pub fn stats(&self, user: &UserId) -> Result<UserStats> {
        Ok(self.user_store(user)?.stats()?)
    }

    /// Counts for every user with an archive.
    pub fn all_stats(&self) -> Result<Vec<UserStats>> {
        self.store
            .users()?
            .iter()
            .map(|user| self.stats(user))
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider wiring
// ─────────────────────────────────────────────────────────────────────────────

fn configured_embedder(config: &EmbeddingConfig, timeout: Duration) -> SharedEmbedder {
    let provider = match config.provider {
        EmbeddingProvider::Openrouter => "openrouter",
        EmbeddingProvider::Openai => "openai",
        EmbeddingProvider::Mock => "mock",
    };
    let spec = EmbedderSpec {
        provider: provider.to_string(),
        api_key: resolve_api_key(config.provider.env_var(), config.api_key.as_deref())
            .map(|secret| secret.value),
        model: Some(config.effective_model()),
        base_url: config.effective_base_url(),
        dimensions: config.dimensions,
        max_input_chars: Some(config.max_input_chars),
        timeout: Some(timeout),
    };

    match build_embedder(&spec) {
        Ok(embedder) => embedder,
        Err(e) => {
            warn!(provider, error = %e, "Embedder unavailable, recall and indexing are disabled");
            UnavailableProvider::embedder(e.to_string())
        }
    }
}

fn configured_completer(config: &LlmConfig, timeout: Duration) -> SharedBackend {
    let specs: Vec<ProviderSpec> = config
        .providers
        .iter()
        .map(|entry| {
            let provider = match entry.backend {
                reverie_config::Backend::Openrouter => Provider::OpenRouter,
                reverie_config::Backend::Deepseek => Provider::DeepSeek,
                reverie_config::Backend::Openai => Provider::OpenAi,
                reverie_config::Backend::Groq => Provider::Groq,
                reverie_config::Backend::Ollama => Provider::Ollama,
            };
            let mut spec = ProviderSpec::new(provider);
            spec.max_retries = entry.max_retries;
            if let Some(ref model) = entry.model {
                spec = spec.with_model(model);
            }
            if let Some(ref base_url) = entry.base_url {
                spec = spec.with_base_url(base_url);
            }
            if let Some(secret) =
                resolve_api_key(Some(entry.backend.env_var()), entry.api_key.as_deref())
            {
                spec = spec.with_api_key(secret.value);
            }
            spec
        })
        .collect();

    match ProviderChain::from_specs(&specs, timeout) {
        Ok(chain) => {
            info!(providers = ?chain.names(), "Completion providers ready");
            Arc::new(chain)
        }
        Err(e) => {
            warn!(error = %e, "No completion provider available, new memories will be rejected");
            UnavailableProvider::backend(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverie_config::ConsolidationConfig;
    use reverie_llm::{MockBackend, MockEmbedder};

    fn insights(n: usize) -> String {
        let items: Vec<String> = (0..n).map(|i| format!("\"Insight {}\"", i)).collect();
        format!("{{\"compressed\": [{}]}}", items.join(", "))
    }

    fn service_with(backend: MockBackend, config: MemoryConfig) -> (MemoryService, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        let gateway = Arc::new(ExternalCalls::new(
            Arc::new(MockEmbedder::new(16)),
            backend.clone(),
        ));
        (
            MemoryService::new(Arc::new(MemoryStore::in_memory()), gateway, config),
            backend,
        )
    }

    fn manual_config() -> MemoryConfig {
        MemoryConfig {
            consolidation: ConsolidationConfig {
                auto: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_add_memory_saved_and_indexed() {
        let (service, _) = service_with(MockBackend::with_text("The user likes tea."), manual_config());
        let user = UserId::from(42_i64);

        let outcome = service
            .process_add_memory(&user, "user likes tea", Category::User, MemorySource::Conversation)
            .await;
        assert_eq!(outcome.to_string(), "saved: The user likes tea.");
        assert!(matches!(
            outcome,
            AddMemoryOutcome::Saved { rewritten: true, indexed: true, .. }
        ));

        let stats = service.stats(&user).unwrap();
        assert_eq!(stats.records, 1);
        assert_eq!(stats.vectors, 1);
    }

    #[tokio::test]
    async fn test_rejection_writes_nothing() {
        let (service, _) = service_with(MockBackend::with_text("REJECTED: trivia"), manual_config());
        let user = UserId::from(42_i64);

        let outcome = service
            .process_add_memory(&user, "said hi", Category::User, MemorySource::Conversation)
            .await;
        assert_eq!(outcome.to_string(), "rejected: trivia");

        let stats = service.stats(&user).unwrap();
        assert_eq!(stats.records, 0);
        assert_eq!(stats.vectors, 0);
    }

    #[tokio::test]
    async fn test_rejected_first_write_leaves_no_archive() {
        let store = MemoryStore::in_memory().with_lore(vec![reverie_memory::LoreEntry::new(
            "The study group meets on Tuesdays",
            Category::Group,
        )]);
        let gateway = ExternalCalls::new(
            Arc::new(MockEmbedder::new(16)),
            Arc::new(MockBackend::with_text("REJECTED: trivia")),
        );
        let service = MemoryService::new(Arc::new(store), Arc::new(gateway), manual_config());
        let user = UserId::from(43_i64);

        let outcome = service
            .process_add_memory(&user, "said hi", Category::User, MemorySource::Conversation)
            .await;
        assert!(matches!(outcome, AddMemoryOutcome::Rejected { .. }));
        assert!(!service.stats(&user).unwrap().initialized);
        assert!(service.store().users().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_user_not_saved() {
        let (service, backend) = service_with(MockBackend::with_text("ok"), manual_config());
        let outcome = service
            .process_add_memory(&UserId::from(""), "likes tea", Category::User, MemorySource::Conversation)
            .await;
        assert!(matches!(outcome, AddMemoryOutcome::NotSaved { .. }));
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_auto_consolidation_after_ceiling() {
        let config = MemoryConfig {
            consolidation: ConsolidationConfig {
                ceiling: 3,
                min_insights: 1,
                max_insights: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let validator_replies = (0..4).map(|i| format!("Fact number {}", i));
        let (service, _) = service_with(
            MockBackend::with_texts(validator_replies.chain([insights(2)])),
            config,
        );
        let user = UserId::from(5_i64);

        for i in 0..4 {
            let outcome = service
                .process_add_memory(&user, &format!("fact {}", i), Category::Fact, MemorySource::Conversation)
                .await;
            assert!(outcome.is_saved());
        }
        // The write that crossed the ceiling already scheduled a pass.
        assert!(!service.spawn_consolidation(&user, ConsolidationTarget::Category(Category::Fact)));

        let reports = service.finish_background().await;
        assert_eq!(
            reports,
            vec![ConsolidationReport::Compacted {
                removed: 4,
                inserted: 2
            }]
        );
        let records = service.list(&user, Some(Category::Fact), None).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.source == MemorySource::Consolidation));

        // The marker is cleared once the pass ends.
        assert!(service.spawn_consolidation(&user, ConsolidationTarget::Category(Category::Fact)));
        assert_eq!(
            service.finish_background().await,
            vec![ConsolidationReport::Skipped { records: 2 }]
        );
    }

    #[tokio::test]
    async fn test_manual_consolidate_reports() {
        let config = MemoryConfig {
            validator: reverie_config::ValidatorConfig {
                enabled: false,
                ..Default::default()
            },
            consolidation: ConsolidationConfig {
                ceiling: 3,
                min_insights: 1,
                max_insights: 2,
                auto: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let (service, _) = service_with(MockBackend::with_text(insights(2)), config);
        let user = UserId::from(6_i64);
        for i in 0..5 {
            service
                .process_add_memory(&user, &format!("note {}", i), Category::Event, MemorySource::Operator)
                .await;
        }
        service
            .process_add_memory(&user, "likes tea", Category::User, MemorySource::Operator)
            .await;

        let reports = service.consolidate(&user, None, false).await.unwrap();
        assert_eq!(
            reports,
            vec![(
                ConsolidationTarget::Category(Category::Event),
                ConsolidationReport::Compacted {
                    removed: 5,
                    inserted: 2
                }
            )]
        );
        assert_eq!(service.list(&user, Some(Category::User), None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_purge_and_reset() {
        let config = MemoryConfig {
            validator: reverie_config::ValidatorConfig {
                enabled: false,
                ..Default::default()
            },
            ..manual_config()
        };
        let (service, _) = service_with(MockBackend::new(vec![]), config);
        let user = UserId::from("alice");
        for text in ["Likes Tea", "Hates coffee", "Exam on Friday"] {
            service
                .process_add_memory(&user, text, Category::User, MemorySource::Operator)
                .await;
        }

        assert!(service.purge_keywords(&user, &["  ".to_string()]).unwrap().is_empty());
        let removed = service
            .purge_keywords(&user, &["tea".to_string(), "COFFEE".to_string()])
            .unwrap();
        assert_eq!(removed.len(), 2);
        let left = service.list(&user, None, None).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].content, "Exam on Friday");

        assert!(service.reset_user(&user).unwrap());
        assert_eq!(service.stats(&user).unwrap().records, 0);
        assert!(service.all_stats().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reindex_fills_missing_vectors() {
        let (service, _) = service_with(MockBackend::new(vec![]), manual_config());
        let user = UserId::from(8_i64);
        let store = service.store().user(&user).unwrap();
        store.append("Likes tea", Category::User, MemorySource::Lore).unwrap();
        store.append("Exam on Friday", Category::Event, MemorySource::Lore).unwrap();

        let report = service.reindex(&user).await.unwrap();
        assert_eq!(
            report,
            ReindexReport {
                orphans_removed: 0,
                indexed: 2,
                remaining: 0
            }
        );
    }

    #[tokio::test]
    async fn test_learn_from_turn() {
        let config = MemoryConfig {
            profile: reverie_config::ProfileConfig {
                enabled: false,
                ..Default::default()
            },
            ..manual_config()
        };
        let (service, backend) = service_with(
            MockBackend::with_texts([
                r#"{"user_facts": ["Studies physics"], "reflections": ["I enjoyed the chat"]}"#,
                "The user studies physics.",
                "REJECTED: trivia",
            ]),
            config,
        );
        let user = UserId::from(9_i64);

        let outcomes = service
            .learn_from_turn(&user, "I study physics", "Nice!")
            .await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_saved());
        assert!(!outcomes[1].is_saved());
        assert_eq!(backend.request_count(), 3);

        let records = service.list(&user, None, None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, MemorySource::Extraction);
    }

    #[tokio::test]
    async fn test_from_config_in_memory_without_keys() {
        let toml = r#"
[embedding]
provider = "mock"
dimensions = 8

[memory]
storage = "memory"

[[llm.providers]]
backend = "ollama"
model = "llama3"
"#;
        let config = ReverieConfig::from_toml(toml).unwrap();
        let service = MemoryService::from_config(&config).unwrap();
        assert_eq!(service.gateway.embedder_name(), "mock");
        assert_eq!(
            service
                .get_relevant_context(&UserId::from(1_i64), "anything")
                .await,
            ""
        );
    }

    #[tokio::test]
    async fn test_from_config_sqlite_with_lore() {
        let dir = tempfile::tempdir().unwrap();
        let lore = dir.path().join("lore.json");
        std::fs::write(
            &lore,
            r#"[{"content": "The study group meets on Tuesdays", "category": "Group"}]"#,
        )
        .unwrap();
        let toml = format!(
            r#"
[embedding]
provider = "mock"
dimensions = 8

[memory]
storage = "sqlite"
path = '{}'
lore_path = '{}'

[memory.validator]
enabled = false
"#,
            dir.path().join("memory.db").display(),
            lore.display()
        );
        let config = ReverieConfig::from_toml(&toml).unwrap();
        let user = UserId::from(5_i64);

        {
            let service = MemoryService::from_config(&config).unwrap();
            let outcome = service
                .process_add_memory(&user, "Likes tea", Category::User, MemorySource::Operator)
                .await;
            assert!(outcome.is_saved());
        }

        let reopened = MemoryService::from_config(&config).unwrap();
        let records = reopened.list(&user, None, None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].content, "Likes tea");
        assert_eq!(records[1].source, MemorySource::Lore);
    }
}

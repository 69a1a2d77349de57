//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [[llm.providers]]          # ordered completion providers
//! [embedding]                # embedding endpoint
//! [memory]                   # storage backend and location
//! [memory.recall]            # reminiscence thresholds
//! [memory.validator]         # write-path policy
//! [memory.consolidation]     # compaction ceiling and target range
//! [memory.profile]           # profile refresh cadence
//! [memory.workers]           # external call concurrency and timeout
//! [logging]                  # log directory and level
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Application name used for platform directories.
pub const APP_NAME: &str = "reverie";

/// Longest accepted profile cooldown (ten years).
pub const MAX_PROFILE_COOLDOWN_HOURS: u64 = 24 * 365 * 10;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged. Use the accessor methods to read a
/// section with defaults filled in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverieConfig {
    /// Completion provider list.
    pub llm: Option<LlmConfig>,

    /// Embedding provider configuration.
    pub embedding: Option<EmbeddingConfig>,

    /// Memory subsystem configuration.
    pub memory: Option<MemoryConfig>,

    /// Logging configuration.
    pub logging: Option<LoggingConfig>,
}

impl ReverieConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Merging is per section: a section present in `other` replaces ours.
    pub fn merge(&mut self, other: ReverieConfig) {
        if other.llm.is_some() {
            self.llm = other.llm;
        }
        if other.embedding.is_some() {
            self.embedding = other.embedding;
        }
        if other.memory.is_some() {
            self.memory = other.memory;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// The `[llm]` section, or defaults.
    pub fn llm(&self) -> LlmConfig {
        self.llm.clone().unwrap_or_default()
    }

    /// The `[embedding]` section, or defaults.
    pub fn embedding(&self) -> EmbeddingConfig {
        self.embedding.clone().unwrap_or_default()
    }

    /// The `[memory]` section, or defaults.
    pub fn memory(&self) -> MemoryConfig {
        self.memory.clone().unwrap_or_default()
    }

    /// The `[logging]` section, or defaults.
    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let memory = self.memory();
        memory.recall.validate()?;
        memory.consolidation.validate()?;
        if memory.workers.max_concurrent_calls == 0 {
            return Err(invalid(
                "memory.workers.max_concurrent_calls",
                "must be at least 1",
            ));
        }
        if memory.workers.call_timeout_secs == 0 {
            return Err(invalid("memory.workers.call_timeout_secs", "must be at least 1"));
        }
        if memory.profile.cooldown_hours > MAX_PROFILE_COOLDOWN_HOURS {
            return Err(invalid(
                "memory.profile.cooldown_hours",
                format!("must be at most {}", MAX_PROFILE_COOLDOWN_HOURS),
            ));
        }
        if self.embedding().max_input_chars == 0 {
            return Err(invalid("embedding.max_input_chars", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Default data directory: `<platform data dir>/reverie`.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Completion providers, tried in order.
///
/// ```toml
/// [[llm.providers]]
/// backend = "openrouter"
/// model = "xiaomi/mimo-v2-flash:free"
///
/// [[llm.providers]]
/// backend = "deepseek"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ordered provider list. Later entries are fallbacks.
    pub providers: Vec<ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: vec![
                ProviderConfig::new(Backend::Openrouter).with_model("xiaomi/mimo-v2-flash:free"),
                ProviderConfig::new(Backend::Deepseek).with_model("deepseek-chat"),
            ],
        }
    }
}

/// One completion provider entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Backend provider.
    pub backend: Backend,
    /// Model identifier. Defaults to the backend's preset.
    #[serde(default)]
    pub model: Option<String>,
    /// Custom API base URL (for proxies, custom endpoints).
    #[serde(default)]
    pub base_url: Option<String>,
    /// API key (prefer an env var; warns if set here).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Retry attempts for transient errors before falling through.
    #[serde(default)]
    pub max_retries: u32,
}

impl ProviderConfig {
    /// An entry using the backend's preset model.
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
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

    /// Returns true if an API key is stored directly in the config file.
    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Supported completion backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Openrouter,
    Deepseek,
    Openai,
    Groq,
    Ollama,
}

impl Backend {
    /// Environment variable name for this backend's API key.
    pub fn env_var(&self) -> &'static str {
        match self {
            Backend::Openrouter => "OPENROUTER_API_KEY",
            Backend::Deepseek => "DEEPSEEK_API_KEY",
            Backend::Openai => "OPENAI_API_KEY",
            Backend::Groq => "GROQ_API_KEY",
            Backend::Ollama => "OLLAMA_API_KEY",
        }
    }

    /// Lowercase identifier, as written in config.
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Openrouter => "openrouter",
            Backend::Deepseek => "deepseek",
            Backend::Openai => "openai",
            Backend::Groq => "groq",
            Backend::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Embedding provider configuration.
///
/// ```toml
/// [embedding]
/// provider = "openrouter"   # "openrouter", "openai", or "mock"
/// model = "openai/text-embedding-3-small"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider: "openrouter", "openai", or "mock".
    pub provider: EmbeddingProvider,
    /// Model name. Default depends on provider.
    pub model: Option<String>,
    /// Custom base URL (for proxies).
    pub base_url: Option<String>,
    /// API key (prefer an env var).
    pub api_key: Option<String>,
    /// Requested output dimensions.
    pub dimensions: Option<usize>,
    /// Input is truncated to this many characters before embedding.
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Openrouter,
            model: None,
            base_url: None,
            api_key: None,
            dimensions: None,
            max_input_chars: 8_000,
        }
    }
}

impl EmbeddingConfig {
    /// Effective model for the configured provider.
    pub fn effective_model(&self) -> String {
        if let Some(ref model) = self.model {
            return model.clone();
        }
        match self.provider {
            EmbeddingProvider::Openrouter => "openai/text-embedding-3-small".to_string(),
            EmbeddingProvider::Openai => "text-embedding-3-small".to_string(),
            EmbeddingProvider::Mock => "mock".to_string(),
        }
    }

    /// Effective base URL for the configured provider.
    pub fn effective_base_url(&self) -> Option<String> {
        if self.base_url.is_some() {
            return self.base_url.clone();
        }
        match self.provider {
            EmbeddingProvider::Openrouter => Some("https://openrouter.ai/api/v1".to_string()),
            EmbeddingProvider::Openai => Some("https://api.openai.com/v1".to_string()),
            EmbeddingProvider::Mock => None,
        }
    }
}

/// Supported embedding providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// OpenRouter's proxy to OpenAI embedding models (default).
    Openrouter,
    /// OpenAI embeddings API.
    Openai,
    /// Mock embedder for testing.
    Mock,
}

impl EmbeddingProvider {
    /// Environment variable holding the key, if the provider needs one.
    pub fn env_var(&self) -> Option<&'static str> {
        match self {
            EmbeddingProvider::Openrouter => Some("OPENROUTER_API_KEY"),
            EmbeddingProvider::Openai => Some("OPENAI_API_KEY"),
            EmbeddingProvider::Mock => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Memory subsystem configuration.
///
/// ```toml
/// [memory]
/// storage = "sqlite"
/// path = "/var/lib/reverie/memory.db"
///
/// [memory.recall]
/// top_k = 3
/// min_score = 0.25
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Document store backend.
    pub storage: StorageKind,
    /// SQLite file or JSON root directory. Defaults under the data directory.
    pub path: Option<PathBuf>,
    /// JSON file of records seeded into every new user's archive.
    pub lore_path: Option<PathBuf>,
    /// Reminiscence retrieval settings.
    pub recall: RecallConfig,
    /// Write-path validator settings.
    pub validator: ValidatorConfig,
    /// Consolidation thresholds.
    pub consolidation: ConsolidationConfig,
    /// Profile refresh settings.
    pub profile: ProfileConfig,
    /// Turn extraction settings.
    pub extraction: ExtractionConfig,
    /// External call limits.
    pub workers: WorkerConfig,
}

impl MemoryConfig {
    /// Storage location with the default filled in for the backend.
    pub fn effective_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            let base = default_data_dir();
            match self.storage {
                StorageKind::Sqlite => base.join("memory.db"),
                StorageKind::Json | StorageKind::Memory => base.join("memory"),
            }
        })
    }
}

/// Document store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Single SQLite file (default).
    #[default]
    Sqlite,
    /// One JSON file per document under a directory.
    Json,
    /// Process-local, lost on exit.
    Memory,
}

/// Reminiscence retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    /// Maximum snippets returned.
    pub top_k: usize,
    /// Minimum cosine similarity a snippet must reach.
    pub min_score: f32,
    /// Character cap on the rendered block.
    pub max_chars: usize,
    /// First line of the rendered block.
    pub header: String,
    /// Records embedded on demand per query when vectors are missing.
    pub lazy_index_limit: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_score: 0.25,
            max_chars: 1_500,
            header: "[Intuition] Relevant memories:".to_string(),
            lazy_index_limit: 32,
        }
    }
}

impl RecallConfig {
    fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(invalid("memory.recall.top_k", "must be at least 1"));
        }
        if !(-1.0..=1.0).contains(&self.min_score) {
            return Err(invalid("memory.recall.min_score", "must be within [-1, 1]"));
        }
        if self.max_chars <= self.header.chars().count() {
            return Err(invalid(
                "memory.recall.max_chars",
                "must leave room for at least one line after the header",
            ));
        }
        Ok(())
    }
}

/// A named policy rule rendered into the validator instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Short identifier, e.g. `no-trivia`.
    pub name: String,
    /// Instruction text shown to the model.
    pub instruction: String,
}

impl PolicyRule {
    /// Create a rule.
    pub fn new(name: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instruction: instruction.into(),
        }
    }
}

/// Write-path validator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// When false, candidates are only checked locally.
    pub enabled: bool,
    /// Name of the assistant persona whose memory is being guarded.
    pub persona: String,
    /// Token cap for the validator reply.
    pub max_tokens: u32,
    /// Rejection rules.
    pub rules: Vec<PolicyRule>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            persona: "the assistant".to_string(),
            max_tokens: 150,
            rules: vec![
                PolicyRule::new("no-toxicity", "Reject hate speech or harmful content."),
                PolicyRule::new(
                    "no-trivia",
                    "Reject greetings, small talk and other meaningless chatter.",
                ),
                PolicyRule::new(
                    "no-defensiveness",
                    "Reject self-protective or paranoid notes such as \
                     \"the user was mean, I must be careful\". The persona is resilient.",
                ),
            ],
        }
    }
}

/// Whether compaction groups records per category or across the whole user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsolidationScope {
    /// Each category is compacted on its own (default).
    #[default]
    Category,
    /// All of a user's records are compacted together.
    User,
}

/// Consolidation thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Compact once a scope holds more than this many records.
    pub ceiling: usize,
    /// Abort unless at least this many insights come back.
    pub min_insights: usize,
    /// Keep at most this many insights.
    pub max_insights: usize,
    /// Grouping used for the ceiling check.
    pub scope: ConsolidationScope,
    /// Schedule compaction in the background after writes.
    pub auto: bool,
    /// Token cap for the summarisation reply.
    pub max_tokens: u32,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            ceiling: 16,
            min_insights: 8,
            max_insights: 10,
            scope: ConsolidationScope::Category,
            auto: true,
            max_tokens: 1_500,
        }
    }
}

impl ConsolidationConfig {
    fn validate(&self) -> Result<()> {
        if self.min_insights == 0 {
            return Err(invalid("memory.consolidation.min_insights", "must be at least 1"));
        }
        if self.min_insights > self.max_insights {
            return Err(invalid(
                "memory.consolidation.min_insights",
                "must not exceed max_insights",
            ));
        }
        if self.max_insights >= self.ceiling {
            return Err(invalid(
                "memory.consolidation.max_insights",
                "must be below the ceiling, or compaction never shrinks the archive",
            ));
        }
        Ok(())
    }
}

/// Profile refresh settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Refresh profiles after extraction.
    pub enabled: bool,
    /// Minimum hours between refreshes.
    pub cooldown_hours: u64,
    /// Refresh only when the user has more than this many `User` records.
    pub min_records: usize,
    /// Newest `User` records fed into the profile prompt.
    pub max_records: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_hours: 24,
            min_records: 3,
            max_records: 40,
        }
    }
}

/// Turn extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Extract memories from conversation turns.
    pub enabled: bool,
    /// Candidates considered per turn.
    pub max_candidates: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_candidates: 6,
        }
    }
}

/// External call limits shared by the embedder and completion providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Concurrent external calls across all users.
    pub max_concurrent_calls: usize,
    /// Deadline for a single external call, in seconds.
    pub call_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 4,
            call_timeout_secs: 15,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Write daily JSON log files.
    pub file: bool,
    /// Directory for log files. Defaults to `<data dir>/logs`.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: true,
            dir: None,
        }
    }
}

impl LoggingConfig {
    /// Log directory with the default filled in.
    pub fn effective_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| default_data_dir().join("logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReverieConfig::new();
        let memory = config.memory();
        assert_eq!(memory.recall.top_k, 3);
        assert_eq!(memory.recall.min_score, 0.25);
        assert_eq!(memory.recall.max_chars, 1_500);
        assert_eq!(memory.consolidation.ceiling, 16);
        assert_eq!(memory.consolidation.min_insights, 8);
        assert_eq!(memory.consolidation.max_insights, 10);
        assert_eq!(memory.profile.cooldown_hours, 24);
        assert_eq!(memory.workers.max_concurrent_calls, 4);
        assert_eq!(memory.workers.call_timeout_secs, 15);
        assert_eq!(memory.validator.rules.len(), 3);
        assert_eq!(config.embedding().max_input_chars, 8_000);
        assert_eq!(config.llm().providers[0].backend, Backend::Openrouter);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full() {
        let config = ReverieConfig::from_toml(
            r#"
[[llm.providers]]
backend = "deepseek"

[[llm.providers]]
backend = "ollama"
model = "llama3.2"
base_url = "http://gpu-box:11434/v1"

[embedding]
provider = "mock"
dimensions = 16

[memory]
storage = "json"
path = "/tmp/reverie"

[memory.recall]
top_k = 5
min_score = 0.4

[memory.consolidation]
ceiling = 30
scope = "user"

[memory.validator]
persona = "Juniper"
rules = [{ name = "no-trivia", instruction = "No small talk." }]
"#,
        )
        .unwrap();

        let llm = config.llm();
        assert_eq!(llm.providers.len(), 2);
        assert_eq!(llm.providers[0].backend, Backend::Deepseek);
        assert!(llm.providers[0].model.is_none());
        assert_eq!(
            llm.providers[1].base_url.as_deref(),
            Some("http://gpu-box:11434/v1")
        );

        let embedding = config.embedding();
        assert_eq!(embedding.provider, EmbeddingProvider::Mock);
        assert_eq!(embedding.dimensions, Some(16));

        let memory = config.memory();
        assert_eq!(memory.storage, StorageKind::Json);
        assert_eq!(memory.effective_path(), PathBuf::from("/tmp/reverie"));
        assert_eq!(memory.recall.top_k, 5);
        assert_eq!(memory.recall.max_chars, 1_500);
        assert_eq!(memory.consolidation.ceiling, 30);
        assert_eq!(memory.consolidation.scope, ConsolidationScope::User);
        assert_eq!(memory.consolidation.min_insights, 8);
        assert_eq!(memory.validator.persona, "Juniper");
        assert_eq!(memory.validator.rules.len(), 1);
        assert!(memory.validator.enabled);
    }

    #[test]
    fn test_merge_replaces_sections() {
        let mut base = ReverieConfig::from_toml(
            r#"
[embedding]
provider = "openai"

[memory.recall]
top_k = 7
"#,
        )
        .unwrap();
        let overlay = ReverieConfig::from_toml(
            r#"
[memory]
storage = "memory"
"#,
        )
        .unwrap();

        base.merge(overlay);
        assert_eq!(base.embedding().provider, EmbeddingProvider::Openai);
        assert_eq!(base.memory().storage, StorageKind::Memory);
        assert_eq!(base.memory().recall.top_k, 3);
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let config = ReverieConfig::from_toml(
            r#"
[memory.consolidation]
min_insights = 12
max_insights = 10
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        let config = ReverieConfig::from_toml(
            r#"
[memory.consolidation]
ceiling = 10
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config = ReverieConfig::from_toml(
            r#"
[memory.workers]
max_concurrent_calls = 0
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_profile_cooldown() {
        let config = ReverieConfig::from_toml(
            r#"
[memory.profile]
cooldown_hours = 10000000000000000
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "memory.profile.cooldown_hours"
        ));

        let config = ReverieConfig::from_toml("[memory.profile]\ncooldown_hours = 72\n").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_embedding_effective_values() {
        let mut embedding = EmbeddingConfig::default();
        assert_eq!(embedding.effective_model(), "openai/text-embedding-3-small");
        assert_eq!(
            embedding.effective_base_url().as_deref(),
            Some("https://openrouter.ai/api/v1")
        );
        embedding.provider = EmbeddingProvider::Openai;
        assert_eq!(embedding.effective_model(), "text-embedding-3-small");
        assert_eq!(embedding.provider.env_var(), Some("OPENAI_API_KEY"));
    }

    #[test]
    fn test_roundtrip_toml() {
        let mut config = ReverieConfig::new();
        config.memory = Some(MemoryConfig::default());
        config.llm = Some(LlmConfig::default());
        let text = config.to_toml().unwrap();
        let parsed = ReverieConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.llm().providers.len(), 2);
        assert_eq!(parsed.memory().recall.header, config.memory().recall.header);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = ReverieConfig::from_toml(
            r#"
[[llm.providers]]
backend = "anthropic"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}

//! Archive compaction.
//!
//! When a scope (one category, or the whole user) grows past the ceiling,
//! its records are summarised into a small set of dense insights that
//! replace them. The sequence is:
//!
//! 1. Snapshot the scope's records (no lock held afterwards)
//! 2. Ask the model for `{"compressed": [...]}`
//! 3. Clean the list and check it actually shrinks the scope
//! 4. Embed the insights, best effort
//! 5. Swap the snapshotted ids for the insights in one locked step
//!
//! Records appended between steps 1 and 5 are not in the snapshot and
//! survive untouched. If any snapshotted record disappeared meanwhile, step 5
//! aborts without writing. Any failure leaves the archive as it was.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use reverie_config::{ConsolidationConfig, ConsolidationScope};
use reverie_llm::{CompletionRequest, Message};
use reverie_memory::validation::validate_memory_content;
use reverie_memory::{
    Category, ListOrder, MemoryError, MemoryId, MemoryRecord, MemorySource, NewMemory,
    UserMemoryStore,
};
use serde::Deserialize;

use crate::error::Result;
use crate::gateway::ExternalCalls;
use crate::parse::{clean_items, parse_json_reply};

/// Which records a compaction pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsolidationTarget {
    /// Records of one category; insights keep that category.
    Category(Category),
    /// Every record of the user; insights are filed as facts.
    All,
}

impl ConsolidationTarget {
    fn filter(&self) -> Option<Category> {
        match self {
            ConsolidationTarget::Category(category) => Some(*category),
            ConsolidationTarget::All => None,
        }
    }

    fn insight_category(&self) -> Category {
        match self {
            ConsolidationTarget::Category(category) => *category,
            ConsolidationTarget::All => Category::Fact,
        }
    }
}

impl fmt::Display for ConsolidationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsolidationTarget::Category(category) => write!(f, "{}", category),
            ConsolidationTarget::All => f.write_str("all"),
        }
    }
}

/// What a compaction pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsolidationReport {
    /// The scope was at or under the ceiling.
    Skipped { records: usize },
    /// Nothing was changed.
    Aborted { reason: String },
    /// `removed` records were replaced by `inserted` insights.
    Compacted { removed: usize, inserted: usize },
}

impl fmt::Display for ConsolidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsolidationReport::Skipped { records } => {
                write!(f, "skipped ({} records, under ceiling)", records)
            }
            ConsolidationReport::Aborted { reason } => write!(f, "aborted: {}", reason),
            ConsolidationReport::Compacted { removed, inserted } => {
                write!(f, "compacted {} records into {}", removed, inserted)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompressedReply {
    compressed: Vec<String>,
}

/// Summarises oversized scopes into insights.
pub struct Consolidator {
    gateway: Arc<ExternalCalls>,
    config: ConsolidationConfig,
    persona: String,
}

impl Consolidator {
    /// Create a consolidator.
    pub fn new(
        gateway: Arc<ExternalCalls>,
        config: ConsolidationConfig,
        persona: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            config,
            persona: persona.into(),
        }
    }

    /// The thresholds in use.
    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    /// The target a record of `category` belongs to under the configured scope.
    pub fn target_for(&self, category: Category) -> ConsolidationTarget {
        match self.config.scope {
            ConsolidationScope::Category => ConsolidationTarget::Category(category),
            ConsolidationScope::User => ConsolidationTarget::All,
        }
    }

    /// Whether `target` holds more records than the ceiling.
    pub fn needs_consolidation(
        &self,
        store: &UserMemoryStore,
        target: ConsolidationTarget,
    ) -> Result<bool> {
        Ok(store.count(target.filter())? > self.config.ceiling)
    }

    /// Every target over the ceiling for this user.
    pub fn targets_over_ceiling(&self, store: &UserMemoryStore) -> Result<Vec<ConsolidationTarget>> {
        let candidates: Vec<ConsolidationTarget> = match self.config.scope {
            ConsolidationScope::User => vec![ConsolidationTarget::All],
            ConsolidationScope::Category => Category::ALL
                .iter()
                .map(|c| ConsolidationTarget::Category(*c))
                .collect(),
        };
        let mut over = Vec::new();
        for target in candidates {
            if self.needs_consolidation(store, target)? {
                over.push(target);
            }
        }
        Ok(over)
    }

    /// Compact `target` if it is over the ceiling.
    pub async fn consolidate(
        &self,
        store: &UserMemoryStore,
        target: ConsolidationTarget,
    ) -> Result<ConsolidationReport> {
        self.run(store, target, false).await
    }

    /// Compact `target` regardless of the ceiling.
    ///
    /// The scope must still hold more records than `max_insights`, or the
    /// pass would not shrink it.
    pub async fn force_consolidate(
        &self,
        store: &UserMemoryStore,
        target: ConsolidationTarget,
    ) -> Result<ConsolidationReport> {
        self.run(store, target, true).await
    }

    async fn run(
        &self,
        store: &UserMemoryStore,
        target: ConsolidationTarget,
        force: bool,
    ) -> Result<ConsolidationReport> {
        let snapshot = store.list(target.filter(), None, ListOrder::ArchiveOrder)?;
        let floor = if force {
            self.config.max_insights
        } else {
            self.config.ceiling
        };
        if snapshot.len() <= floor {
            debug!(user = %store.user_id(), target = %target, records = snapshot.len(), "Consolidation not needed");
            return Ok(ConsolidationReport::Skipped {
                records: snapshot.len(),
            });
        }

        let reply = match self.gateway.complete(self.request(&snapshot)).await {
            Ok(reply) => reply,
            Err(e) => return Ok(self.abort(store, target, format!("summarisation failed: {}", e))),
        };

        let insights = match parse_insights(&reply, self.config.max_insights) {
            Some(insights) => insights,
            None => return Ok(self.abort(store, target, "summary was not valid JSON".to_string())),
        };
        if insights.len() < self.config.min_insights {
            return Ok(self.abort(
                store,
                target,
                format!(
                    "only {} insights returned, need at least {}",
                    insights.len(),
                    self.config.min_insights
                ),
            ));
        }

        let before: usize = snapshot.iter().map(|r| r.content.chars().count()).sum();
        let after: usize = insights.iter().map(|i| i.chars().count()).sum();
        if insights.len() >= snapshot.len() || after >= before {
            return Ok(self.abort(
                store,
                target,
                format!("summary would not shrink the archive ({} -> {} chars)", before, after),
            ));
        }

        let category = target.insight_category();
        let mut replacements = Vec::with_capacity(insights.len());
        for insight in insights {
            let memory = NewMemory::new(insight, category, MemorySource::Consolidation);
            let memory = match self.gateway.embed(&memory.content).await {
                Some(vector) => memory.with_embedding(vector),
                None => memory,
            };
            replacements.push(memory);
        }

        let old_ids: Vec<MemoryId> = snapshot.iter().map(|r| r.id).collect();
        let inserted = match store.replace(&old_ids, replacements) {
            Ok(inserted) => inserted,
            Err(MemoryError::StaleSnapshot { missing }) => {
                return Ok(self.abort(
                    store,
                    target,
                    format!("archive changed during consolidation ({} records gone)", missing),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            user = %store.user_id(),
            target = %target,
            removed = old_ids.len(),
            inserted = inserted.len(),
            "Memories consolidated"
        );
        Ok(ConsolidationReport::Compacted {
            removed: old_ids.len(),
            inserted: inserted.len(),
        })
    }

    fn abort(
        &self,
        store: &UserMemoryStore,
        target: ConsolidationTarget,
        reason: String,
    ) -> ConsolidationReport {
        warn!(user = %store.user_id(), target = %target, reason = %reason, "Consolidation aborted");
        ConsolidationReport::Aborted { reason }
    }

    fn request(&self, records: &[MemoryRecord]) -> CompletionRequest {
        let mut prompt = format!(
            "You maintain the long-term memory of {persona}. Compress the {count} memories \
             below into between {min} and {max} dense insights.\n\n\
             Rules:\n\
             - Merge duplicates and near-duplicates.\n\
             - Keep concrete details: names, dates, preferences, goals, struggles.\n\
             - Drop chatter and anything already implied by another insight.\n\
             - Each insight is one self-contained sentence.\n\n\
             Memories:\n",
            persona = self.persona,
            count = records.len(),
            min = self.config.min_insights,
            max = self.config.max_insights,
        );
        for record in records {
            prompt.push_str(&format!(
                "- [{}] {}\n",
                record.display_timestamp(),
                record.content
            ));
        }
        prompt.push_str(
            "\nRespond with ONLY a JSON object: {\"compressed\": [\"insight\", ...]}",
        );

        CompletionRequest::new(vec![Message::user(prompt)], self.config.max_tokens)
            .with_temperature(0.2)
            .with_json_response()
    }
}

/// Parse a `{"compressed": [...]}` reply into at most `max` clean insights.
///
/// Blanks, duplicates and entries that could not be stored are dropped.
/// Returns `None` when the reply is not the expected JSON.
pub fn parse_insights(reply: &str, max: usize) -> Option<Vec<String>> {
    let parsed: CompressedReply = parse_json_reply(reply, "consolidation")?;
    let mut insights: Vec<String> = clean_items(parsed.compressed)
        .into_iter()
        .filter(|insight| validate_memory_content(insight).is_ok())
        .collect();
    insights.truncate(max);
    Some(insights)
}

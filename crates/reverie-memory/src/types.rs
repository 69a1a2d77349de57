//! Core data types for per-user memory.
//!
//! Every record that crosses the store boundary is a [`MemoryRecord`]; the
//! loosely shaped JSON documents underneath are only ever read through these
//! types and checked by [`crate::validation`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// Format used when rendering a record timestamp for humans and prompts.
pub const DISPLAY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque identity of the user that owns a memory store.
///
/// Chat platforms hand out numeric ids; those convert directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a user id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Identifier of a memory record: creation time in Unix milliseconds.
///
/// Unique and strictly increasing within one user's archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(i64);

impl MemoryId {
    /// Wrap a raw millisecond value.
    pub const fn new(millis: i64) -> Self {
        Self(millis)
    }

    /// Id candidate for a record created at `time`.
    pub fn from_time(time: DateTime<Utc>) -> Self {
        Self(time.timestamp_millis())
    }

    /// The raw millisecond value.
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// The id that immediately follows this one.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MemoryId {
    fn from(millis: i64) -> Self {
        Self(millis)
    }
}

impl FromStr for MemoryId {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| MemoryError::InvalidData(format!("invalid memory id: {s}")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Category & Source
// ─────────────────────────────────────────────────────────────────────────────

/// Tag that scopes consolidation and retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// Facts about the user.
    User,
    /// General facts not tied to the user.
    Fact,
    /// Facts about a group conversation.
    Group,
    /// The assistant persona's own reflections.
    Reflection,
    /// Dated happenings.
    Event,
    /// Anything else.
    Other,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Category; 6] = [
        Category::User,
        Category::Fact,
        Category::Group,
        Category::Reflection,
        Category::Event,
        Category::Other,
    ];

    /// Canonical name, as serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::User => "User",
            Category::Fact => "Fact",
            Category::Group => "Group",
            Category::Reflection => "Reflection",
            Category::Event => "Event",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Category::User),
            "fact" | "facts" => Ok(Category::Fact),
            "group" => Ok(Category::Group),
            "reflection" | "reflections" | "self" => Ok(Category::Reflection),
            "event" | "events" => Ok(Category::Event),
            "other" | "others" => Ok(Category::Other),
            _ => Err(MemoryError::InvalidData(format!("unknown category: {s}"))),
        }
    }
}

/// Which subsystem wrote a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    /// Explicitly saved during a conversation.
    Conversation,
    /// Extracted automatically from a conversational turn.
    Extraction,
    /// Produced by consolidating older records.
    Consolidation,
    /// Seeded from the public starter set.
    Lore,
    /// Written by an operator tool.
    Operator,
}

impl fmt::Display for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemorySource::Conversation => "conversation",
            MemorySource::Extraction => "extraction",
            MemorySource::Consolidation => "consolidation",
            MemorySource::Lore => "lore",
            MemorySource::Operator => "operator",
        };
        f.write_str(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// A single long-term memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Creation-time id, unique per user.
    pub id: MemoryId,
    /// The fact itself.
    pub content: String,
    /// Scope tag.
    pub category: Category,
    /// Creation time (RFC 3339 on disk, so lexical order is time order).
    pub timestamp: DateTime<Utc>,
    /// Provenance.
    pub source: MemorySource,
}

impl MemoryRecord {
    /// Timestamp rendered as `YYYY-MM-DD HH:MM`.
    pub fn display_timestamp(&self) -> String {
        self.timestamp.format(DISPLAY_TIMESTAMP_FORMAT).to_string()
    }
}

/// A record to be written, with an optional precomputed embedding.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub content: String,
    pub category: Category,
    pub source: MemorySource,
    pub embedding: Option<Vec<f32>>,
}

impl NewMemory {
    /// Create a record without an embedding.
    pub fn new(content: impl Into<String>, category: Category, source: MemorySource) -> Self {
        Self {
            content: content.into(),
            category,
            source,
            embedding: None,
        }
    }

    /// Attach an embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// A record paired with its similarity to a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMemory {
    pub record: MemoryRecord,
    pub score: f32,
}

/// Order in which [`crate::UserMemoryStore::list`] returns records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListOrder {
    /// Most recent first.
    #[default]
    NewestFirst,
    /// Insertion order, oldest first.
    ArchiveOrder,
}

// ─────────────────────────────────────────────────────────────────────────────
// Profile & Stats
// ─────────────────────────────────────────────────────────────────────────────

/// Derived summary of a user, kept apart from the memory list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Prose summary.
    pub summary: String,
    /// Short descriptive tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// When the summary was generated.
    pub updated_at: DateTime<Utc>,
    /// Number of records the summary was generated from.
    #[serde(default)]
    pub based_on: usize,
}

/// Counts describing one user's store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserStats {
    pub user: String,
    pub initialized: bool,
    pub records: usize,
    pub by_category: BTreeMap<Category, usize>,
    pub vectors: usize,
    pub dimensions: Option<usize>,
    pub profile_updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_category_parse_aliases() {
        assert_eq!("user".parse::<Category>().unwrap(), Category::User);
        assert_eq!(" Self ".parse::<Category>().unwrap(), Category::Reflection);
        assert_eq!("Events".parse::<Category>().unwrap(), Category::Event);
        assert!("weather".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_serializes_by_name() {
        let json = serde_json::to_string(&Category::Reflection).unwrap();
        assert_eq!(json, "\"Reflection\"");
    }

    #[test]
    fn test_record_display_timestamp() {
        let record = MemoryRecord {
            id: MemoryId::new(1),
            content: "likes tea".to_string(),
            category: Category::User,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 7, 14, 5, 59).unwrap(),
            source: MemorySource::Conversation,
        };
        assert_eq!(record.display_timestamp(), "2025-03-07 14:05");
    }

    #[test]
    fn test_record_json_shape() {
        let record = MemoryRecord {
            id: MemoryId::new(1_700_000_000_000),
            content: "exam on Friday".to_string(),
            category: Category::Event,
            timestamp: Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap(),
            source: MemorySource::Extraction,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], 1_700_000_000_000i64);
        assert_eq!(value["category"], "Event");
        assert_eq!(value["source"], "extraction");
        assert_eq!(value["timestamp"], "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_user_id_from_numeric() {
        assert_eq!(UserId::from(42i64).as_str(), "42");
        assert_eq!(UserId::from(-1001234i64).to_string(), "-1001234");
    }

    #[test]
    fn test_memory_id_parse() {
        assert_eq!("123".parse::<MemoryId>().unwrap(), MemoryId::new(123));
        assert!("abc".parse::<MemoryId>().is_err());
        assert_eq!(MemoryId::new(5).next(), MemoryId::new(6));
    }
}

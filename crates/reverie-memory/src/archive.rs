//! Memory archive: one user's ordered log of records.
//!
//! Records are kept in id order, which is also creation order. Ids come from
//! the wall clock in milliseconds but never repeat or go backwards: the
//! archive remembers the highest id it ever issued, including ids whose
//! records were later deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lore::LoreEntry;
use crate::types::{Category, ListOrder, MemoryId, MemoryRecord, MemorySource};
use crate::validation::{ValidationError, validate_record, validate_record_order};

/// Persisted archive document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryArchive {
    #[serde(default)]
    records: Vec<MemoryRecord>,
    #[serde(default)]
    last_id: Option<MemoryId>,
}

impl MemoryArchive {
    /// Create an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an archive pre-populated with starter lore.
    pub fn seeded(lore: &[LoreEntry], now: DateTime<Utc>) -> Self {
        let mut archive = Self::new();
        for entry in lore {
            archive.append(entry.content.clone(), entry.category, MemorySource::Lore, now);
        }
        archive
    }

    /// The id the next append at `now` would receive.
    pub fn next_id(&self, now: DateTime<Utc>) -> MemoryId {
        let candidate = MemoryId::from_time(now);
        let floor = self.last_id.max(self.records.last().map(|r| r.id));
        match floor {
            Some(last) if candidate <= last => last.next(),
            _ => candidate,
        }
    }

    /// Append a record and return a copy of it.
    pub fn append(
        &mut self,
        content: impl Into<String>,
        category: Category,
        source: MemorySource,
        now: DateTime<Utc>,
    ) -> MemoryRecord {
        let record = MemoryRecord {
            id: self.next_id(now),
            content: content.into(),
            category,
            timestamp: now,
            source,
        };
        self.last_id = Some(record.id);
        self.records.push(record.clone());
        record
    }

    /// Records filtered by category, ordered, and truncated to `limit`.
    pub fn list(
        &self,
        category: Option<Category>,
        limit: Option<usize>,
        order: ListOrder,
    ) -> Vec<MemoryRecord> {
        let matches = |r: &&MemoryRecord| category.is_none_or(|c| r.category == c);
        let limit = limit.unwrap_or(usize::MAX);
        match order {
            ListOrder::ArchiveOrder => self
                .records
                .iter()
                .filter(matches)
                .take(limit)
                .cloned()
                .collect(),
            ListOrder::NewestFirst => self
                .records
                .iter()
                .rev()
                .filter(matches)
                .take(limit)
                .cloned()
                .collect(),
        }
    }

    /// Look up a record by id.
    pub fn get(&self, id: MemoryId) -> Option<&MemoryRecord> {
        self.records
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|i| &self.records[i])
    }

    /// Whether a record with `id` exists.
    pub fn contains(&self, id: MemoryId) -> bool {
        self.get(id).is_some()
    }

    /// Number of records, optionally restricted to one category.
    pub fn count(&self, category: Option<Category>) -> usize {
        match category {
            Some(c) => self.records.iter().filter(|r| r.category == c).count(),
            None => self.records.len(),
        }
    }

    /// Remove records by id, returning the removed records.
    pub fn remove(&mut self, ids: &[MemoryId]) -> Vec<MemoryRecord> {
        self.remove_where(|r| ids.contains(&r.id))
    }

    /// Remove every record matching `predicate`, returning the removed records.
    pub fn remove_where(&mut self, predicate: impl Fn(&MemoryRecord) -> bool) -> Vec<MemoryRecord> {
        let (removed, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.records).into_iter().partition(|r| predicate(r));
        self.records = kept;
        removed
    }

    /// All records in archive order.
    pub fn records(&self) -> &[MemoryRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the archive holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Check the document read back from storage.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for record in &self.records {
            validate_record(record)?;
        }
        validate_record_order(&self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn test_append_uses_clock_millis() {
        let mut archive = MemoryArchive::new();
        let record = archive.append("likes tea", Category::User, MemorySource::Conversation, at(1_000));
        assert_eq!(record.id, MemoryId::new(1_000));
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn test_same_millisecond_appends_stay_unique() {
        let mut archive = MemoryArchive::new();
        let now = at(5_000);
        let ids: Vec<MemoryId> = (0..4)
            .map(|i| {
                archive
                    .append(format!("fact {i}"), Category::Fact, MemorySource::Operator, now)
                    .id
            })
            .collect();
        assert_eq!(
            ids,
            vec![
                MemoryId::new(5_000),
                MemoryId::new(5_001),
                MemoryId::new(5_002),
                MemoryId::new(5_003)
            ]
        );
    }

    #[test]
    fn test_clock_going_backwards_keeps_ids_increasing() {
        let mut archive = MemoryArchive::new();
        let first = archive.append("a", Category::User, MemorySource::Conversation, at(9_000));
        let second = archive.append("b", Category::User, MemorySource::Conversation, at(3_000));
        assert!(second.id > first.id);
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let mut archive = MemoryArchive::new();
        let first = archive.append("a", Category::User, MemorySource::Conversation, at(100));
        archive.remove(&[first.id]);
        assert!(archive.is_empty());

        let second = archive.append("b", Category::User, MemorySource::Conversation, at(100));
        assert!(second.id > first.id);
    }

    #[test]
    fn test_list_orders_and_filters() {
        let mut archive = MemoryArchive::new();
        archive.append("u1", Category::User, MemorySource::Conversation, at(1));
        archive.append("f1", Category::Fact, MemorySource::Conversation, at(2));
        archive.append("u2", Category::User, MemorySource::Conversation, at(3));
        archive.append("u3", Category::User, MemorySource::Conversation, at(4));

        let newest: Vec<String> = archive
            .list(Some(Category::User), Some(2), ListOrder::NewestFirst)
            .into_iter()
            .map(|r| r.content)
            .collect();
        assert_eq!(newest, vec!["u3", "u2"]);

        let oldest: Vec<String> = archive
            .list(None, None, ListOrder::ArchiveOrder)
            .into_iter()
            .map(|r| r.content)
            .collect();
        assert_eq!(oldest, vec!["u1", "f1", "u2", "u3"]);

        assert_eq!(archive.count(Some(Category::User)), 3);
        assert_eq!(archive.count(Some(Category::Group)), 0);
    }

    #[test]
    fn test_seeded_archive_marks_lore() {
        let lore = vec![
            LoreEntry::new("The library opens at nine.", Category::Fact),
            LoreEntry::new("Exams are in June.", Category::Event),
        ];
        let archive = MemoryArchive::seeded(&lore, at(10));
        assert_eq!(archive.len(), 2);
        assert!(archive.records().iter().all(|r| r.source == MemorySource::Lore));
        assert!(archive.validate().is_ok());
    }

    #[test]
    fn test_validate_detects_unordered_document() {
        let json = serde_json::json!({
            "records": [
                {"id": 5, "content": "b", "category": "User", "timestamp": "2024-01-01T00:00:00Z", "source": "conversation"},
                {"id": 2, "content": "a", "category": "User", "timestamp": "2024-01-01T00:00:00Z", "source": "conversation"}
            ]
        });
        let archive: MemoryArchive = serde_json::from_value(json).unwrap();
        assert!(archive.validate().is_err());
    }

    #[test]
    fn test_legacy_document_without_last_id() {
        let json = serde_json::json!({
            "records": [
                {"id": 50, "content": "a", "category": "User", "timestamp": "2024-01-01T00:00:00Z", "source": "conversation"}
            ]
        });
        let archive: MemoryArchive = serde_json::from_value(json).unwrap();
        assert_eq!(archive.next_id(at(10)), MemoryId::new(51));
    }
}

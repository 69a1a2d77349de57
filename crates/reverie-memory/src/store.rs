//! Per-user memory stores.
//!
//! [`MemoryStore`] is the shared registry: it owns the document backend, the
//! optional lore seed, and one write mutex per user. [`UserMemoryStore`] is a
//! cheap handle scoped to one user that owns both the archive and the vector
//! index and keeps them in step:
//!
//! - inserts write the archive first, then the vector;
//! - deletes remove vectors first, then archive records;
//! - a vector is never stored for an id the archive does not hold.
//!
//! All mutations hold the user's mutex for the whole read-modify-write. None
//! of them perform network I/O, so embedding and completion calls always
//! happen outside the lock.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::archive::MemoryArchive;
use crate::backend::{DocumentStore, DocumentStoreExt, InMemoryDocumentStore};
use crate::error::{MemoryError, Result};
use crate::fs::JsonFileStore;
use crate::lore::LoreEntry;
use crate::sqlite::SqliteDocumentStore;
use crate::types::{
    Category, ListOrder, MemoryId, MemoryRecord, MemorySource, NewMemory, ScoredMemory, UserId,
    UserProfile, UserStats,
};
use crate::validation::{validate_memory_content, validate_user_id};
use crate::vector::VectorIndex;

const USERS_PREFIX: &str = "users/";

fn archive_key(user: &UserId) -> String {
    format!("{USERS_PREFIX}{user}/archive")
}

fn vectors_key(user: &UserId) -> String {
    format!("{USERS_PREFIX}{user}/vectors")
}

fn profile_key(user: &UserId) -> String {
    format!("{USERS_PREFIX}{user}/profile")
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Store
// ─────────────────────────────────────────────────────────────────────────────

/// Registry of per-user stores over a shared document backend.
pub struct MemoryStore {
    documents: Arc<dyn DocumentStore>,
    lore: Arc<Vec<LoreEntry>>,
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("backend", &self.documents.name())
            .field("lore_entries", &self.lore.len())
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Create a store over any document backend.
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            documents,
            lore: Arc::new(Vec::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Volatile store, for tests and dry runs.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryDocumentStore::new()))
    }

    /// Store backed by a SQLite file.
    pub fn open_sqlite(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Arc::new(SqliteDocumentStore::open(path)?)))
    }

    /// Store backed by a directory of JSON files.
    pub fn open_json_dir(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Arc::new(JsonFileStore::open(path)?)))
    }

    /// Seed new archives with these starter memories.
    pub fn with_lore(mut self, lore: Vec<LoreEntry>) -> Self {
        self.lore = Arc::new(lore);
        self
    }

    /// The underlying document backend.
    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    /// Handle for one user's memories.
    pub fn user(&self, user: &UserId) -> Result<UserMemoryStore> {
        validate_user_id(user)?;
        let lock = {
            let mut locks = self.locks.lock();
            // Idle locks are only referenced by the map.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(user.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        Ok(UserMemoryStore {
            user: user.clone(),
            documents: Arc::clone(&self.documents),
            lore: Arc::clone(&self.lore),
            lock,
        })
    }

    /// Users that have an archive, sorted.
    pub fn users(&self) -> Result<Vec<UserId>> {
        let mut users: Vec<UserId> = self
            .documents
            .list(USERS_PREFIX)?
            .into_iter()
            .filter_map(|(key, _)| {
                key.strip_prefix(USERS_PREFIX)
                    .and_then(|rest| rest.strip_suffix("/archive"))
                    .filter(|id| !id.contains('/'))
                    .map(UserId::from)
            })
            .collect();
        users.sort();
        users.dedup();
        Ok(users)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User Memory Store
// ─────────────────────────────────────────────────────────────────────────────

/// One user's archive and vector index.
#[derive(Clone)]
pub struct UserMemoryStore {
    user: UserId,
    documents: Arc<dyn DocumentStore>,
    lore: Arc<Vec<LoreEntry>>,
    lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for UserMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserMemoryStore")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl UserMemoryStore {
    /// The owning user.
    pub fn user_id(&self) -> &UserId {
        &self.user
    }

    // ── persistence helpers ────────────────────────────────────────────────

    fn load_archive(&self) -> Result<Option<MemoryArchive>> {
        let key = archive_key(&self.user);
        let archive: Option<MemoryArchive> = self.documents.get_typed(&key)?;
        if let Some(archive) = &archive {
            archive
                .validate()
                .map_err(|e| MemoryError::MalformedDocument {
                    key,
                    reason: e.to_string(),
                })?;
        }
        Ok(archive)
    }

    fn save_archive(&self, archive: &MemoryArchive) -> Result<()> {
        self.documents.put_typed(&archive_key(&self.user), archive)
    }

    fn load_vectors(&self) -> Result<VectorIndex> {
        Ok(self
            .documents
            .get_typed(&vectors_key(&self.user))?
            .unwrap_or_default())
    }

    fn save_vectors(&self, index: &VectorIndex) -> Result<()> {
        let key = vectors_key(&self.user);
        if index.is_empty() {
            self.documents.delete(&key)?;
            Ok(())
        } else {
            self.documents.put_typed(&key, index)
        }
    }

    /// Load the archive, or build a fresh seeded one (not yet persisted).
    fn load_or_seed(&self) -> Result<(MemoryArchive, bool)> {
        match self.load_archive()? {
            Some(archive) => Ok((archive, false)),
            None => Ok((MemoryArchive::seeded(&self.lore, Utc::now()), true)),
        }
    }

    // ── lifecycle ──────────────────────────────────────────────────────────

    /// Whether this user's archive has been created.
    pub fn exists(&self) -> Result<bool> {
        Ok(self.documents.get(&archive_key(&self.user))?.is_some())
    }

    /// Create the archive (seeded with lore) if it does not exist yet.
    ///
    /// Returns `true` when this call created it.
    pub fn ensure_initialized(&self) -> Result<bool> {
        let _guard = self.lock.lock();
        let (archive, created) = self.load_or_seed()?;
        if created {
            self.save_archive(&archive)?;
            info!(user = %self.user, seeded = archive.len(), "Memory archive initialized");
        }
        Ok(created)
    }

    /// Delete the archive, vectors and profile. The only destructor.
    ///
    /// Returns `true` if anything was removed.
    pub fn wipe(&self) -> Result<bool> {
        let _guard = self.lock.lock();
        let vectors = self.documents.delete(&vectors_key(&self.user))?;
        let archive = self.documents.delete(&archive_key(&self.user))?;
        let profile = self.documents.delete(&profile_key(&self.user))?;
        info!(user = %self.user, "Memory store wiped");
        Ok(vectors || archive || profile)
    }

    // ── writes ─────────────────────────────────────────────────────────────

    /// Append a record without a vector.
    pub fn append(
        &self,
        content: &str,
        category: Category,
        source: MemorySource,
    ) -> Result<MemoryRecord> {
        self.commit(content, category, source, None)
    }

    /// Append a record and, if given, its vector: archive first, then vector.
    ///
    /// A vector that cannot be stored is logged and dropped; the record stays
    /// and is indexed lazily later.
    pub fn commit(
        &self,
        content: &str,
        category: Category,
        source: MemorySource,
        embedding: Option<Vec<f32>>,
    ) -> Result<MemoryRecord> {
        validate_memory_content(content)?;

        let _guard = self.lock.lock();
        let (mut archive, created) = self.load_or_seed()?;
        if created {
            info!(user = %self.user, seeded = archive.len(), "Memory archive initialized");
        }
        let record = archive.append(content, category, source, Utc::now());
        self.save_archive(&archive)?;
        debug!(user = %self.user, id = %record.id, category = %category, "Memory appended");

        if let Some(vector) = embedding {
            self.store_vector_locked(record.id, vector);
        }
        Ok(record)
    }

    fn store_vector_locked(&self, id: MemoryId, vector: Vec<f32>) {
        let result = self.load_vectors().and_then(|mut index| {
            index.upsert(id, vector)?;
            self.save_vectors(&index)
        });
        if let Err(e) = result {
            warn!(user = %self.user, id = %id, error = %e, "Vector not stored, will index lazily");
        }
    }

    /// Store or overwrite the vector for an existing record.
    ///
    /// Returns `false` without writing if the archive has no such record.
    pub fn upsert_vector(&self, id: MemoryId, vector: Vec<f32>) -> Result<bool> {
        let _guard = self.lock.lock();
        let known = self
            .load_archive()?
            .is_some_and(|archive| archive.contains(id));
        if !known {
            debug!(user = %self.user, id = %id, "Skipping vector for unknown record");
            return Ok(false);
        }

        let mut index = self.load_vectors()?;
        index.upsert(id, vector)?;
        self.save_vectors(&index)?;
        Ok(true)
    }

    /// Delete records by id: vectors first, then archive entries.
    ///
    /// Returns the number of archive records removed.
    pub fn delete(&self, ids: &[MemoryId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let _guard = self.lock.lock();
        self.delete_locked(ids)
    }

    fn delete_locked(&self, ids: &[MemoryId]) -> Result<usize> {
        let mut index = self.load_vectors()?;
        if index.delete_all(ids) > 0 {
            self.save_vectors(&index)?;
        }

        let Some(mut archive) = self.load_archive()? else {
            return Ok(0);
        };
        let removed = archive.remove(ids);
        if !removed.is_empty() {
            self.save_archive(&archive)?;
        }
        Ok(removed.len())
    }

    /// Remove vector entries only.
    pub fn delete_all_vectors(&self, ids: &[MemoryId]) -> Result<usize> {
        let _guard = self.lock.lock();
        let mut index = self.load_vectors()?;
        let removed = index.delete_all(ids);
        if removed > 0 {
            self.save_vectors(&index)?;
        }
        Ok(removed)
    }

    /// Delete every record matching `predicate`, returning what was removed.
    pub fn delete_matching(
        &self,
        predicate: impl Fn(&MemoryRecord) -> bool,
    ) -> Result<Vec<MemoryRecord>> {
        let _guard = self.lock.lock();
        let Some(archive) = self.load_archive()? else {
            return Ok(Vec::new());
        };
        let doomed: Vec<MemoryRecord> = archive
            .records()
            .iter()
            .filter(|r| predicate(r))
            .cloned()
            .collect();
        let ids: Vec<MemoryId> = doomed.iter().map(|r| r.id).collect();
        self.delete_locked(&ids)?;
        Ok(doomed)
    }

    /// Swap `old_ids` for `replacements` as one locked step.
    ///
    /// Old vectors go first, then the archive is rewritten with the old
    /// records removed and the new ones appended, then new vectors are
    /// stored. Records appended after the caller's snapshot are not in
    /// `old_ids` and survive.
    ///
    /// Fails with [`MemoryError::StaleSnapshot`], writing nothing, when the
    /// archive is gone or any of `old_ids` no longer exists.
    pub fn replace(
        &self,
        old_ids: &[MemoryId],
        replacements: Vec<NewMemory>,
    ) -> Result<Vec<MemoryRecord>> {
        for replacement in &replacements {
            validate_memory_content(&replacement.content)?;
        }

        let _guard = self.lock.lock();
        let Some(mut archive) = self.load_archive()? else {
            return Err(MemoryError::StaleSnapshot {
                missing: old_ids.len(),
            });
        };
        let missing = old_ids.iter().filter(|id| !archive.contains(**id)).count();
        if missing > 0 {
            return Err(MemoryError::StaleSnapshot { missing });
        }

        let mut index = self.load_vectors()?;
        if index.delete_all(old_ids) > 0 {
            self.save_vectors(&index)?;
        }

        let removed = archive.remove(old_ids);
        let now = Utc::now();
        let mut inserted = Vec::with_capacity(replacements.len());
        let mut pending = Vec::new();
        for replacement in replacements {
            let record = archive.append(
                replacement.content,
                replacement.category,
                replacement.source,
                now,
            );
            if let Some(vector) = replacement.embedding {
                pending.push((record.id, vector));
            }
            inserted.push(record);
        }
        self.save_archive(&archive)?;

        if !pending.is_empty() {
            for (id, vector) in pending {
                if let Err(e) = index.upsert(id, vector) {
                    warn!(user = %self.user, id = %id, error = %e, "Replacement vector rejected");
                }
            }
            if let Err(e) = self.save_vectors(&index) {
                warn!(user = %self.user, error = %e, "Replacement vectors not stored, will index lazily");
            }
        }

        info!(
            user = %self.user,
            removed = removed.len(),
            inserted = inserted.len(),
            "Memories replaced"
        );
        Ok(inserted)
    }

    /// Drop vectors whose record no longer exists. Returns how many were dropped.
    pub fn repair(&self) -> Result<usize> {
        let _guard = self.lock.lock();
        let known: HashSet<MemoryId> = self
            .load_archive()?
            .map(|a| a.records().iter().map(|r| r.id).collect())
            .unwrap_or_default();

        let mut index = self.load_vectors()?;
        let dropped = index.retain(|id| known.contains(&id));
        if dropped > 0 {
            self.save_vectors(&index)?;
            info!(user = %self.user, dropped, "Orphan vectors removed");
        }
        Ok(dropped)
    }

    // ── reads ──────────────────────────────────────────────────────────────

    /// A single record.
    pub fn get(&self, id: MemoryId) -> Result<Option<MemoryRecord>> {
        Ok(self
            .load_archive()?
            .and_then(|archive| archive.get(id).cloned()))
    }

    /// Records, optionally filtered by exact category.
    pub fn list(
        &self,
        category: Option<Category>,
        limit: Option<usize>,
        order: ListOrder,
    ) -> Result<Vec<MemoryRecord>> {
        Ok(self
            .load_archive()?
            .map(|archive| archive.list(category, limit, order))
            .unwrap_or_default())
    }

    /// Record count, optionally for one category.
    pub fn count(&self, category: Option<Category>) -> Result<usize> {
        Ok(self
            .load_archive()?
            .map(|archive| archive.count(category))
            .unwrap_or(0))
    }

    /// Records that have no vector yet, oldest first.
    pub fn records_missing_vectors(&self) -> Result<Vec<MemoryRecord>> {
        let Some(archive) = self.load_archive()? else {
            return Ok(Vec::new());
        };
        let index = self.load_vectors()?;
        Ok(archive
            .records()
            .iter()
            .filter(|r| !index.contains(r.id))
            .cloned()
            .collect())
    }

    /// Top matches for `query`, joined with their records.
    ///
    /// Vectors whose record is gone are skipped.
    pub fn similarity_search(
        &self,
        query: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredMemory>> {
        let Some(archive) = self.load_archive()? else {
            return Ok(Vec::new());
        };
        let index = self.load_vectors()?;
        if let Some(dims) = index.dimensions()
            && dims != query.len()
        {
            warn!(
                user = %self.user,
                index_dims = dims,
                query_dims = query.len(),
                "Query dimensionality differs from stored vectors"
            );
        }

        Ok(index
            .similarity_search(query, index.len(), min_score)
            .into_iter()
            .filter_map(|hit| {
                archive.get(hit.memory_id).map(|record| ScoredMemory {
                    record: record.clone(),
                    score: hit.score,
                })
            })
            .take(top_k)
            .collect())
    }

    // ── profile & stats ────────────────────────────────────────────────────

    /// The derived profile, if one has been generated.
    pub fn profile(&self) -> Result<Option<UserProfile>> {
        self.documents.get_typed(&profile_key(&self.user))
    }

    /// Replace the derived profile.
    pub fn set_profile(&self, profile: &UserProfile) -> Result<()> {
        let _guard = self.lock.lock();
        self.documents.put_typed(&profile_key(&self.user), profile)
    }

    /// Counts for reporting.
    pub fn stats(&self) -> Result<UserStats> {
        let archive = self.load_archive()?;
        let index = self.load_vectors()?;
        let profile = self.profile()?;

        let mut by_category = BTreeMap::new();
        if let Some(archive) = &archive {
            for record in archive.records() {
                *by_category.entry(record.category).or_insert(0) += 1;
            }
        }

        Ok(UserStats {
            user: self.user.to_string(),
            initialized: archive.is_some(),
            records: archive.as_ref().map_or(0, MemoryArchive::len),
            by_category,
            vectors: index.len(),
            dimensions: index.dimensions(),
            profile_updated_at: profile.map(|p| p.updated_at),
        })
    }
}

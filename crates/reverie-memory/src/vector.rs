//! Vector index and cosine similarity search.
//!
//! A user's index maps record ids to embedding vectors. It is small enough to
//! hold in memory and scan exhaustively, so search is a linear pass with a
//! deterministic ordering: score descending, then lower (older) id first.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::MemoryId;
use crate::validation::{ValidationError, validate_embedding};

// ─────────────────────────────────────────────────────────────────────────────
// Similarity
// ─────────────────────────────────────────────────────────────────────────────

/// Cosine similarity of two vectors.
///
/// Returns `0.0` when either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a > 0.0 && norm_b > 0.0 {
        (dot / (norm_a * norm_b).sqrt()).clamp(-1.0, 1.0) as f32
    } else {
        0.0
    }
}

/// A single search hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityResult {
    pub memory_id: MemoryId,
    pub score: f32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Vector Index
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct VectorEntry {
    id: MemoryId,
    vector: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct VectorDocument {
    #[serde(default)]
    dimensions: Option<usize>,
    #[serde(default)]
    entries: Vec<VectorEntry>,
}

/// One user's id-to-embedding map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "VectorDocument", into = "VectorDocument")]
pub struct VectorIndex {
    dimensions: Option<usize>,
    entries: BTreeMap<MemoryId, Vec<f32>>,
}

impl From<VectorDocument> for VectorIndex {
    fn from(doc: VectorDocument) -> Self {
        let entries: BTreeMap<_, _> = doc.entries.into_iter().map(|e| (e.id, e.vector)).collect();
        let dimensions = doc
            .dimensions
            .or_else(|| entries.values().next().map(Vec::len));
        Self {
            dimensions,
            entries,
        }
    }
}

impl From<VectorIndex> for VectorDocument {
    fn from(index: VectorIndex) -> Self {
        VectorDocument {
            dimensions: index.dimensions,
            entries: index
                .entries
                .into_iter()
                .map(|(id, vector)| VectorEntry { id, vector })
                .collect(),
        }
    }
}

impl VectorIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Dimensionality of stored vectors, fixed by the first insert.
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    /// Store or overwrite the vector for `id`.
    pub fn upsert(&mut self, id: MemoryId, vector: Vec<f32>) -> Result<(), ValidationError> {
        let expected = self.dimensions.unwrap_or(vector.len());
        validate_embedding(&vector, expected)?;
        self.dimensions = Some(expected);
        self.entries.insert(id, vector);
        Ok(())
    }

    /// Remove entries for `ids`, returning how many existed.
    pub fn delete_all(&mut self, ids: &[MemoryId]) -> usize {
        let removed = ids
            .iter()
            .filter(|id| self.entries.remove(*id).is_some())
            .count();
        self.reset_dimensions_if_empty();
        removed
    }

    /// Keep only entries whose id satisfies `keep`; returns how many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(MemoryId) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id, _| keep(*id));
        self.reset_dimensions_if_empty();
        before - self.entries.len()
    }

    fn reset_dimensions_if_empty(&mut self) {
        if self.entries.is_empty() {
            self.dimensions = None;
        }
    }

    /// Whether `id` has a vector.
    pub fn contains(&self, id: MemoryId) -> bool {
        self.entries.contains_key(&id)
    }

    /// The stored vector for `id`.
    pub fn get(&self, id: MemoryId) -> Option<&[f32]> {
        self.entries.get(&id).map(Vec::as_slice)
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids with a stored vector, ascending.
    pub fn ids(&self) -> impl Iterator<Item = MemoryId> + '_ {
        self.entries.keys().copied()
    }

    /// Score every stored vector against `query` and return the best matches.
    ///
    /// Scores below `min_score` are dropped. Results are sorted by score
    /// descending with ties broken by lower id, then cut to `top_k`.
    pub fn similarity_search(
        &self,
        query: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Vec<SimilarityResult> {
        if top_k == 0 {
            return Vec::new();
        }

        let mut results: Vec<SimilarityResult> = self
            .entries
            .iter()
            .map(|(id, vector)| SimilarityResult {
                memory_id: *id,
                score: cosine_similarity(query, vector),
            })
            .filter(|r| r.score >= min_score)
            .collect();

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.memory_id.cmp(&b.memory_id))
        });
        results.truncate(top_k);
        results
    }
}

//! Per-user long-term memory for Reverie.
//!
//! This crate provides:
//! - **Archive**: an ordered, append-only log of short memory records per user
//! - **Vector index**: id-to-embedding map with deterministic cosine search
//! - **User store**: one handle owning both, enforcing write ordering under a
//!   per-user mutex
//! - **Document backends**: SQLite, JSON files, or in-memory
//!
//! Embedding and completion calls live elsewhere; nothing here touches the
//! network.

pub mod archive;
pub mod backend;
pub mod error;
pub mod fs;
pub mod lore;
pub mod sqlite;
pub mod store;
pub mod types;
pub mod validation;
pub mod vector;

pub use archive::MemoryArchive;
pub use backend::{DocumentStore, DocumentStoreExt, InMemoryDocumentStore};
pub use error::{MemoryError, Result};
pub use fs::JsonFileStore;
pub use lore::{LoreEntry, load_lore};
pub use sqlite::SqliteDocumentStore;
pub use store::{MemoryStore, UserMemoryStore};
pub use types::{
    Category, DISPLAY_TIMESTAMP_FORMAT, ListOrder, MemoryId, MemoryRecord, MemorySource,
    NewMemory, ScoredMemory, UserId, UserProfile, UserStats,
};
pub use validation::ValidationError;
pub use vector::{SimilarityResult, VectorIndex, cosine_similarity};

//! Document store trait for pluggable storage.
//!
//! Memory state is persisted as a handful of JSON documents per user,
//! addressed by `/`-separated keys. Any key/value service that can `get`,
//! `put`, `delete` and `list` by prefix can back a [`crate::MemoryStore`].
//!
//! # Example
//!
//! ```ignore
//! use reverie_memory::{DocumentStore, InMemoryDocumentStore, SqliteDocumentStore};
//!
//! let sqlite = SqliteDocumentStore::open("~/.local/share/reverie/memory.db")?;
//! let scratch = InMemoryDocumentStore::new();
//!
//! fn count_users(store: &dyn DocumentStore) -> usize {
//!     store.list("users/").map(|docs| docs.len()).unwrap_or(0)
//! }
//! ```

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{MemoryError, Result};
use crate::validation::validate_document_key;

/// Trait for document storage backends.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to allow sharing across tasks.
pub trait DocumentStore: Send + Sync {
    /// Fetch a document. Returns `Ok(None)` if the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Create or overwrite a document.
    fn put(&self, key: &str, value: &Value) -> Result<()>;

    /// Delete a document. Returns `true` if it existed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// All documents whose key starts with `prefix`, ordered by key.
    fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>>;

    /// Short backend name for logs.
    fn name(&self) -> &str;
}

/// Typed helpers on top of [`DocumentStore`].
pub trait DocumentStoreExt: DocumentStore {
    /// Fetch and deserialize a document, reporting shape errors with the key.
    fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                MemoryError::MalformedDocument {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
            }),
        }
    }

    /// Serialize and store a document.
    fn put_typed<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.put(key, &value)
    }
}

impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {}

/// Volatile document store backed by a `BTreeMap`.
///
/// Useful for tests and for running without persistence.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: Mutex<BTreeMap<String, Value>>,
}

impl InMemoryDocumentStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.lock().is_empty()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        validate_document_key(key)?;
        Ok(self.documents.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &Value) -> Result<()> {
        validate_document_key(key)?;
        self.documents.lock().insert(key.to_string(), value.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        validate_document_key(key)?;
        Ok(self.documents.lock().remove(key).is_some())
    }

    fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        let documents = self.documents.lock();
        Ok(documents
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

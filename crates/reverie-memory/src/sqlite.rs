//! SQLite-backed document store.
//!
//! One `documents` table holds every JSON blob. The database runs in WAL mode
//! so readers do not block the single writer.

use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde_json::Value;
use tracing::{debug, info};

use crate::backend::DocumentStore;
use crate::error::{MemoryError, Result};
use crate::validation::validate_document_key;

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

/// Document store backed by a single SQLite file.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDocumentStore").finish_non_exhaustive()
    }
}

impl SqliteDocumentStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| MemoryError::io(parent, e))?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;

        info!(path = %path.display(), "Document store opened");
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        debug!("In-memory document store created");
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock();

        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(journal_mode = %mode, "Journal mode set");
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let current_version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if current_version >= SCHEMA_VERSION {
            debug!(version = current_version, "Schema up to date");
            return Ok(());
        }

        info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrating document schema"
        );

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                key TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(())
    }
}

fn parse_body(key: &str, body: &str) -> Result<Value> {
    serde_json::from_str(body).map_err(|e| MemoryError::MalformedDocument {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

impl DocumentStore for SqliteDocumentStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        validate_document_key(key)?;
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|b| parse_body(key, &b)).transpose()
    }

    fn put(&self, key: &str, value: &Value) -> Result<()> {
        validate_document_key(key)?;
        let body = serde_json::to_string(value)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO documents (key, body, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![key, body, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        validate_document_key(key)?;
        let conn = self.conn.lock();
        let changed = conn.execute("DELETE FROM documents WHERE key = ?1", params![key])?;
        Ok(changed > 0)
    }

    fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT key, body FROM documents
             WHERE substr(key, 1, length(?1)) = ?1
             ORDER BY key",
        )?;
        let rows = stmt.query_map(params![prefix], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (key, body) = row?;
            let value = parse_body(&key, &body)?;
            documents.push((key, value));
        }
        Ok(documents)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_put_get_overwrite() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.put("users/1/archive", &json!({"v": 1})).unwrap();
        store.put("users/1/archive", &json!({"v": 2})).unwrap();
        assert_eq!(store.get("users/1/archive").unwrap(), Some(json!({"v": 2})));
        assert!(store.get("users/2/archive").unwrap().is_none());
    }

    #[test]
    fn test_delete() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.put("k", &json!(true)).unwrap();
        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
    }

    #[test]
    fn test_list_prefix_is_literal() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.put("users/1/archive", &json!(1)).unwrap();
        store.put("users/10/archive", &json!(2)).unwrap();
        store.put("users/1/vectors", &json!(3)).unwrap();

        let listed = store.list("users/1/").unwrap();
        let keys: Vec<&str> = listed.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["users/1/archive", "users/1/vectors"]);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.db");
        {
            let store = SqliteDocumentStore::open(&path).unwrap();
            store.put("users/7/profile", &json!({"summary": "x"})).unwrap();
        }
        let store = SqliteDocumentStore::open(&path).unwrap();
        assert_eq!(
            store.get("users/7/profile").unwrap(),
            Some(json!({"summary": "x"}))
        );
    }
}

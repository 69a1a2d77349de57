//! JSON-file document store.
//!
//! Each key maps to `<root>/<key>.json`. Writes go to a temporary sibling
//! first and are renamed into place, so a crash never leaves a torn file.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::backend::DocumentStore;
use crate::error::{MemoryError, Result};
use crate::validation::validate_document_key;

const EXTENSION: &str = "json";

/// Document store that keeps one pretty-printed JSON file per key.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| MemoryError::io(&root, e))?;
        debug!(root = %root.display(), "JSON document store opened");
        Ok(Self { root })
    }

    /// Directory holding the documents.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_document_key(key)?;
        let mut path = self.root.clone();
        for segment in key.split('/') {
            path.push(segment);
        }
        let file_name = format!(
            "{}.{EXTENSION}",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
        path.set_file_name(file_name);
        Ok(path)
    }

    fn collect_keys(&self, dir: &Path, prefix: &str, keys: &mut Vec<String>) -> Result<()> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(MemoryError::io(dir, e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| MemoryError::io(dir, e))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if path.is_dir() {
                self.collect_keys(&path, &format!("{prefix}{name}/"), keys)?;
            } else if let Some(stem) = name.strip_suffix(".json") {
                keys.push(format!("{prefix}{stem}"));
            }
        }
        Ok(())
    }
}

impl DocumentStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key)?;
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MemoryError::io(&path, e)),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| MemoryError::MalformedDocument {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    fn put(&self, key: &str, value: &Value) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MemoryError::io(parent, e))?;
        }

        let body = serde_json::to_string_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(|e| MemoryError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| MemoryError::io(&path, e))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(MemoryError::io(&path, e)),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        let mut keys = Vec::new();
        self.collect_keys(&self.root, "", &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();

        let mut documents = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(&key)? {
                documents.push((key, value));
            }
        }
        Ok(documents)
    }

    fn name(&self) -> &str {
        "json"
    }
}

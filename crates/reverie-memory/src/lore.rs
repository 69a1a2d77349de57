//! Public starter memories seeded into every new archive.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};
use crate::types::Category;
use crate::validation::validate_memory_content;

/// One starter memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoreEntry {
    pub content: String,
    #[serde(default = "default_category")]
    pub category: Category,
}

fn default_category() -> Category {
    Category::Fact
}

impl LoreEntry {
    pub fn new(content: impl Into<String>, category: Category) -> Self {
        Self {
            content: content.into(),
            category,
        }
    }
}

/// Load a lore file: a JSON array of `{"content": ..., "category": ...}`.
pub fn load_lore(path: impl AsRef<Path>) -> Result<Vec<LoreEntry>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| MemoryError::io(path, e))?;
    let entries: Vec<LoreEntry> =
        serde_json::from_str(&contents).map_err(|e| MemoryError::MalformedDocument {
            key: path.display().to_string(),
            reason: e.to_string(),
        })?;

    for entry in &entries {
        validate_memory_content(&entry.content)?;
    }
    Ok(entries)
}

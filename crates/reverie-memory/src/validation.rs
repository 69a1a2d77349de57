//! Shape validation at the store boundary.
//!
//! This module provides validation for:
//! - Embedding dimensions and values
//! - Memory content
//! - User ids and document keys
//! - Whole archives read back from storage

use crate::error::MemoryError;
use crate::types::{MemoryId, MemoryRecord, UserId};

/// Longest memory content accepted, in characters.
pub const MAX_CONTENT_CHARS: usize = 2_000;

/// Longest user id accepted, in bytes.
pub const MAX_USER_ID_LEN: usize = 128;

// ─────────────────────────────────────────────────────────────────────────────
// Validation Error
// ─────────────────────────────────────────────────────────────────────────────

/// Specific validation error types for memory data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Memory content is empty or whitespace.
    #[error("memory content is empty")]
    EmptyContent,

    /// Memory content contains a NUL byte.
    #[error("memory content contains a null byte")]
    NullByte,

    /// Memory content is longer than [`MAX_CONTENT_CHARS`].
    #[error("memory content is {len} characters, limit is {max}")]
    ContentTooLong { len: usize, max: usize },

    /// Embedding has no components.
    #[error("embedding is empty")]
    EmptyEmbedding,

    /// Embedding dimension mismatch.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding contains invalid values (NaN or Inf).
    #[error("embedding contains {count} invalid values (NaN or Inf)")]
    InvalidEmbeddingValues { count: usize },

    /// User id is unusable as a storage key.
    #[error("invalid user id '{0}'")]
    InvalidUserId(String),

    /// Document key is malformed.
    #[error("invalid document key '{0}'")]
    InvalidKey(String),

    /// Archive ids are not strictly increasing.
    #[error("record id {next} does not follow {previous}")]
    NonMonotonicIds { previous: MemoryId, next: MemoryId },
}

impl From<ValidationError> for MemoryError {
    fn from(err: ValidationError) -> Self {
        MemoryError::InvalidData(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Validate an embedding vector against an expected dimension.
pub fn validate_embedding(embedding: &[f32], expected_dim: usize) -> Result<(), ValidationError> {
    if embedding.is_empty() {
        return Err(ValidationError::EmptyEmbedding);
    }

    if embedding.len() != expected_dim {
        return Err(ValidationError::DimensionMismatch {
            expected: expected_dim,
            actual: embedding.len(),
        });
    }

    let invalid_count = embedding.iter().filter(|v| !v.is_finite()).count();
    if invalid_count > 0 {
        return Err(ValidationError::InvalidEmbeddingValues {
            count: invalid_count,
        });
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Content Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Validate a memory's content.
pub fn validate_memory_content(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::EmptyContent);
    }

    // Null bytes usually mean binary data slipped through
    if content.contains('\0') {
        return Err(ValidationError::NullByte);
    }

    let len = content.chars().count();
    if len > MAX_CONTENT_CHARS {
        return Err(ValidationError::ContentTooLong {
            len,
            max: MAX_CONTENT_CHARS,
        });
    }

    Ok(())
}

/// Validate a record read from or written to storage.
pub fn validate_record(record: &MemoryRecord) -> Result<(), ValidationError> {
    validate_memory_content(&record.content)
}

/// Validate that a sequence of records has strictly increasing ids.
pub fn validate_record_order(records: &[MemoryRecord]) -> Result<(), ValidationError> {
    for pair in records.windows(2) {
        if pair[1].id <= pair[0].id {
            return Err(ValidationError::NonMonotonicIds {
                previous: pair[0].id,
                next: pair[1].id,
            });
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Key Validation
// ─────────────────────────────────────────────────────────────────────────────

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@' | ':')
}

/// Validate a user id before it is embedded in a storage key.
pub fn validate_user_id(user: &UserId) -> Result<(), ValidationError> {
    let id = user.as_str();
    let ok = !id.is_empty()
        && id.len() <= MAX_USER_ID_LEN
        && id != "."
        && id != ".."
        && id.chars().all(is_key_char);
    if ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidUserId(id.to_string()))
    }
}

/// Validate a `/`-separated document key.
pub fn validate_document_key(key: &str) -> Result<(), ValidationError> {
    let ok = !key.is_empty()
        && key.split('/').all(|segment| {
            !segment.is_empty()
                && segment != "."
                && segment != ".."
                && segment.chars().all(is_key_char)
        });
    if ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, MemorySource};
    use chrono::Utc;

    fn record(id: i64) -> MemoryRecord {
        MemoryRecord {
            id: MemoryId::new(id),
            content: format!("fact {id}"),
            category: Category::Fact,
            timestamp: Utc::now(),
            source: MemorySource::Operator,
        }
    }

    #[test]
    fn test_validate_embedding_valid() {
        assert!(validate_embedding(&[0.1, 0.2, 0.3], 3).is_ok());
    }

    #[test]
    fn test_validate_embedding_dimension_mismatch() {
        let err = validate_embedding(&[0.1, 0.2], 3).unwrap_err();
        assert_eq!(
            err,
            ValidationError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_validate_embedding_non_finite() {
        let err = validate_embedding(&[f32::NAN, 1.0, f32::INFINITY], 3).unwrap_err();
        assert_eq!(err, ValidationError::InvalidEmbeddingValues { count: 2 });
    }

    #[test]
    fn test_validate_embedding_empty() {
        assert_eq!(
            validate_embedding(&[], 0).unwrap_err(),
            ValidationError::EmptyEmbedding
        );
    }

    #[test]
    fn test_validate_content() {
        assert!(validate_memory_content("likes tea").is_ok());
        assert_eq!(
            validate_memory_content("   ").unwrap_err(),
            ValidationError::EmptyContent
        );
        assert_eq!(
            validate_memory_content("a\0b").unwrap_err(),
            ValidationError::NullByte
        );
        let long = "x".repeat(MAX_CONTENT_CHARS + 1);
        assert!(matches!(
            validate_memory_content(&long),
            Err(ValidationError::ContentTooLong { .. })
        ));
    }

    #[test]
    fn test_validate_user_id() {
        assert!(validate_user_id(&UserId::from(42i64)).is_ok());
        assert!(validate_user_id(&UserId::from("-100123")).is_ok());
        assert!(validate_user_id(&UserId::from("")).is_err());
        assert!(validate_user_id(&UserId::from("../etc")).is_err());
        assert!(validate_user_id(&UserId::from("a b")).is_err());
    }

    #[test]
    fn test_validate_document_key() {
        assert!(validate_document_key("users/42/archive").is_ok());
        assert!(validate_document_key("users//archive").is_err());
        assert!(validate_document_key("users/../archive").is_err());
        assert!(validate_document_key("").is_err());
    }

    #[test]
    fn test_validate_record_order() {
        assert!(validate_record_order(&[record(1), record(2), record(5)]).is_ok());
        assert!(validate_record_order(&[record(2), record(2)]).is_err());
        assert!(validate_record_order(&[record(3), record(1)]).is_err());
    }
}

//! Error types for the agent crate.

use thiserror::Error;

/// Result type alias using the agent error type.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Error type for memory pipeline operations.
///
/// Provider failures are normally absorbed into neutral outcomes; what
/// reaches callers as an `AgentError` is almost always storage or setup.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Storage error.
    #[error("Memory error: {0}")]
    Memory(#[from] reverie_memory::MemoryError),

    /// LLM or embedding provider error.
    #[error("LLM error: {0}")]
    Llm(#[from] reverie_llm::LlmError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] reverie_config::ConfigError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::from(reverie_memory::MemoryError::NotFound("u1".into()));
        assert!(err.to_string().starts_with("Memory error:"));

        let err = AgentError::internal("boom");
        assert_eq!(err.to_string(), "Internal error: boom");
    }
}

//! Completion and embedding clients for Reverie.
//!
//! The core abstraction is the [`LlmBackend`] trait which all completion
//! providers implement, plus the [`Embedder`] trait for vector generation.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  ProviderChain (uniform timeout)        │
//! └─────────────────────────────────────────┘
//!                    │ tried in order
//!     ┌──────────────┼──────────────┐
//!     ▼              ▼              ▼
//! ┌──────────┐  ┌──────────┐  ┌────────┐
//! │OpenRouter│  │ DeepSeek │  │ Ollama │
//! └──────────┘  └──────────┘  └────────┘
//! ```

pub mod backend;
pub mod client;
pub mod embeddings;
pub mod error;
pub mod types;

// Provider implementations
pub mod openai;

pub use backend::{LlmBackend, MockBackend, SharedBackend, with_retry};
pub use error::{LlmError, RateLimitInfo, Result};
pub use types::{
    CompletionRequest, CompletionResponse, Message, ResponseFormat, Role, StopReason, Usage,
};

// Re-export embeddings
pub use embeddings::{
    DEFAULT_MAX_INPUT_CHARS, Embedder, EmbedderSpec, MockEmbedder, OpenAiEmbedder,
    OpenAiEmbedderConfig, SharedEmbedder, build_embedder, normalize_input,
};

// Re-export provider configs
pub use openai::{DEEPSEEK_BASE, OPENROUTER_BASE, OpenAiBackend, OpenAiConfig};

// Re-export client
pub use client::{Provider, ProviderChain, ProviderSpec, build_backend};

//! Memory pipeline for Reverie.
//!
//! This crate sits between the chat glue and storage:
//! - **Validator**: policy gate in front of every write
//! - **Retriever**: similarity search rendered as a reminiscence block
//! - **Consolidator**: replaces oversized scopes with dense insights
//! - **Profile updater**: derived user summary on a cooldown
//! - **Extractor**: candidate memories from a conversational turn
//! - **MemoryService**: the context object tying them together
//!
//! Every provider call goes through [`ExternalCalls`], which bounds
//! concurrency and applies one deadline. Provider failures degrade to
//! neutral outcomes instead of errors.

pub mod consolidator;
pub mod error;
pub mod extraction;
pub mod gateway;
pub mod parse;
pub mod profile;
pub mod retriever;
pub mod service;
pub mod validator;

pub use consolidator::{ConsolidationReport, ConsolidationTarget, Consolidator, parse_insights};
pub use error::{AgentError, Result};
pub use extraction::{Candidate, Extractor, parse_candidates};
pub use gateway::{DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_CONCURRENT_CALLS, ExternalCalls, UnavailableProvider};
pub use profile::{ProfileOutcome, ProfileUpdater};
pub use retriever::Retriever;
pub use service::{AddMemoryOutcome, MemoryService, ReindexReport};
pub use validator::{Validator, Verdict, parse_verdict};

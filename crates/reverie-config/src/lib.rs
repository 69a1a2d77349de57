//! Configuration system for the Reverie memory engine.
//!
//! Provides TOML-based configuration with:
//! - An ordered provider list for completions (`[[llm.providers]]`)
//! - Embedding endpoint settings (`[embedding]`)
//! - Memory thresholds: recall, validation, consolidation, profiling (`[memory.*]`)
//! - Config file layering (user config dir + project-local overrides)
//! - API key resolution (env var → config file)

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, save_config,
    user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use secrets::{ResolvedSecret, SecretSource, resolve_api_key};
pub use types::*;

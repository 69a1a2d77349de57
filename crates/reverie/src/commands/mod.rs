//! CLI command handlers.

pub mod consolidate;
pub mod list;
pub mod profile;
pub mod purge;
pub mod recall;
pub mod reindex;
pub mod remember;
pub mod stats;
pub mod wipe;

use anyhow::{Context as _, Result};
use console::{Style, style};
use serde::Serialize;

use reverie_agent::MemoryService;
use reverie_config::ReverieConfig;
use reverie_memory::{Category, MemoryRecord};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration.
    pub config: ReverieConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Build the memory service from the loaded configuration.
    pub fn service(&self) -> Result<MemoryService> {
        MemoryService::from_config(&self.config).context("failed to open memory store")
    }
}

/// Parse a `--category` value.
pub fn parse_category(raw: &str) -> Result<Category, String> {
    raw.parse::<Category>().map_err(|e| e.to_string())
}

/// Print any serializable value as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Bold title with a rule underneath.
pub fn print_header(title: &str) {
    println!("{}", style(title).bold());
    println!("{}", Style::new().dim().apply_to("─".repeat(50)));
}

/// One record as a listing line.
pub fn print_record(record: &MemoryRecord) {
    let dim = Style::new().dim();
    println!(
        "  {} {} {}",
        dim.apply_to(record.display_timestamp()),
        style(format!("[{}]", record.category)).cyan(),
        record.content
    );
}

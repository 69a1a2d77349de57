//! Reverie - per-user long-term memory for conversational agents
//!
//! Operator entry point: inspect and maintain memory stores.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use reverie_config::{LoadedConfig, LoggingConfig};

mod commands;

use commands::{consolidate, list, profile, purge, recall, reindex, remember, stats, wipe};

const CRATES: [&str; 5] = [
    "reverie",
    "reverie_agent",
    "reverie_llm",
    "reverie_memory",
    "reverie_config",
];

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Reverie - per-user long-term memory for conversational agents
#[derive(Parser)]
#[command(name = "reverie")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file to use instead of discovery
    #[arg(long, global = true, env = "REVERIE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate and store a memory for a user
    Remember(remember::RememberArgs),

    /// Show the reminiscence block for a query
    Recall(recall::RecallArgs),

    /// List a user's memories, newest first
    List(list::ListArgs),

    /// Show store statistics
    Stats(stats::StatsArgs),

    /// Compact categories that grew past the ceiling
    Consolidate(consolidate::ConsolidateArgs),

    /// Show or regenerate a user's profile
    Profile(profile::ProfileArgs),

    /// Drop orphan vectors and embed unindexed memories
    Reindex(reindex::ReindexArgs),

    /// Delete memories containing keywords
    Purge(purge::PurgeArgs),

    /// Delete everything stored for a user
    Wipe(wipe::WipeArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

fn directives(level: &str) -> String {
    let mut parts: Vec<String> = CRATES.iter().map(|c| format!("{c}={level}")).collect();
    parts.push("warn".to_string());
    parts.join(",")
}

/// Console layer on stderr plus an optional daily JSON file.
///
/// The returned guard flushes the file writer and must outlive `main`'s work.
fn init_tracing(verbose: bool, logging: &LoggingConfig) -> Option<WorkerGuard> {
    let console_filter = if verbose {
        EnvFilter::new(directives("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(&logging.level)))
    };

    let mut file_error = None;
    let (file_layer, guard) = if logging.file {
        let dir = logging.effective_dir();
        match RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("reverie")
            .filename_suffix("log")
            .build(&dir)
        {
            Ok(appender) => {
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_filter(EnvFilter::new(directives("trace")));
                (Some(layer), Some(guard))
            }
            Err(e) => {
                file_error = Some(format!("{}: {}", dir.display(), e));
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(verbose)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(file_layer)
        .init();

    if let Some(error) = file_error {
        tracing::warn!(error = %error, "File logging disabled");
    }
    guard
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

fn load(path: Option<&PathBuf>) -> Result<LoadedConfig> {
    match path {
        Some(path) => LoadedConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => reverie_config::load_config(None).context("failed to load config"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = load(cli.config.as_ref())?;
    let _guard = init_tracing(cli.verbose, &loaded.config.logging());
    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }
    tracing::debug!(sources = ?loaded.loaded_from(), "Configuration loaded");

    let ctx = commands::Context {
        config: loaded.config,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Remember(args) => remember::run(args, &ctx).await,
        Commands::Recall(args) => recall::run(args, &ctx).await,
        Commands::List(args) => list::run(args, &ctx).await,
        Commands::Stats(args) => stats::run(args, &ctx).await,
        Commands::Consolidate(args) => consolidate::run(args, &ctx).await,
        Commands::Profile(args) => profile::run(args, &ctx).await,
        Commands::Reindex(args) => reindex::run(args, &ctx).await,
        Commands::Purge(args) => purge::run(args, &ctx).await,
        Commands::Wipe(args) => wipe::run(args, &ctx).await,
    }
}

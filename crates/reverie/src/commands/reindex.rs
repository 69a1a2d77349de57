//! Reindex command - repair and fill the vector index.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde_json::json;

use reverie_memory::UserId;

use super::{Context, print_header, print_json};

/// Arguments for the reindex command.
#[derive(Args, Debug)]
pub struct ReindexArgs {
    /// User id
    pub user: String,
}

/// Run the reindex command.
pub async fn run(args: ReindexArgs, ctx: &Context) -> Result<()> {
    let service = ctx.service()?;
    let user = UserId::from(args.user);
    let report = service.reindex(&user).await?;

    if ctx.json_output {
        return print_json(&json!({
            "orphans_removed": report.orphans_removed,
            "indexed": report.indexed,
            "remaining": report.remaining,
        }));
    }

    print_header(&format!("Reindex for {}", user));
    println!("  Orphans removed:  {}", style(report.orphans_removed).cyan());
    println!("  Newly indexed:    {}", style(report.indexed).cyan());
    if report.remaining > 0 {
        println!(
            "  Still missing:    {}",
            Style::new()
                .yellow()
                .apply_to(format!("{} (embedder unavailable?)", report.remaining))
        );
    } else {
        println!("  Status:           {}", Style::new().green().apply_to("ok"));
    }
    Ok(())
}

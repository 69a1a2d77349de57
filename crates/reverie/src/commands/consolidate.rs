//! Consolidate command - compact oversized scopes now.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde_json::json;

use reverie_agent::ConsolidationReport;
use reverie_memory::{Category, UserId};

use super::{Context, parse_category, print_header, print_json};

/// Arguments for the consolidate command.
#[derive(Args, Debug)]
pub struct ConsolidateArgs {
    /// User id
    pub user: String,

    /// Only this category
    #[arg(short, long, value_parser = parse_category)]
    pub category: Option<Category>,

    /// Compact even under the ceiling
    #[arg(long)]
    pub force: bool,
}

/// Run the consolidate command.
pub async fn run(args: ConsolidateArgs, ctx: &Context) -> Result<()> {
    let service = ctx.service()?;
    let user = UserId::from(args.user);
    let reports = service.consolidate(&user, args.category, args.force).await?;

    if ctx.json_output {
        let value: Vec<_> = reports
            .iter()
            .map(|(target, report)| json!({ "target": target.to_string(), "result": report.to_string() }))
            .collect();
        return print_json(&value);
    }

    print_header(&format!("Consolidation for {}", user));
    if reports.is_empty() {
        println!("{}", Style::new().dim().apply_to("  Nothing over the ceiling"));
        return Ok(());
    }
    for (target, report) in &reports {
        let mark = match report {
            ConsolidationReport::Compacted { .. } => Style::new().green().apply_to("✓"),
            ConsolidationReport::Skipped { .. } => Style::new().dim().apply_to("-"),
            ConsolidationReport::Aborted { .. } => Style::new().yellow().apply_to("✗"),
        };
        println!("  {} {} {}", mark, style(format!("{:<11}", target.to_string())).cyan(), report);
    }
    Ok(())
}

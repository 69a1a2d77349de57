//! Stats command - record and vector counts.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use reverie_memory::{UserId, UserStats};

use super::{Context, print_header, print_json};

/// Arguments for the stats command.
#[derive(Args, Debug)]
pub struct StatsArgs {
    /// User id (all users if omitted)
    pub user: Option<String>,
}

/// Run the stats command.
pub async fn run(args: StatsArgs, ctx: &Context) -> Result<()> {
    let service = ctx.service()?;
    let stats = match args.user {
        Some(user) => vec![service.stats(&UserId::from(user))?],
        None => service.all_stats()?,
    };

    if ctx.json_output {
        return print_json(&stats);
    }

    print_header("Memory Statistics");
    if stats.is_empty() {
        println!("{}", Style::new().dim().apply_to("  No users yet"));
        return Ok(());
    }
    for entry in &stats {
        print_user(entry);
    }
    Ok(())
}

fn print_user(stats: &UserStats) {
    let dim = Style::new().dim();
    println!();
    println!("{}", style(&stats.user).bold());
    if !stats.initialized {
        println!("  {}", dim.apply_to("(no archive)"));
        return;
    }
    println!("  Records:     {}", style(stats.records).cyan());
    for (category, count) in &stats.by_category {
        println!("    {:<11} {}", category.as_str(), count);
    }
    println!("  Vectors:     {}", style(stats.vectors).cyan());
    match stats.dimensions {
        Some(dims) => println!("  Dimensions:  {}", style(dims).cyan()),
        None => println!("  Dimensions:  {}", dim.apply_to("-")),
    }
    if stats.vectors < stats.records {
        println!(
            "  Status:      {}",
            Style::new()
                .yellow()
                .apply_to(format!("{} unindexed, run `reverie reindex`", stats.records - stats.vectors))
        );
    }
    match stats.profile_updated_at {
        Some(at) => println!("  Profile:     {}", at.format("%Y-%m-%d %H:%M")),
        None => println!("  Profile:     {}", dim.apply_to("(none)")),
    }
}

//! List command - a user's memories, newest first.

use anyhow::Result;
use clap::Args;
use console::Style;

use reverie_memory::{Category, UserId};

use super::{Context, parse_category, print_header, print_json, print_record};

/// Arguments for the list command.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// User id
    pub user: String,

    /// Only this category
    #[arg(short, long, value_parser = parse_category)]
    pub category: Option<Category>,

    /// Maximum records to show
    #[arg(short, long)]
    pub limit: Option<usize>,
}

/// Run the list command.
pub async fn run(args: ListArgs, ctx: &Context) -> Result<()> {
    let service = ctx.service()?;
    let user = UserId::from(args.user);
    let records = service.list(&user, args.category, args.limit)?;

    if ctx.json_output {
        return print_json(&records);
    }

    print_header(&format!("Memories for {}", user));
    if records.is_empty() {
        println!("{}", Style::new().dim().apply_to("  (none)"));
        return Ok(());
    }
    for record in &records {
        print_record(record);
    }
    Ok(())
}

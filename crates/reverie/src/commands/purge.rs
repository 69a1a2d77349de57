//! Purge command - delete memories by keyword.

use anyhow::Result;
use clap::Args;
use console::Style;

use reverie_memory::UserId;

use super::{Context, print_header, print_json, print_record};

/// Arguments for the purge command.
#[derive(Args, Debug)]
pub struct PurgeArgs {
    /// User id
    pub user: String,

    /// Delete memories containing any of these (case-insensitive)
    #[arg(required = true, num_args = 1..)]
    pub keywords: Vec<String>,
}

/// Run the purge command.
pub async fn run(args: PurgeArgs, ctx: &Context) -> Result<()> {
    let service = ctx.service()?;
    let user = UserId::from(args.user);
    let removed = service.purge_keywords(&user, &args.keywords)?;

    if ctx.json_output {
        return print_json(&removed);
    }

    print_header(&format!("Purged {} memories for {}", removed.len(), user));
    if removed.is_empty() {
        println!("{}", Style::new().dim().apply_to("  Nothing matched"));
    }
    for record in &removed {
        print_record(record);
    }
    Ok(())
}

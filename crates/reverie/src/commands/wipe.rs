//! Wipe command - delete everything stored for a user.

use anyhow::{Result, bail};
use clap::Args;
use console::Style;
use serde_json::json;

use reverie_memory::UserId;

use super::{Context, print_json};

/// Arguments for the wipe command.
#[derive(Args, Debug)]
pub struct WipeArgs {
    /// User id
    pub user: String,

    /// Confirm deletion
    #[arg(long)]
    pub yes: bool,
}

/// Run the wipe command.
pub async fn run(args: WipeArgs, ctx: &Context) -> Result<()> {
    if !args.yes {
        bail!("refusing to wipe {} without --yes", args.user);
    }

    let service = ctx.service()?;
    let user = UserId::from(args.user);
    let removed = service.reset_user(&user)?;

    if ctx.json_output {
        return print_json(&json!({ "user": user, "removed": removed }));
    }

    if removed {
        println!("{} Wiped memories for {}", Style::new().green().apply_to("✓"), user);
    } else {
        println!("{}", Style::new().dim().apply_to(format!("Nothing stored for {}", user)));
    }
    Ok(())
}

//! Profile command - show or regenerate a user's derived profile.

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use serde_json::json;

use reverie_agent::ProfileOutcome;
use reverie_memory::{UserId, UserProfile};

use super::{Context, print_header, print_json};

/// Arguments for the profile command.
#[derive(Args, Debug)]
pub struct ProfileArgs {
    /// User id
    pub user: String,

    /// Regenerate even if the cooldown has not elapsed
    #[arg(long)]
    pub force: bool,
}

/// Run the profile command.
pub async fn run(args: ProfileArgs, ctx: &Context) -> Result<()> {
    let service = ctx.service()?;
    let user = UserId::from(args.user);

    let outcome = service.refresh_profile(&user, args.force).await?;
    let profile = service.profile(&user)?;

    if ctx.json_output {
        let status = match &outcome {
            ProfileOutcome::Updated(_) => json!({"status": "updated"}),
            ProfileOutcome::NotDue { reason } => json!({"status": "not_due", "reason": reason}),
            ProfileOutcome::Failed { reason } => json!({"status": "failed", "reason": reason}),
        };
        print_json(&json!({ "refresh": status, "profile": profile }))?;
    } else {
        let dim = Style::new().dim();
        match &outcome {
            ProfileOutcome::Updated(_) => {
                println!("{} Profile updated", Style::new().green().apply_to("✓"))
            }
            ProfileOutcome::NotDue { reason } => {
                println!("{}", dim.apply_to(format!("Not refreshed: {}", reason)))
            }
            ProfileOutcome::Failed { reason } => {
                println!("{} Refresh failed: {}", Style::new().yellow().apply_to("✗"), reason)
            }
        }
        print_header(&format!("Profile for {}", user));
        match &profile {
            Some(profile) => print_profile(profile),
            None => println!("{}", dim.apply_to("  (no profile yet)")),
        }
    }

    if let ProfileOutcome::Failed { reason } = outcome
        && args.force
    {
        bail!("profile refresh failed: {}", reason);
    }
    Ok(())
}

fn print_profile(profile: &UserProfile) {
    let dim = Style::new().dim();
    println!("{}", profile.summary);
    println!();
    if !profile.tags.is_empty() {
        let tags: Vec<String> = profile.tags.iter().map(|t| format!("#{}", t)).collect();
        println!("  {}", style(tags.join(" ")).cyan());
    }
    println!(
        "  {}",
        dim.apply_to(format!(
            "updated {} from {} records",
            profile.updated_at.format("%Y-%m-%d %H:%M"),
            profile.based_on
        ))
    );
}

//! Remember command - validate and store one memory.

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use serde_json::json;

use reverie_agent::AddMemoryOutcome;
use reverie_memory::{Category, MemorySource, UserId};

use super::{Context, parse_category, print_json};

/// Arguments for the remember command.
#[derive(Args, Debug)]
pub struct RememberArgs {
    /// User id
    pub user: String,

    /// The memory text
    #[arg(required = true, num_args = 1..)]
    pub text: Vec<String>,

    /// Category to file it under
    #[arg(short, long, default_value = "User", value_parser = parse_category)]
    pub category: Category,
}

/// Run the remember command.
pub async fn run(args: RememberArgs, ctx: &Context) -> Result<()> {
    let service = ctx.service()?;
    let user = UserId::from(args.user);
    let text = args.text.join(" ");

    let outcome = service
        .process_add_memory(&user, &text, args.category, MemorySource::Operator)
        .await;
    let finished = service.finish_background().await;

    if ctx.json_output {
        let value = match &outcome {
            AddMemoryOutcome::Saved {
                record,
                rewritten,
                indexed,
            } => json!({
                "status": "saved",
                "record": record,
                "rewritten": rewritten,
                "indexed": indexed,
                "consolidations": finished.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
            }),
            AddMemoryOutcome::Rejected { reason } => json!({"status": "rejected", "reason": reason}),
            AddMemoryOutcome::NotSaved { reason } => json!({"status": "not_saved", "reason": reason}),
        };
        print_json(&value)?;
    } else {
        match &outcome {
            AddMemoryOutcome::Saved {
                rewritten, indexed, ..
            } => {
                println!("{} {}", Style::new().green().apply_to("✓"), outcome);
                let dim = Style::new().dim();
                if *rewritten {
                    println!("  {}", dim.apply_to("(reworded by the validator)"));
                }
                if !*indexed {
                    println!("  {}", dim.apply_to("(not embedded yet, will be indexed on next recall)"));
                }
                for report in &finished {
                    println!("  {} {}", style("consolidation:").cyan(), report);
                }
            }
            AddMemoryOutcome::Rejected { .. } => {
                println!("{} {}", Style::new().yellow().apply_to("✗"), outcome);
            }
            AddMemoryOutcome::NotSaved { .. } => {}
        }
    }

    if let AddMemoryOutcome::NotSaved { reason } = outcome {
        bail!("memory not saved: {}", reason);
    }
    Ok(())
}

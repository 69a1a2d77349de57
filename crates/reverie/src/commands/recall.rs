//! Recall command - show what would be injected for a query.

use anyhow::Result;
use clap::Args;
use console::Style;
use serde_json::json;

use reverie_memory::UserId;

use super::{Context, print_json};

/// Arguments for the recall command.
#[derive(Args, Debug)]
pub struct RecallArgs {
    /// User id
    pub user: String,

    /// Query text
    #[arg(required = true, num_args = 1..)]
    pub query: Vec<String>,
}

/// Run the recall command.
pub async fn run(args: RecallArgs, ctx: &Context) -> Result<()> {
    let service = ctx.service()?;
    let user = UserId::from(args.user);
    let query = args.query.join(" ");
    let dim = Style::new().dim();

    if ctx.json_output {
        let hits = service.recall(&user, &query).await?;
        let hits: Vec<_> = hits
            .iter()
            .map(|hit| {
                json!({
                    "id": hit.record.id,
                    "content": hit.record.content,
                    "category": hit.record.category,
                    "timestamp": hit.record.timestamp,
                    "score": hit.score,
                })
            })
            .collect();
        return print_json(&json!({ "query": query, "hits": hits }));
    }

    if ctx.verbose {
        println!("{}", dim.apply_to(format!("Query: \"{}\"", query)));
        println!();
    }

    let context = service.get_relevant_context(&user, &query).await;
    if context.is_empty() {
        println!("{}", dim.apply_to("No relevant memories"));
    } else {
        println!("{}", context);
    }
    Ok(())
}

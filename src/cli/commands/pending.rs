//! gl pending - List verifications a verifier can vote on

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{self, HumanLayout};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct PendingArgs {
    pub verifier: String,

    /// Only requests from this guild
    #[arg(long)]
    pub guild: Option<String>,
}

pub fn run(ctx: &AppContext, args: &PendingArgs) -> Result<()> {
    let pending = ctx
        .engine
        .pending_verifications(&args.verifier, args.guild.as_deref())?;

    if ctx.robot_mode {
        return output::emit_json(&output::robot_ok(serde_json::json!({
            "verifier": args.verifier,
            "count": pending.len(),
            "pending": pending,
        })));
    }

    if pending.is_empty() {
        println!("Nothing awaiting a vote from {}", args.verifier);
        return Ok(());
    }

    let mut layout = HumanLayout::new();
    layout.title(&format!("Awaiting {} ({})", args.verifier, pending.len()));
    for item in &pending {
        let request = &item.request;
        layout.bullet(&format!(
            "{}  {} -> level {} {} [{}, {}/{} votes, opened {}]",
            request.id,
            request.key(),
            request.target_level,
            item.level_name,
            request.verification_strategy,
            request.approve_count + request.deny_count,
            request.quorum_size,
            output::format_time(&request.created_at),
        ));
    }
    output::emit_human(layout);
    Ok(())
}

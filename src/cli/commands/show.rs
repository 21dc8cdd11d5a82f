//! gl show - Show a verification request with its votes

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{self, HumanLayout};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Verification request id
    pub id: String,
}

pub fn run(ctx: &AppContext, args: &ShowArgs) -> Result<()> {
    let detail = ctx.engine.verification(&args.id)?;

    if ctx.robot_mode {
        return output::emit_json(&output::robot_ok(&detail));
    }

    let request = &detail.request;
    let mut layout = HumanLayout::new();
    layout
        .title(&format!("Verification {}", request.id))
        .kv("Candidate", &request.key().to_string())
        .kv("Target level", &request.target_level.to_string())
        .kv("Strategy", request.verification_strategy.as_str())
        .kv("Status", &request.status.to_string())
        .kv(
            "Tally",
            &format!(
                "{} approve / {} deny / {} defer (quorum {})",
                request.approve_count, request.deny_count, request.defer_count, request.quorum_size
            ),
        )
        .kv("Opened", &output::format_time(&request.created_at));
    if let Some(completed) = &request.completed_at {
        layout.kv("Completed", &output::format_time(completed));
    }

    if !detail.votes.is_empty() {
        layout.blank().section("Votes");
        for vote in &detail.votes {
            layout.bullet(&format!(
                "{} {} at {}",
                vote.verifier,
                vote.decision,
                output::format_time(&vote.created_at)
            ));
        }
    }
    if !detail.feedback.is_empty() {
        layout.blank().section("Feedback");
        for entry in &detail.feedback {
            layout.bullet(entry);
        }
    }
    output::emit_human(layout);
    Ok(())
}

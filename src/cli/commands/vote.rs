//! gl vote - Vote on a pending verification

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{self, HumanLayout};
use crate::core::{VerificationOutcome, VoteDecision};
use crate::error::Result;

use super::describe_event;

#[derive(Args, Debug)]
pub struct VoteArgs {
    /// Verification request id
    pub id: String,

    /// Member casting the vote
    pub verifier: String,

    /// approve, deny or defer
    pub decision: VoteDecision,

    /// Feedback appended to the request
    #[arg(long)]
    pub feedback: Option<String>,
}

pub fn run(ctx: &AppContext, args: &VoteArgs) -> Result<()> {
    let outcome = ctx.engine.record_vote(
        &args.id,
        &args.verifier,
        args.decision,
        args.feedback.as_deref(),
    )?;

    if ctx.robot_mode {
        return output::emit_json(&output::robot_ok(&outcome));
    }

    let request = &outcome.request;
    let result = match outcome.outcome {
        Some(VerificationOutcome::Approved) => format!("approved, level {} granted", request.target_level),
        Some(VerificationOutcome::Denied) => "denied".to_string(),
        None => "still pending".to_string(),
    };

    let mut layout = HumanLayout::new();
    layout
        .title(&format!(
            "{} voted {} on {}",
            outcome.vote.verifier, outcome.vote.decision, request.id
        ))
        .kv("Candidate", &request.key().to_string())
        .kv("Target level", &request.target_level.to_string())
        .kv(
            "Tally",
            &format!(
                "{} approve / {} deny / {} defer (quorum {})",
                request.approve_count, request.deny_count, request.defer_count, request.quorum_size
            ),
        )
        .kv("Result", &result);
    for event in &outcome.events {
        layout.bullet(&describe_event(event));
    }
    output::emit_human(layout);
    Ok(())
}

//! gl award - Award credits to a member

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{self, HumanLayout};
use crate::core::{CreditAward, CreditSource, ProgressKey};
use crate::error::Result;

use super::{describe_dispatch, describe_event};

#[derive(Args, Debug)]
pub struct AwardArgs {
    pub user: String,
    pub guild: String,
    pub skill: String,

    /// Credit amount (negative only for manual or migration corrections)
    #[arg(allow_negative_numbers = true)]
    pub amount: i64,

    /// Where the credits come from
    #[arg(long, default_value = "manual")]
    pub source: CreditSource,

    /// Identifier of the task, endorsement or assessment
    #[arg(long)]
    pub source_id: Option<String>,

    /// Member who reviewed the work
    #[arg(long)]
    pub reviewer: Option<String>,

    #[arg(long)]
    pub notes: Option<String>,
}

pub fn run(ctx: &AppContext, args: &AwardArgs) -> Result<()> {
    let key = ProgressKey::new(&args.user, &args.guild, &args.skill);
    let mut award = CreditAward::new(key, args.amount, args.source);
    if let Some(source_id) = &args.source_id {
        award = award.with_source_id(source_id);
    }
    if let Some(reviewer) = &args.reviewer {
        award = award.with_reviewer(reviewer);
    }
    if let Some(notes) = &args.notes {
        award = award.with_notes(notes);
    }

    let outcome = ctx.engine.award_credits(&award)?;

    if ctx.robot_mode {
        return output::emit_json(&output::robot_ok(&outcome));
    }

    let progress = &outcome.progress;
    let mut layout = HumanLayout::new();
    layout
        .title(&format!(
            "Awarded {} {} credits to {}",
            outcome.entry.amount,
            outcome.entry.source_type,
            award.key
        ))
        .kv("Level", &progress.current_level.to_string())
        .kv("Credits at level", &progress.credits_since_level.to_string())
        .kv("Result", &describe_dispatch(outcome.dispatch.as_ref()));
    for event in &outcome.events {
        layout.bullet(&describe_event(event));
    }
    output::emit_human(layout);
    Ok(())
}

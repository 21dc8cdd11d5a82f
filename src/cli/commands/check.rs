//! gl check - Re-check eligibility and dispatch if due

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{self, HumanLayout};
use crate::core::ProgressKey;
use crate::error::Result;

use super::{describe_dispatch, describe_event};

#[derive(Args, Debug)]
pub struct CheckArgs {
    pub user: String,
    pub guild: String,
    pub skill: String,

    /// Report the eligible level without dispatching
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(ctx: &AppContext, args: &CheckArgs) -> Result<()> {
    let key = ProgressKey::new(&args.user, &args.guild, &args.skill);

    if args.dry_run {
        let eligible = ctx.engine.check_eligibility(&key)?;
        if ctx.robot_mode {
            return output::emit_json(&output::robot_ok(serde_json::json!({
                "key": key,
                "eligible_level": eligible,
            })));
        }
        match eligible {
            Some(level) => println!("{key} is eligible for level {level}"),
            None => println!("{key} is not eligible to advance"),
        }
        return Ok(());
    }

    let outcome = ctx.engine.recheck(&key)?;
    if ctx.robot_mode {
        return output::emit_json(&output::robot_ok(&outcome));
    }

    let mut layout = HumanLayout::new();
    layout
        .title(&format!("Checked {key}"))
        .kv("Level", &outcome.progress.current_level.to_string())
        .kv("Credits at level", &outcome.progress.credits_since_level.to_string())
        .kv("Result", &describe_dispatch(outcome.dispatch.as_ref()));
    for event in &outcome.events {
        layout.bullet(&describe_event(event));
    }
    output::emit_human(layout);
    Ok(())
}

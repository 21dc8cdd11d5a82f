//! gl profile - Show a member's skill profile in a guild

use clap::Args;
use console::style;

use crate::app::AppContext;
use crate::cli::output::{self, HumanLayout};
use crate::engine::SkillSummary;
use crate::error::Result;

#[derive(Args, Debug)]
pub struct ProfileArgs {
    pub user: String,
    pub guild: String,
}

pub fn run(ctx: &AppContext, args: &ProfileArgs) -> Result<()> {
    let skills = ctx.engine.skill_profile(&args.user, &args.guild)?;

    if ctx.robot_mode {
        return output::emit_json(&output::robot_ok(serde_json::json!({
            "user": args.user,
            "guild": args.guild,
            "skills": skills,
        })));
    }

    let mut layout = HumanLayout::new();
    layout.title(&format!("{} in {}", args.user, args.guild));
    if skills.is_empty() {
        layout.push_line("No progress recorded yet.");
    }
    for summary in &skills {
        layout
            .section(&summary.skill)
            .kv("Level", &level_label(summary))
            .kv("Progress", &progress_label(summary))
            .kv("Days at level", &summary.days_at_level.to_string())
            .kv("Lifetime credits", &summary.lifetime_credits.to_string());
        if summary.pending_verification {
            layout.kv("Verification", &style("pending").yellow().to_string());
        }
        layout.blank();
    }
    output::emit_human(layout);
    Ok(())
}

fn level_label(summary: &SkillSummary) -> String {
    match &summary.level_name {
        Some(name) => format!("{} ({name})", summary.level),
        None => summary.level.to_string(),
    }
}

fn progress_label(summary: &SkillSummary) -> String {
    match (summary.credits_required, &summary.next_level_name) {
        (Some(required), Some(next)) => format!(
            "{}/{required} credits toward {next} ({}%)",
            summary.credits, summary.percent
        ),
        _ => format!("{} credits, top of ladder", summary.credits),
    }
}

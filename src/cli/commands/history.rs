//! gl history - Show credit history

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{self, HumanLayout};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    pub user: String,
    pub guild: String,

    /// Restrict to one skill
    #[arg(long)]
    pub skill: Option<String>,

    /// Maximum entries (default: credits.history_limit)
    #[arg(long)]
    pub limit: Option<usize>,
}

pub fn run(ctx: &AppContext, args: &HistoryArgs) -> Result<()> {
    let entries = ctx.engine.credit_history(
        &args.user,
        &args.guild,
        args.skill.as_deref(),
        args.limit,
    )?;

    if ctx.robot_mode {
        return output::emit_json(&output::robot_ok(serde_json::json!({
            "user": args.user,
            "guild": args.guild,
            "skill": args.skill,
            "entries": entries,
        })));
    }

    if entries.is_empty() {
        println!("No credits recorded for {} in {}", args.user, args.guild);
        return Ok(());
    }

    let mut layout = HumanLayout::new();
    layout.title(&format!("Credit history for {} in {}", args.user, args.guild));
    for entry in &entries {
        let mut line = format!(
            "{}  {:<12} {:>+6}  {}",
            output::format_time(&entry.created_at),
            entry.skill,
            entry.amount,
            entry.source_type,
        );
        if let Some(reviewer) = &entry.reviewer {
            line.push_str(&format!("  by {reviewer}"));
        }
        if let Some(notes) = &entry.notes {
            line.push_str(&format!("  ({notes})"));
        }
        layout.push_line(line);
    }
    output::emit_human(layout);
    Ok(())
}

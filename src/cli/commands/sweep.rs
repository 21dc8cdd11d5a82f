//! gl sweep - Expire stale pending verifications

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{self, HumanLayout};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct SweepArgs {}

pub fn run(ctx: &AppContext, _args: &SweepArgs) -> Result<()> {
    let report = ctx.engine.expire_stale()?;

    if ctx.robot_mode {
        return output::emit_json(&output::robot_ok(serde_json::json!({
            "expire_after": ctx.engine.settings().expire_after.map(|after| {
                humantime_serde::re::humantime::format_duration(after).to_string()
            }),
            "expired": report.expired,
        })));
    }

    if ctx.engine.settings().expire_after.is_none() {
        println!("Expiry is disabled (verification.expire_after is unset)");
        return Ok(());
    }
    if report.expired.is_empty() {
        println!("No stale verifications");
        return Ok(());
    }

    let mut layout = HumanLayout::new();
    layout.title(&format!("Expired {} verification(s)", report.expired.len()));
    for request in &report.expired {
        layout.bullet(&format!(
            "{}  {} -> level {} (opened {})",
            request.id,
            request.key(),
            request.target_level,
            output::format_time(&request.created_at)
        ));
    }
    output::emit_human(layout);
    Ok(())
}

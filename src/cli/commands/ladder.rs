//! gl ladder - Manage level ladders

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::app::AppContext;
use crate::cli::output::{self, HumanLayout};
use crate::core::{LadderFile, LevelDefinition, VerificationStrategy, validate_identifier};
use crate::error::{LadderError, Result};

#[derive(Args, Debug)]
pub struct LadderArgs {
    #[command(subcommand)]
    pub command: LadderCommand,
}

#[derive(Subcommand, Debug)]
pub enum LadderCommand {
    /// Install the default ladder for a skill
    Seed(SkillRef),

    /// Show the ladder for a skill
    Show(SkillRef),

    /// Create or update one level
    Set(SetArgs),

    /// Create or update levels from a TOML file
    Import(ImportArgs),
}

#[derive(Args, Debug)]
pub struct SkillRef {
    pub guild: String,
    pub skill: String,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    pub guild: String,
    pub skill: String,
    pub level: u32,

    /// Display name of the level
    #[arg(long)]
    pub name: Option<String>,

    /// Credits needed since the previous level
    #[arg(long)]
    pub credits: Option<i64>,

    /// Verification strategy (auto, mentor, peer, committee, assessment)
    #[arg(long)]
    pub strategy: Option<VerificationStrategy>,

    /// Minimum level a verifier needs in this skill
    #[arg(long)]
    pub verifier_min: Option<u32>,

    /// Votes needed to decide a peer verification
    #[arg(long)]
    pub quorum: Option<u32>,

    /// Days the member must hold the previous level
    #[arg(long)]
    pub tenure_days: Option<u32>,

    /// Contribution weight reported on grant
    #[arg(long)]
    pub weight: Option<i32>,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    pub guild: String,
    pub skill: String,

    /// TOML ladder file
    pub file: PathBuf,
}

pub fn run(ctx: &AppContext, args: &LadderArgs) -> Result<()> {
    match &args.command {
        LadderCommand::Seed(target) => {
            validate_identifier("guild", &target.guild)?;
            validate_identifier("skill", &target.skill)?;
            let levels = ctx.engine.seed_default_ladder(&target.guild, &target.skill)?;
            emit_ladder(ctx, &target.guild, &target.skill, &levels)
        }
        LadderCommand::Show(target) => {
            let levels = ctx.engine.ladder(&target.guild, &target.skill)?;
            if levels.is_empty() && !ctx.robot_mode {
                println!(
                    "No ladder for {}/{}. Seed one with: gl ladder seed {} {}",
                    target.guild, target.skill, target.guild, target.skill
                );
                return Ok(());
            }
            emit_ladder(ctx, &target.guild, &target.skill, &levels)
        }
        LadderCommand::Set(set) => {
            let def = merge_level(ctx, set)?;
            ctx.engine.upsert_level(&def)?;
            let levels = ctx.engine.ladder(&set.guild, &set.skill)?;
            emit_ladder(ctx, &set.guild, &set.skill, &levels)
        }
        LadderCommand::Import(import) => {
            let file = LadderFile::load(&import.file)?;
            let levels = ctx.engine.import_ladder(&import.guild, &import.skill, file)?;
            emit_ladder(ctx, &import.guild, &import.skill, &levels)
        }
    }
}

/// Existing values fill in whatever flags were omitted.
fn merge_level(ctx: &AppContext, args: &SetArgs) -> Result<LevelDefinition> {
    validate_identifier("guild", &args.guild)?;
    validate_identifier("skill", &args.skill)?;
    let existing = ctx
        .engine
        .ladder(&args.guild, &args.skill)?
        .into_iter()
        .find(|def| def.level == args.level);

    let def = match existing {
        Some(mut def) => {
            apply_overrides(&mut def, args);
            def
        }
        None => {
            let name = args.name.clone().ok_or_else(|| {
                LadderError::Validation(format!(
                    "level {} does not exist yet; --name is required",
                    args.level
                ))
            })?;
            let mut def = LevelDefinition {
                guild: args.guild.clone(),
                skill: args.skill.clone(),
                level: args.level,
                name,
                credits_required: 0,
                verification_strategy: VerificationStrategy::Auto,
                verifier_minimum_level: 0,
                quorum_size: 0,
                tenure_minimum_days: 0,
                weight: i32::try_from(args.level).unwrap_or(i32::MAX),
            };
            apply_overrides(&mut def, args);
            def
        }
    };
    def.validate()?;
    Ok(def)
}

fn apply_overrides(def: &mut LevelDefinition, args: &SetArgs) {
    if let Some(name) = &args.name {
        def.name.clone_from(name);
    }
    if let Some(credits) = args.credits {
        def.credits_required = credits;
    }
    if let Some(strategy) = args.strategy {
        def.verification_strategy = strategy;
    }
    if let Some(min) = args.verifier_min {
        def.verifier_minimum_level = min;
    }
    if let Some(quorum) = args.quorum {
        def.quorum_size = quorum;
    }
    if let Some(days) = args.tenure_days {
        def.tenure_minimum_days = days;
    }
    if let Some(weight) = args.weight {
        def.weight = weight;
    }
}

fn emit_ladder(ctx: &AppContext, guild: &str, skill: &str, levels: &[LevelDefinition]) -> Result<()> {
    if ctx.robot_mode {
        return output::emit_json(&output::robot_ok(serde_json::json!({
            "guild": guild,
            "skill": skill,
            "levels": levels,
        })));
    }

    let mut layout = HumanLayout::new();
    layout.title(&format!("Ladder {guild}/{skill}"));
    for def in levels {
        layout.push_line(format!(
            "{:>2}  {:<14} {:>5} credits  {:<10} min verifier {}  quorum {}  tenure {}d  weight {}",
            def.level,
            def.name,
            def.credits_required,
            def.verification_strategy.to_string(),
            def.verifier_minimum_level,
            def.quorum_size,
            def.tenure_minimum_days,
            def.weight,
        ));
    }
    output::emit_human(layout);
    Ok(())
}

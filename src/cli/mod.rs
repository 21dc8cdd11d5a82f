//! CLI module - Command-line interface definitions and handlers
//!
//! Uses clap v4 with derive macros for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod commands;
pub mod output;

/// Guild ladder - skill credits, level verification and progression
#[derive(Parser, Debug)]
#[command(name = "gl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable JSON output for machine consumption
    #[arg(long, global = true, env = "GL_ROBOT")]
    pub robot: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file path (default: ~/.config/guild-ladder/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding the database and event log
    #[arg(long, global = true, env = "GL_ROOT")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Explicit `--root`, or the platform data directory.
    #[must_use]
    pub fn data_root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("guild-ladder")
        })
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data directory, database and a starter config
    Init(commands::init::InitArgs),

    /// Manage level ladders
    Ladder(commands::ladder::LadderArgs),

    /// Award credits to a member
    Award(commands::award::AwardArgs),

    /// Vote on a pending verification
    Vote(commands::vote::VoteArgs),

    /// Re-check eligibility and dispatch if due
    Check(commands::check::CheckArgs),

    /// Show a member's skill profile in a guild
    Profile(commands::profile::ProfileArgs),

    /// List verifications a verifier can vote on
    Pending(commands::pending::PendingArgs),

    /// Show credit history
    History(commands::history::HistoryArgs),

    /// Show a verification request with its votes
    Show(commands::show::ShowArgs),

    /// Expire stale pending verifications
    Sweep(commands::sweep::SweepArgs),

    /// Manage configuration
    Config(commands::config::ConfigArgs),
}

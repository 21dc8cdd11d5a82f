//! CLI command implementations
//!
//! Each subcommand has its own module with:
//! - Args struct for command-line arguments
//! - `run()` function to execute the command

use crate::app::AppContext;
use crate::cli::{Cli, Commands};
use crate::engine::{Dispatch, ProgressionEvent};
use crate::error::Result;

pub mod award;
pub mod check;
pub mod config;
pub mod history;
pub mod init;
pub mod ladder;
pub mod pending;
pub mod profile;
pub mod show;
pub mod sweep;
pub mod vote;

/// Dispatch a command to its handler. Every command except `init` runs
/// against a loaded [`AppContext`].
pub fn run(cli: &Cli) -> Result<()> {
    let context = || AppContext::from_cli(cli);
    match &cli.command {
        Commands::Init(args) => init::run(cli, args),
        Commands::Ladder(args) => ladder::run(&context()?, args),
        Commands::Award(args) => award::run(&context()?, args),
        Commands::Vote(args) => vote::run(&context()?, args),
        Commands::Check(args) => check::run(&context()?, args),
        Commands::Profile(args) => profile::run(&context()?, args),
        Commands::Pending(args) => pending::run(&context()?, args),
        Commands::History(args) => history::run(&context()?, args),
        Commands::Show(args) => show::run(&context()?, args),
        Commands::Sweep(args) => sweep::run(&context()?, args),
        Commands::Config(args) => config::run(&context()?, args),
    }
}

pub(crate) fn describe_dispatch(dispatch: Option<&Dispatch>) -> String {
    match dispatch {
        Some(Dispatch::Granted { level }) => format!("granted level {level}"),
        Some(Dispatch::PendingRequest(request)) => format!(
            "{} verification {} opened for level {} (quorum {})",
            request.verification_strategy, request.id, request.target_level, request.quorum_size
        ),
        None => "no change".to_string(),
    }
}

pub(crate) fn describe_event(event: &ProgressionEvent) -> String {
    match event {
        ProgressionEvent::VerificationInitiated {
            verification_id,
            target_level,
            ..
        } => format!("verification {verification_id} initiated for level {target_level}"),
        ProgressionEvent::VerificationApproved {
            verification_id, ..
        } => format!("verification {verification_id} approved"),
        ProgressionEvent::VerificationDenied {
            verification_id, ..
        } => format!("verification {verification_id} denied"),
        ProgressionEvent::VerificationStalled {
            verification_id,
            defer_count,
            ..
        } => format!("verification {verification_id} stalled after {defer_count} defers"),
        ProgressionEvent::VerificationExpired {
            verification_id, ..
        } => format!("verification {verification_id} expired"),
        ProgressionEvent::LevelGranted {
            user,
            level,
            level_name,
            ..
        } => format!("{user} reached level {level} ({level_name})"),
    }
}

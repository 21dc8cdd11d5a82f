//! Core progression types and logic

pub mod ladder;
pub mod ledger;
pub mod progress;
pub mod verification;

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{LadderError, Result};

pub use ladder::{LadderFile, LevelDefinition, LevelLadder, LevelSpec, VerificationStrategy};
pub use ledger::{CreditAward, CreditEntry, CreditLedger, CreditSource};
pub use progress::MemberProgress;
pub use verification::{
    VerificationOutcome, VerificationRequest, VerificationStatus, VoteApplied, VoteDecision,
    VoteRecord, VoterStanding,
};

static IDENTIFIER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.@+\-]{0,127}$").expect("identifier regex")
});

/// Validate a user, guild or skill identifier.
pub fn validate_identifier(kind: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LadderError::Validation(format!("{kind} must not be empty")));
    }
    if !IDENTIFIER_REGEX.is_match(value) {
        return Err(LadderError::Validation(format!(
            "invalid {kind} '{value}' (expected letters, digits, '_', '-', '.', '@' or '+')"
        )));
    }
    Ok(())
}

/// Identity of one progress aggregate: a member's standing in one skill of one guild.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProgressKey {
    pub user: String,
    pub guild: String,
    pub skill: String,
}

impl ProgressKey {
    pub fn new(user: impl Into<String>, guild: impl Into<String>, skill: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            guild: guild.into(),
            skill: skill.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_identifier("user", &self.user)?;
        validate_identifier("guild", &self.guild)?;
        validate_identifier("skill", &self.skill)
    }
}

impl fmt::Display for ProgressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.user, self.guild, self.skill)
    }
}

//! Verification requests and the voting state machine.
//!
//! `pending -> approved | denied` through quorum evaluation after each vote.
//! `expired` is reached only through the expiry sweep. `deferred` is a
//! reserved status; nothing transitions into it, and defer votes never
//! resolve a request on their own.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LadderError, Result};

use super::{ProgressKey, VerificationStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Denied,
    Deferred,
    Expired,
}

impl VerificationStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Deferred => "deferred",
            Self::Expired => "expired",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Denied | Self::Expired)
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStatus {
    type Err = LadderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "denied" => Ok(Self::Denied),
            "deferred" => Ok(Self::Deferred),
            "expired" => Ok(Self::Expired),
            other => Err(LadderError::Serialization(format!(
                "unknown verification status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteDecision {
    Approve,
    Deny,
    Defer,
}

impl VoteDecision {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Deny => "deny",
            Self::Defer => "defer",
        }
    }
}

impl fmt::Display for VoteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteDecision {
    type Err = LadderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "approve" | "approved" | "yes" => Ok(Self::Approve),
            "deny" | "denied" | "no" => Ok(Self::Deny),
            "defer" | "deferred" => Ok(Self::Defer),
            other => Err(LadderError::Validation(format!(
                "unknown vote decision '{other}' (expected approve|deny|defer)"
            ))),
        }
    }
}

/// Terminal result of quorum evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    Approved,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub id: String,
    pub verification_id: String,
    pub verifier: String,
    pub decision: VoteDecision,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What the store knows about a verifier at vote time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoterStanding {
    /// Verifier's own level in the request's (guild, skill)
    pub level: u32,
    pub already_voted: bool,
}

/// Result of applying one vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteApplied {
    pub vote: VoteRecord,
    pub outcome: Option<VerificationOutcome>,
}

/// One advancement attempt for a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub id: String,
    pub user: String,
    pub guild: String,
    pub skill: String,
    pub target_level: u32,
    pub status: VerificationStatus,
    pub verification_strategy: VerificationStrategy,
    pub quorum_size: u32,
    pub approve_count: u32,
    pub deny_count: u32,
    pub defer_count: u32,
    /// Audit trail, newest entry first
    pub feedback: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl VerificationRequest {
    #[must_use]
    pub fn new(
        key: &ProgressKey,
        target_level: u32,
        strategy: VerificationStrategy,
        quorum_size: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user: key.user.clone(),
            guild: key.guild.clone(),
            skill: key.skill.clone(),
            target_level,
            status: VerificationStatus::Pending,
            verification_strategy: strategy,
            quorum_size,
            approve_count: 0,
            deny_count: 0,
            defer_count: 0,
            feedback: String::new(),
            created_at: now,
            completed_at: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> ProgressKey {
        ProgressKey::new(&self.user, &self.guild, &self.skill)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == VerificationStatus::Pending
    }

    /// Check every vote precondition without mutating.
    ///
    /// Order matters: a closed request rejects everyone, and a self-vote is
    /// rejected regardless of tallies or levels.
    pub fn ensure_can_vote(
        &self,
        verifier: &str,
        standing: VoterStanding,
        required_level: u32,
    ) -> Result<()> {
        if !self.is_pending() {
            return Err(LadderError::InvalidState {
                id: self.id.clone(),
                status: self.status.to_string(),
            });
        }
        if verifier == self.user {
            return Err(LadderError::SelfVote(verifier.to_string()));
        }
        if standing.already_voted {
            return Err(LadderError::DuplicateVote {
                id: self.id.clone(),
                verifier: verifier.to_string(),
            });
        }
        if standing.level < required_level {
            return Err(LadderError::VerifierIneligible {
                verifier: verifier.to_string(),
                actual: standing.level,
                required: required_level,
            });
        }
        Ok(())
    }

    /// Apply a vote and evaluate quorum.
    #[allow(clippy::too_many_arguments)]
    pub fn record_vote(
        &mut self,
        verifier: &str,
        decision: VoteDecision,
        feedback: Option<&str>,
        standing: VoterStanding,
        required_level: u32,
        delimiter: &str,
        now: DateTime<Utc>,
    ) -> Result<VoteApplied> {
        self.ensure_can_vote(verifier, standing, required_level)?;

        match decision {
            VoteDecision::Approve => self.approve_count += 1,
            VoteDecision::Deny => self.deny_count += 1,
            VoteDecision::Defer => self.defer_count += 1,
        }

        let feedback = feedback.map(str::trim).filter(|text| !text.is_empty());
        if let Some(text) = feedback {
            self.push_feedback(verifier, decision, text, delimiter, now);
        }

        let vote = VoteRecord {
            id: Uuid::new_v4().to_string(),
            verification_id: self.id.clone(),
            verifier: verifier.to_string(),
            decision,
            feedback: feedback.map(str::to_string),
            created_at: now,
        };
        let outcome = self.evaluate(now);
        Ok(VoteApplied { vote, outcome })
    }

    /// Resolve once a tally first reaches quorum. Approval is checked first,
    /// so it wins if both tallies reach quorum on the same vote.
    pub fn evaluate(&mut self, now: DateTime<Utc>) -> Option<VerificationOutcome> {
        if !self.is_pending() || self.quorum_size == 0 {
            return None;
        }
        let outcome = if self.approve_count >= self.quorum_size {
            VerificationOutcome::Approved
        } else if self.deny_count >= self.quorum_size {
            VerificationOutcome::Denied
        } else {
            return None;
        };
        self.status = match outcome {
            VerificationOutcome::Approved => VerificationStatus::Approved,
            VerificationOutcome::Denied => VerificationStatus::Denied,
        };
        self.completed_at = Some(now);
        Some(outcome)
    }

    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.is_pending() {
            return Err(LadderError::InvalidState {
                id: self.id.clone(),
                status: self.status.to_string(),
            });
        }
        self.status = VerificationStatus::Expired;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Audit entries, newest first.
    #[must_use]
    pub fn feedback_entries(&self, delimiter: &str) -> Vec<&str> {
        if self.feedback.is_empty() {
            return Vec::new();
        }
        self.feedback.split(delimiter).collect()
    }

    fn push_feedback(
        &mut self,
        verifier: &str,
        decision: VoteDecision,
        text: &str,
        delimiter: &str,
        now: DateTime<Utc>,
    ) {
        let text = flatten_delimiter(text, delimiter);
        let entry = format!(
            "[{}] {verifier} ({decision}): {text}",
            now.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        self.feedback = if self.feedback.is_empty() {
            entry
        } else {
            format!("{entry}{delimiter}{}", self.feedback)
        };
    }
}

/// One vote must stay one trail entry, so delimiter text inside feedback is
/// folded to spaces.
fn flatten_delimiter(text: &str, delimiter: &str) -> String {
    let mut text = text.to_string();
    if delimiter.trim().is_empty() {
        return text;
    }
    while text.contains(delimiter) {
        text = text.replace(delimiter, " ");
    }
    text
}

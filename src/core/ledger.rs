//! Append-only credit ledger.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{LadderError, Result};
use crate::storage::ProgressStore;

use super::ProgressKey;

/// Where a credit award came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditSource {
    TaskReview,
    Endorsement,
    Assessment,
    Time,
    Manual,
    Migration,
}

impl CreditSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TaskReview => "task_review",
            Self::Endorsement => "endorsement",
            Self::Assessment => "assessment",
            Self::Time => "time",
            Self::Manual => "manual",
            Self::Migration => "migration",
        }
    }

    /// Sources allowed to post negative correction entries.
    #[must_use]
    pub const fn allows_correction(&self) -> bool {
        matches!(self, Self::Manual | Self::Migration)
    }
}

impl fmt::Display for CreditSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CreditSource {
    type Err = LadderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "task_review" => Ok(Self::TaskReview),
            "endorsement" => Ok(Self::Endorsement),
            "assessment" => Ok(Self::Assessment),
            "time" => Ok(Self::Time),
            "manual" => Ok(Self::Manual),
            "migration" => Ok(Self::Migration),
            other => Err(LadderError::Validation(format!(
                "unknown credit source '{other}' (expected task_review|endorsement|assessment|time|manual|migration)"
            ))),
        }
    }
}

/// Inbound request to credit a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditAward {
    pub key: ProgressKey,
    pub amount: i64,
    pub source_type: CreditSource,
    pub source_id: Option<String>,
    pub reviewer: Option<String>,
    pub notes: Option<String>,
}

impl CreditAward {
    pub fn new(key: ProgressKey, amount: i64, source_type: CreditSource) -> Self {
        Self {
            key,
            amount,
            source_type,
            source_id: None,
            reviewer: None,
            notes: None,
        }
    }

    #[must_use]
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    #[must_use]
    pub fn with_reviewer(mut self, reviewer: impl Into<String>) -> Self {
        self.reviewer = Some(reviewer.into());
        self
    }

    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Zero is never valid; negative amounts are corrections and need both the
    /// setting and a correction-capable source.
    pub fn validate(&self, allow_corrections: bool) -> Result<()> {
        self.key.validate()?;
        let valid = match self.amount {
            0 => false,
            amount if amount < 0 => allow_corrections && self.source_type.allows_correction(),
            _ => true,
        };
        if !valid {
            return Err(LadderError::InvalidAmount {
                amount: self.amount,
                source_type: self.source_type.to_string(),
            });
        }
        Ok(())
    }
}

/// Immutable ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditEntry {
    pub id: String,
    pub user: String,
    pub guild: String,
    pub skill: String,
    pub amount: i64,
    pub source_type: CreditSource,
    pub source_id: Option<String>,
    pub reviewer: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CreditEntry {
    #[must_use]
    pub fn from_award(award: &CreditAward, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user: award.key.user.clone(),
            guild: award.key.guild.clone(),
            skill: award.key.skill.clone(),
            amount: award.amount,
            source_type: award.source_type,
            source_id: award.source_id.clone(),
            reviewer: award.reviewer.clone(),
            notes: award.notes.clone(),
            created_at: now,
        }
    }
}

/// Ledger access through a store. Appending never touches progress.
pub struct CreditLedger<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: ProgressStore + ?Sized> CreditLedger<'a, S> {
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn append(&self, award: &CreditAward, now: DateTime<Utc>) -> Result<CreditEntry> {
        let entry = CreditEntry::from_award(award, now);
        self.store.append_credit(&entry)?;
        debug!(
            "Ledger +{} {} for {} ({})",
            entry.amount, entry.source_type, award.key, entry.id
        );
        Ok(entry)
    }

    /// Most recent first.
    pub fn history(
        &self,
        user: &str,
        guild: &str,
        skill: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CreditEntry>> {
        self.store.credit_history(user, guild, skill, limit)
    }

    /// Lifetime credits for a key, corrections included.
    pub fn total(&self, key: &ProgressKey) -> Result<i64> {
        self.store.credit_total(key)
    }
}

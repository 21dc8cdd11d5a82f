//! Member progress aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LadderError, Result};
use crate::storage::ProgressStore;

use super::ProgressKey;

/// A member's standing in one skill of one guild.
///
/// `grant_level` deliberately leaves credits and the pending flag alone; the
/// engine resets both as part of the same transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProgress {
    pub user: String,
    pub guild: String,
    pub skill: String,
    /// 0 means no level held yet
    pub current_level: u32,
    pub credits_since_level: i64,
    pub level_achieved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub pending_verification: bool,
    /// Optimistic concurrency token, 0 until first saved
    pub version: u64,
}

impl MemberProgress {
    #[must_use]
    pub fn new(key: &ProgressKey, now: DateTime<Utc>) -> Self {
        Self {
            user: key.user.clone(),
            guild: key.guild.clone(),
            skill: key.skill.clone(),
            current_level: 0,
            credits_since_level: 0,
            level_achieved_at: None,
            created_at: now,
            pending_verification: false,
            version: 0,
        }
    }

    /// Existing row, or a fresh unsaved default.
    pub fn load_or_create<S: ProgressStore + ?Sized>(
        store: &S,
        key: &ProgressKey,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(store
            .load_progress(key)?
            .unwrap_or_else(|| Self::new(key, now)))
    }

    #[must_use]
    pub fn key(&self) -> ProgressKey {
        ProgressKey::new(&self.user, &self.guild, &self.skill)
    }

    /// Negative correction amounts saturate at zero.
    pub fn add_credits(&mut self, amount: i64) {
        self.credits_since_level = self.credits_since_level.saturating_add(amount).max(0);
    }

    pub fn grant_level(&mut self, level: u32, now: DateTime<Utc>) -> Result<()> {
        if level <= self.current_level {
            return Err(LadderError::Validation(format!(
                "cannot grant level {level} to {} already at level {}",
                self.key(),
                self.current_level
            )));
        }
        self.current_level = level;
        self.level_achieved_at = Some(now);
        Ok(())
    }

    pub fn reset_credits(&mut self) {
        self.credits_since_level = 0;
    }

    /// Whole days since the level was reached, or since the row was created.
    #[must_use]
    pub fn days_at_current_level(&self, now: DateTime<Utc>) -> i64 {
        let since = self.level_achieved_at.unwrap_or(self.created_at);
        (now - since).num_days().max(0)
    }

    pub fn set_pending_verification(&mut self, pending: bool) {
        self.pending_verification = pending;
    }
}

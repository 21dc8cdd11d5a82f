//! Storage layer for guild-ladder
//!
//! [`ProgressStore`] is the single repository seam the engine talks to.
//! [`Database`] implements it on SQLite.

pub mod migrations;
pub mod sqlite;

pub use sqlite::Database;

use crate::core::{
    CreditEntry, LevelDefinition, MemberProgress, ProgressKey, VerificationRequest, VoteRecord,
};
use crate::error::Result;

/// Repository interface over the five logical tables.
///
/// Implementations must enforce the uniqueness keys themselves: one level per
/// (guild, skill, level), one progress row per key, one vote per
/// (verification, verifier). `save_progress` performs an optimistic version
/// check and bumps `version` on success.
pub trait ProgressStore {
    /// Run `f` inside a write transaction; any error rolls everything back.
    fn transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T>;

    fn get_level(&self, guild: &str, skill: &str, level: u32) -> Result<Option<LevelDefinition>>;
    fn list_levels(&self, guild: &str, skill: &str) -> Result<Vec<LevelDefinition>>;
    /// Plain insert; a duplicate (guild, skill, level) is a storage error.
    fn insert_level(&self, level: &LevelDefinition) -> Result<()>;
    fn upsert_level(&self, level: &LevelDefinition) -> Result<()>;

    fn append_credit(&self, entry: &CreditEntry) -> Result<()>;
    fn credit_history(
        &self,
        user: &str,
        guild: &str,
        skill: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CreditEntry>>;
    fn credit_total(&self, key: &ProgressKey) -> Result<i64>;

    fn load_progress(&self, key: &ProgressKey) -> Result<Option<MemberProgress>>;
    fn list_progress(&self, user: &str, guild: &str) -> Result<Vec<MemberProgress>>;
    fn save_progress(&self, progress: &mut MemberProgress) -> Result<()>;

    fn insert_verification(&self, request: &VerificationRequest) -> Result<()>;
    fn get_verification(&self, id: &str) -> Result<Option<VerificationRequest>>;
    fn update_verification(&self, request: &VerificationRequest) -> Result<()>;
    fn list_pending_verifications(&self, guild: Option<&str>) -> Result<Vec<VerificationRequest>>;

    fn has_voted(&self, verification_id: &str, verifier: &str) -> Result<bool>;
    /// Insert a vote; a second vote by the same verifier fails with `DuplicateVote`.
    fn insert_vote(&self, vote: &VoteRecord) -> Result<()>;
    fn list_votes(&self, verification_id: &str) -> Result<Vec<VoteRecord>>;
}

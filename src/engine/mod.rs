//! Progression engine
//!
//! Orchestrates ladders, the credit ledger, member progress and verification
//! requests. Mutations on one (user, guild, skill) are serialized through a
//! key lock and run inside a single store transaction; events are delivered
//! to the ports only after that transaction has committed.

pub mod clock;
pub mod events;
pub mod locks;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::core::{
    validate_identifier, CreditAward, CreditEntry, CreditLedger, LadderFile, LevelDefinition,
    LevelLadder, MemberProgress, ProgressKey, VerificationOutcome, VerificationRequest,
    VoteDecision, VoteRecord, VoterStanding,
};
use crate::error::{LadderError, Result};
use crate::storage::ProgressStore;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{
    EventBus, JsonlEventLog, NotificationPort, ProgressionEvent, ScoringPort, TracingNotifier,
};
pub use locks::KeyedLocks;

/// Engine knobs, usually taken from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub feedback_delimiter: String,
    /// Emit `VerificationStalled` when the defer tally reaches this count
    pub defer_escalation_threshold: Option<u32>,
    /// Pending requests older than this are expired by the sweep
    pub expire_after: Option<Duration>,
    pub allow_corrections: bool,
    pub history_limit: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            feedback_delimiter: "\n---\n".to_string(),
            defer_escalation_threshold: Some(3),
            expire_after: None,
            allow_corrections: true,
            history_limit: 50,
        }
    }
}

impl EngineSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            feedback_delimiter: config.verification.feedback_delimiter.clone(),
            defer_escalation_threshold: config.verification.defer_escalation_threshold,
            expire_after: config.verification.expire_after,
            allow_corrections: config.credits.allow_corrections,
            history_limit: config.credits.history_limit,
        }
    }
}

/// Result of dispatching an eligible member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dispatch {
    /// Auto strategy: the level was granted on the spot.
    Granted { level: u32 },
    /// A verification request was opened.
    PendingRequest(VerificationRequest),
}

#[derive(Debug, Clone, Serialize)]
pub struct AwardOutcome {
    pub entry: CreditEntry,
    pub progress: MemberProgress,
    pub dispatch: Option<Dispatch>,
    pub events: Vec<ProgressionEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecheckOutcome {
    pub progress: MemberProgress,
    pub dispatch: Option<Dispatch>,
    pub events: Vec<ProgressionEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteOutcome {
    pub request: VerificationRequest,
    pub vote: VoteRecord,
    pub outcome: Option<VerificationOutcome>,
    /// Candidate progress after a terminal outcome
    pub progress: Option<MemberProgress>,
    pub events: Vec<ProgressionEvent>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub expired: Vec<VerificationRequest>,
    pub events: Vec<ProgressionEvent>,
}

/// Per-skill line of a member's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillSummary {
    pub skill: String,
    pub level: u32,
    pub level_name: Option<String>,
    pub credits: i64,
    pub credits_required: Option<i64>,
    /// 0-100; 100 once the ladder is exhausted
    pub percent: u8,
    pub days_at_level: i64,
    pub pending_verification: bool,
    pub next_level_name: Option<String>,
    pub lifetime_credits: i64,
}

/// A request a verifier may vote on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingVerification {
    pub request: VerificationRequest,
    pub level_name: String,
    pub verifier_minimum_level: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationDetail {
    pub request: VerificationRequest,
    pub votes: Vec<VoteRecord>,
    pub feedback: Vec<String>,
}

pub struct ProgressionEngine<S> {
    store: Mutex<S>,
    locks: KeyedLocks<ProgressKey>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    settings: EngineSettings,
}

impl<S> std::fmt::Debug for ProgressionEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressionEngine")
            .field("events", &self.events)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<S: ProgressStore> ProgressionEngine<S> {
    pub fn new(store: S, settings: EngineSettings) -> Self {
        Self {
            store: Mutex::new(store),
            locks: KeyedLocks::new(),
            clock: Arc::new(SystemClock),
            events: EventBus::new(),
            settings,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationPort>) -> Self {
        self.events.add_notifier(notifier);
        self
    }

    #[must_use]
    pub fn with_scoring(mut self, scoring: Arc<dyn ScoringPort>) -> Self {
        self.events.set_scoring(scoring);
        self
    }

    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Direct store access for read-only inspection.
    pub fn store(&self) -> MutexGuard<'_, S> {
        self.store.lock()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ------------------------------------------------------------------
    // Ladder administration
    // ------------------------------------------------------------------

    pub fn seed_default_ladder(&self, guild: &str, skill: &str) -> Result<Vec<LevelDefinition>> {
        let store = self.store.lock();
        store.transaction(|store| LevelLadder::new(store).seed_default(guild, skill))
    }

    pub fn upsert_level(&self, def: &LevelDefinition) -> Result<()> {
        let store = self.store.lock();
        store.transaction(|store| LevelLadder::new(store).upsert(def))
    }

    pub fn import_ladder(
        &self,
        guild: &str,
        skill: &str,
        file: LadderFile,
    ) -> Result<Vec<LevelDefinition>> {
        validate_identifier("guild", guild)?;
        validate_identifier("skill", skill)?;
        let store = self.store.lock();
        store.transaction(|store| LevelLadder::new(store).import(guild, skill, file))
    }

    pub fn ladder(&self, guild: &str, skill: &str) -> Result<Vec<LevelDefinition>> {
        LevelLadder::new(&*self.store.lock()).levels(guild, skill)
    }

    // ------------------------------------------------------------------
    // Credits and eligibility
    // ------------------------------------------------------------------

    /// Append to the ledger, credit progress, then check and dispatch.
    ///
    /// Not idempotent: every call appends a ledger row.
    pub fn award_credits(&self, award: &CreditAward) -> Result<AwardOutcome> {
        award.validate(self.settings.allow_corrections)?;
        let key = &award.key;
        let _key_guard = self.locks.lock(key);
        let now = self.clock.now();

        let outcome = {
            let store = self.store.lock();
            store.transaction(|store| {
                let entry = CreditLedger::new(store).append(award, now)?;
                let mut progress = MemberProgress::load_or_create(store, key, now)?;
                progress.add_credits(award.amount);
                store.save_progress(&mut progress)?;

                let mut events = Vec::new();
                let dispatch = self.check_and_dispatch(store, &mut progress, now, &mut events)?;
                Ok(AwardOutcome {
                    entry,
                    progress,
                    dispatch,
                    events,
                })
            })?
        };

        info!(
            "Awarded {} {} credits to {} (level {}, {} since level)",
            award.amount,
            award.source_type,
            key,
            outcome.progress.current_level,
            outcome.progress.credits_since_level
        );
        self.events.deliver(&outcome.events);
        Ok(outcome)
    }

    /// Next level the member qualifies for, without side effects.
    pub fn check_eligibility(&self, key: &ProgressKey) -> Result<Option<u32>> {
        key.validate()?;
        let now = self.clock.now();
        let store = self.store.lock();
        let progress = MemberProgress::load_or_create(&*store, key, now)?;
        Ok(self
            .eligible_level(&*store, &progress, now)?
            .map(|def| def.level))
    }

    /// Re-run eligibility and dispatch without awarding anything.
    pub fn recheck(&self, key: &ProgressKey) -> Result<RecheckOutcome> {
        key.validate()?;
        let _key_guard = self.locks.lock(key);
        let now = self.clock.now();

        let outcome = {
            let store = self.store.lock();
            store.transaction(|store| {
                let mut progress = MemberProgress::load_or_create(store, key, now)?;
                let mut events = Vec::new();
                let dispatch = self.check_and_dispatch(store, &mut progress, now, &mut events)?;
                Ok(RecheckOutcome {
                    progress,
                    dispatch,
                    events,
                })
            })?
        };

        self.events.deliver(&outcome.events);
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Voting
    // ------------------------------------------------------------------

    pub fn record_vote(
        &self,
        verification_id: &str,
        verifier: &str,
        decision: VoteDecision,
        feedback: Option<&str>,
    ) -> Result<VoteOutcome> {
        validate_identifier("verifier", verifier)?;

        // The candidate's key lock guards the one pending request of that key.
        let key = self.with_store(|store| {
            store
                .get_verification(verification_id)?
                .map(|request| request.key())
                .ok_or_else(|| LadderError::VerificationNotFound(verification_id.to_string()))
        })?;
        let _key_guard = self.locks.lock(&key);
        let now = self.clock.now();

        let outcome = {
            let store = self.store.lock();
            store.transaction(|store| {
                self.apply_vote(store, verification_id, verifier, decision, feedback, now)
            })?
        };

        info!(
            "Vote {} by {} on {} ({}/{}, status {})",
            decision,
            verifier,
            verification_id,
            outcome.request.approve_count,
            outcome.request.deny_count,
            outcome.request.status
        );
        self.events.deliver(&outcome.events);
        Ok(outcome)
    }

    fn apply_vote(
        &self,
        store: &S,
        verification_id: &str,
        verifier: &str,
        decision: VoteDecision,
        feedback: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<VoteOutcome> {
        let mut request = store
            .get_verification(verification_id)?
            .ok_or_else(|| LadderError::VerificationNotFound(verification_id.to_string()))?;
        let target = self.level_definition(store, &request.key(), request.target_level)?;

        let verifier_key = ProgressKey::new(verifier, &request.guild, &request.skill);
        let standing = VoterStanding {
            level: store
                .load_progress(&verifier_key)?
                .map_or(0, |progress| progress.current_level),
            already_voted: store.has_voted(&request.id, verifier)?,
        };

        let applied = request.record_vote(
            verifier,
            decision,
            feedback,
            standing,
            target.verifier_minimum_level,
            &self.settings.feedback_delimiter,
            now,
        )?;
        store.insert_vote(&applied.vote)?;
        store.update_verification(&request)?;

        let mut events = Vec::new();
        if decision == VoteDecision::Defer
            && request.is_pending()
            && self.settings.defer_escalation_threshold == Some(request.defer_count)
        {
            events.push(ProgressionEvent::stalled(&request, now));
        }

        let progress = match applied.outcome {
            Some(VerificationOutcome::Approved) => {
                events.push(ProgressionEvent::approved(&request, now));
                let mut progress = MemberProgress::load_or_create(store, &request.key(), now)?;
                self.grant(store, &mut progress, &target, now, &mut events)?;
                Some(progress)
            }
            Some(VerificationOutcome::Denied) => {
                events.push(ProgressionEvent::denied(&request, now));
                Some(self.deny_outcome(store, &request, now)?)
            }
            None => None,
        };

        Ok(VoteOutcome {
            request,
            vote: applied.vote,
            outcome: applied.outcome,
            progress,
            events,
        })
    }

    // ------------------------------------------------------------------
    // Expiry
    // ------------------------------------------------------------------

    /// Expire pending requests older than `expire_after`. Credits are kept.
    pub fn expire_stale(&self) -> Result<SweepReport> {
        let Some(max_age) = self.settings.expire_after else {
            debug!("Expiry sweep disabled");
            return Ok(SweepReport::default());
        };
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|err| LadderError::Config(format!("verification.expire_after: {err}")))?;
        let now = self.clock.now();
        let cutoff = now.checked_sub_signed(max_age).ok_or_else(|| {
            LadderError::Config("verification.expire_after reaches before the calendar start".to_string())
        })?;

        let stale: Vec<VerificationRequest> = self
            .with_store(|store| store.list_pending_verifications(None))?
            .into_iter()
            .filter(|request| request.created_at <= cutoff)
            .collect();

        let mut report = SweepReport::default();
        for candidate in stale {
            let key = candidate.key();
            let _key_guard = self.locks.lock(&key);
            let expired = {
                let store = self.store.lock();
                store.transaction(|store| {
                    let Some(mut request) = store.get_verification(&candidate.id)? else {
                        return Ok(None);
                    };
                    if !request.is_pending() {
                        return Ok(None);
                    }
                    request.expire(now)?;
                    store.update_verification(&request)?;
                    if let Some(mut progress) = store.load_progress(&key)? {
                        progress.set_pending_verification(false);
                        store.save_progress(&mut progress)?;
                    }
                    Ok(Some(request))
                })?
            };

            if let Some(request) = expired {
                info!("Expired verification {} for {}", request.id, key);
                report.events.push(ProgressionEvent::expired(&request, now));
                report.expired.push(request);
            }
        }

        self.events.deliver(&report.events);
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn progress(&self, key: &ProgressKey) -> Result<Option<MemberProgress>> {
        self.with_store(|store| store.load_progress(key))
    }

    pub fn skill_profile(&self, user: &str, guild: &str) -> Result<Vec<SkillSummary>> {
        validate_identifier("user", user)?;
        validate_identifier("guild", guild)?;
        let now = self.clock.now();
        let store = self.store.lock();

        let mut summaries = Vec::new();
        for progress in store.list_progress(user, guild)? {
            let current = if progress.current_level == 0 {
                None
            } else {
                store.get_level(guild, &progress.skill, progress.current_level)?
            };
            let next = store.get_level(guild, &progress.skill, progress.current_level + 1)?;

            summaries.push(SkillSummary {
                level: progress.current_level,
                level_name: current.map(|def| def.name),
                credits: progress.credits_since_level,
                credits_required: next.as_ref().map(|def| def.credits_required),
                percent: percent_toward(progress.credits_since_level, next.as_ref()),
                days_at_level: progress.days_at_current_level(now),
                pending_verification: progress.pending_verification,
                next_level_name: next.map(|def| def.name),
                lifetime_credits: CreditLedger::new(&*store).total(&progress.key())?,
                skill: progress.skill,
            });
        }
        debug!("Built profile for {}@{} ({} skills)", user, guild, summaries.len());
        Ok(summaries)
    }

    /// Open requests the verifier is eligible for and has not voted on.
    pub fn pending_verifications(
        &self,
        verifier: &str,
        guild: Option<&str>,
    ) -> Result<Vec<PendingVerification>> {
        validate_identifier("verifier", verifier)?;
        let store = self.store.lock();

        let mut pending = Vec::new();
        for request in store.list_pending_verifications(guild)? {
            if request.user == verifier {
                continue;
            }
            let Some(target) =
                store.get_level(&request.guild, &request.skill, request.target_level)?
            else {
                continue;
            };
            let verifier_level = store
                .load_progress(&ProgressKey::new(verifier, &request.guild, &request.skill))?
                .map_or(0, |progress| progress.current_level);
            if verifier_level < target.verifier_minimum_level
                || store.has_voted(&request.id, verifier)?
            {
                continue;
            }
            pending.push(PendingVerification {
                request,
                level_name: target.name,
                verifier_minimum_level: target.verifier_minimum_level,
            });
        }
        Ok(pending)
    }

    /// Most recent first; `limit` defaults to `credits.history_limit`.
    pub fn credit_history(
        &self,
        user: &str,
        guild: &str,
        skill: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<CreditEntry>> {
        let limit = limit.unwrap_or(self.settings.history_limit);
        CreditLedger::new(&*self.store.lock()).history(user, guild, skill, limit)
    }

    pub fn verification(&self, id: &str) -> Result<VerificationDetail> {
        let store = self.store.lock();
        let request = store
            .get_verification(id)?
            .ok_or_else(|| LadderError::VerificationNotFound(id.to_string()))?;
        let votes = store.list_votes(id)?;
        let feedback = request
            .feedback_entries(&self.settings.feedback_delimiter)
            .into_iter()
            .map(str::to_string)
            .collect();
        Ok(VerificationDetail {
            request,
            votes,
            feedback,
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn with_store<T>(&self, f: impl FnOnce(&S) -> Result<T>) -> Result<T> {
        let store = self.store.lock();
        f(&store)
    }

    fn level_definition(&self, store: &S, key: &ProgressKey, level: u32) -> Result<LevelDefinition> {
        store
            .get_level(&key.guild, &key.skill, level)?
            .ok_or_else(|| LadderError::LevelNotDefined {
                guild: key.guild.clone(),
                skill: key.skill.clone(),
                level,
            })
    }

    fn eligible_level(
        &self,
        store: &S,
        progress: &MemberProgress,
        now: DateTime<Utc>,
    ) -> Result<Option<LevelDefinition>> {
        if progress.pending_verification {
            return Ok(None);
        }
        let next = progress.current_level + 1;
        let Some(def) = LevelLadder::new(store).get_level(&progress.guild, &progress.skill, next)?
        else {
            return Ok(None);
        };
        if progress.credits_since_level < def.credits_required {
            return Ok(None);
        }
        if progress.days_at_current_level(now) < i64::from(def.tenure_minimum_days) {
            return Ok(None);
        }
        Ok(Some(def))
    }

    fn check_and_dispatch(
        &self,
        store: &S,
        progress: &mut MemberProgress,
        now: DateTime<Utc>,
        events: &mut Vec<ProgressionEvent>,
    ) -> Result<Option<Dispatch>> {
        match self.eligible_level(store, progress, now)? {
            Some(def) => self.dispatch(store, progress, &def, now, events).map(Some),
            None => Ok(None),
        }
    }

    fn dispatch(
        &self,
        store: &S,
        progress: &mut MemberProgress,
        def: &LevelDefinition,
        now: DateTime<Utc>,
        events: &mut Vec<ProgressionEvent>,
    ) -> Result<Dispatch> {
        if !def.verification_strategy.requires_vote() {
            self.grant(store, progress, def, now, events)?;
            return Ok(Dispatch::Granted { level: def.level });
        }

        let request = VerificationRequest::new(
            &progress.key(),
            def.level,
            def.verification_strategy,
            def.quorum_size,
            now,
        );
        store.insert_verification(&request)?;
        progress.set_pending_verification(true);
        store.save_progress(progress)?;

        info!(
            "Opened {} verification {} for {} -> level {}",
            def.verification_strategy,
            request.id,
            progress.key(),
            def.level
        );
        events.push(ProgressionEvent::initiated(&request));
        Ok(Dispatch::PendingRequest(request))
    }

    fn grant(
        &self,
        store: &S,
        progress: &mut MemberProgress,
        def: &LevelDefinition,
        now: DateTime<Utc>,
        events: &mut Vec<ProgressionEvent>,
    ) -> Result<()> {
        progress.grant_level(def.level, now)?;
        progress.reset_credits();
        progress.set_pending_verification(false);
        store.save_progress(progress)?;

        info!("Granted level {} ({}) to {}", def.level, def.name, progress.key());
        events.push(ProgressionEvent::LevelGranted {
            user: progress.user.clone(),
            guild: progress.guild.clone(),
            skill: progress.skill.clone(),
            level: def.level,
            level_name: def.name.clone(),
            weight: def.weight,
            at: now,
        });
        Ok(())
    }

    fn deny_outcome(
        &self,
        store: &S,
        request: &VerificationRequest,
        now: DateTime<Utc>,
    ) -> Result<MemberProgress> {
        let mut progress = MemberProgress::load_or_create(store, &request.key(), now)?;
        progress.set_pending_verification(false);
        store.save_progress(&mut progress)?;
        info!(
            "Denied level {} for {}; credits kept at {}",
            request.target_level,
            progress.key(),
            progress.credits_since_level
        );
        Ok(progress)
    }
}

fn percent_toward(credits: i64, next: Option<&LevelDefinition>) -> u8 {
    let Some(next) = next else {
        return 100;
    };
    if next.credits_required <= 0 {
        return 100;
    }
    let pct = credits.saturating_mul(100) / next.credits_required;
    u8::try_from(pct.clamp(0, 100)).unwrap_or(100)
}

//! Random award, vote and time sequences must keep progress consistent.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use proptest::prelude::*;

use guild_ladder::core::{
    CreditAward, CreditSource, MemberProgress, ProgressKey, VerificationOutcome, VoteDecision,
};
use guild_ladder::engine::{
    Clock, EngineSettings, ManualClock, ProgressionEngine, ProgressionEvent,
};
use guild_ladder::storage::{Database, ProgressStore};

const GUILD: &str = "g";
const SKILL: &str = "s";
const CANDIDATES: [&str; 3] = ["ana", "ben", "cas"];
const VERIFIERS: [&str; 4] = ["v1", "v2", "v3", "v4"];

#[derive(Debug, Clone)]
enum Op {
    Award { who: usize, amount: i64 },
    Advance { days: i64 },
    Vote { candidate: usize, verifier: usize, decision: VoteDecision },
    Recheck { who: usize },
}

fn arb_decision() -> impl Strategy<Value = VoteDecision> {
    prop_oneof![
        3 => Just(VoteDecision::Approve),
        2 => Just(VoteDecision::Deny),
        1 => Just(VoteDecision::Defer),
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..CANDIDATES.len(), 1i64..200).prop_map(|(who, amount)| Op::Award { who, amount }),
        2 => (0i64..120).prop_map(|days| Op::Advance { days }),
        4 => (0..CANDIDATES.len(), 0..VERIFIERS.len(), arb_decision()).prop_map(
            |(candidate, verifier, decision)| Op::Vote { candidate, verifier, decision }
        ),
        1 => (0..CANDIDATES.len()).prop_map(|who| Op::Recheck { who }),
    ]
}

fn key(user: &str) -> ProgressKey {
    ProgressKey::new(user, GUILD, SKILL)
}

fn engine() -> (ProgressionEngine<Database>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = ProgressionEngine::new(Database::open_in_memory().unwrap(), EngineSettings::default())
        .with_clock(clock.clone());
    engine.seed_default_ladder(GUILD, SKILL).unwrap();
    {
        let store = engine.store();
        for verifier in VERIFIERS {
            let mut progress = MemberProgress::new(&key(verifier), clock.now());
            for level in 1..=4 {
                progress.grant_level(level, clock.now()).unwrap();
            }
            store.save_progress(&mut progress).unwrap();
        }
    }
    (engine, clock)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn progress_stays_consistent(ops in prop::collection::vec(arb_op(), 1..60)) {
        let (engine, clock) = engine();
        let mut last_level: HashMap<&str, u32> = HashMap::new();
        let mut grants: HashMap<String, u32> = HashMap::new();
        let mut resolved: HashMap<String, VerificationOutcome> = HashMap::new();

        for op in ops {
            let events = match op {
                Op::Award { who, amount } => engine
                    .award_credits(&CreditAward::new(key(CANDIDATES[who]), amount, CreditSource::TaskReview))
                    .unwrap()
                    .events,
                Op::Advance { days } => {
                    clock.advance(Duration::days(days));
                    Vec::new()
                }
                Op::Recheck { who } => engine.recheck(&key(CANDIDATES[who])).unwrap().events,
                Op::Vote { candidate, verifier, decision } => {
                    let pending = engine.store().list_pending_verifications(Some(GUILD)).unwrap();
                    let Some(request) = pending.into_iter().find(|r| r.user == CANDIDATES[candidate]) else {
                        continue;
                    };
                    match engine.record_vote(&request.id, VERIFIERS[verifier], decision, None) {
                        Ok(outcome) => {
                            if let Some(result) = outcome.outcome {
                                prop_assert!(
                                    resolved.insert(request.id.clone(), result).is_none(),
                                    "request resolved twice"
                                );
                            }
                            outcome.events
                        }
                        // Votes already cast by this verifier are expected noise.
                        Err(guild_ladder::LadderError::DuplicateVote { .. }) => Vec::new(),
                        Err(other) => return Err(TestCaseError::fail(format!("vote failed: {other}"))),
                    }
                }
            };

            for event in &events {
                if let ProgressionEvent::LevelGranted { user, level, .. } = event {
                    let previous = grants.insert(user.clone(), *level).unwrap_or(0);
                    prop_assert_eq!(*level, previous + 1, "levels advance one at a time");
                }
            }

            let pending = engine.store().list_pending_verifications(Some(GUILD)).unwrap();
            for user in CANDIDATES {
                let Some(progress) = engine.progress(&key(user)).unwrap() else {
                    continue;
                };
                let before = last_level.insert(user, progress.current_level).unwrap_or(0);
                prop_assert!(progress.current_level >= before, "level decreased for {}", user);
                prop_assert!(progress.current_level <= 4);
                prop_assert!(progress.credits_since_level >= 0);

                let open = pending.iter().filter(|r| r.user == user).count();
                prop_assert!(open <= 1, "{} has {} open requests", user, open);
                prop_assert_eq!(progress.pending_verification, open == 1);
                prop_assert_eq!(progress.current_level, grants.get(user).copied().unwrap_or(0));
            }
        }
    }

    #[test]
    fn ledger_total_matches_awards(amounts in prop::collection::vec(1i64..500, 1..30)) {
        let (engine, _clock) = engine();
        for amount in &amounts {
            engine
                .award_credits(&CreditAward::new(key("ana"), *amount, CreditSource::Endorsement))
                .unwrap();
        }
        let history = engine.credit_history("ana", GUILD, Some(SKILL), Some(amounts.len())).unwrap();
        prop_assert_eq!(history.len(), amounts.len());
        let total: i64 = history.iter().map(|entry| entry.amount).sum();
        prop_assert_eq!(total, amounts.iter().sum::<i64>());
        let profile = engine.skill_profile("ana", GUILD).unwrap();
        prop_assert_eq!(profile[0].lifetime_credits, total);
    }
}

use std::sync::Arc;

use chrono::{Duration, Utc};
use guild_ladder::core::{CreditAward, CreditSource, MemberProgress, ProgressKey, VoteDecision};
use guild_ladder::engine::{
    Clock, Dispatch, EngineSettings, JsonlEventLog, ManualClock, NotificationPort, ProgressionEngine,
    ProgressionEvent, ScoringPort,
};
use guild_ladder::storage::{Database, ProgressStore};
use guild_ladder::{LadderError, Result};
use parking_lot::Mutex;
use tempfile::TempDir;

use super::fixture::{key, GUILD, SKILL};

#[derive(Default)]
struct RecordingScorer {
    grants: Mutex<Vec<(ProgressKey, u32, i32)>>,
}

impl ScoringPort for RecordingScorer {
    fn level_granted(&self, key: &ProgressKey, level: u32, weight: i32) -> Result<()> {
        self.grants.lock().push((key.clone(), level, weight));
        Ok(())
    }
}

struct DownMailer;

impl NotificationPort for DownMailer {
    fn notify(&self, _event: &ProgressionEvent) -> Result<()> {
        Err(LadderError::Validation("smtp unavailable".to_string()))
    }
}

struct Setup {
    _dir: TempDir,
    log: Arc<JsonlEventLog>,
    scorer: Arc<RecordingScorer>,
    clock: Arc<ManualClock>,
    engine: ProgressionEngine<Database>,
}

fn setup(settings: EngineSettings) -> Setup {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(JsonlEventLog::new(dir.path().join("events.jsonl")));
    let scorer = Arc::new(RecordingScorer::default());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = ProgressionEngine::new(Database::open_in_memory().unwrap(), settings)
        .with_clock(clock.clone())
        .with_notifier(Arc::new(DownMailer))
        .with_notifier(log.clone())
        .with_scoring(scorer.clone());
    engine.seed_default_ladder(GUILD, SKILL).unwrap();
    Setup {
        _dir: dir,
        log,
        scorer,
        clock,
        engine,
    }
}

fn join(setup: &Setup, user: &str) {
    setup
        .engine
        .award_credits(&CreditAward::new(key(user), 1, CreditSource::Manual))
        .unwrap();
}

fn place(setup: &Setup, user: &str, level: u32) {
    let store = setup.engine.store();
    let now = setup.clock.now();
    let mut progress = MemberProgress::new(&key(user), now);
    for next in 1..=level {
        progress.grant_level(next, now).unwrap();
    }
    store.save_progress(&mut progress).unwrap();
}

#[test]
fn grants_reach_scoring_even_when_a_notifier_fails() {
    let setup = setup(EngineSettings::default());
    join(&setup, "ana");

    let grants = setup.scorer.grants.lock().clone();
    assert_eq!(grants, vec![(key("ana"), 1, 10)]);

    let events = setup.log.read_all().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        ProgressionEvent::LevelGranted { level: 1, level_name, .. } if level_name == "Apprentice"
    ));
}

#[test]
fn rolled_back_mutations_emit_nothing() {
    let setup = setup(EngineSettings::default());
    let err = setup
        .engine
        .award_credits(&CreditAward::new(key("ana"), -5, CreditSource::TaskReview))
        .unwrap_err();
    assert!(matches!(err, LadderError::InvalidAmount { .. }));
    assert!(setup.log.read_all().unwrap().is_empty());
    assert!(setup.scorer.grants.lock().is_empty());
}

#[test]
fn stalled_event_fires_once_at_threshold() {
    let setup = setup(EngineSettings {
        defer_escalation_threshold: Some(2),
        ..EngineSettings::default()
    });
    for verifier in ["bo", "cy", "di", "ed"] {
        place(&setup, verifier, 4);
    }
    place(&setup, "ana", 3);
    setup.clock.advance(Duration::days(181));

    let outcome = setup
        .engine
        .award_credits(&CreditAward::new(key("ana"), 400, CreditSource::Assessment))
        .unwrap();
    let Some(Dispatch::PendingRequest(request)) = outcome.dispatch else {
        panic!("expected committee request");
    };
    assert_eq!(request.quorum_size, 3);

    for verifier in ["bo", "cy", "di"] {
        setup
            .engine
            .record_vote(&request.id, verifier, VoteDecision::Defer, None)
            .unwrap();
    }

    let events = setup.log.read_all().unwrap();
    let stalled: Vec<_> = events
        .iter()
        .filter(|event| matches!(event, ProgressionEvent::VerificationStalled { .. }))
        .collect();
    assert_eq!(stalled.len(), 1);
    assert!(matches!(
        stalled[0],
        ProgressionEvent::VerificationStalled { defer_count: 2, .. }
    ));

    let detail = setup.engine.verification(&request.id).unwrap();
    assert!(detail.request.is_pending());
    assert_eq!(detail.request.defer_count, 3);
}

#[test]
fn approval_reports_weight_of_granted_level() {
    let setup = setup(EngineSettings::default());
    place(&setup, "mentor", 3);

    join(&setup, "ana");
    setup.clock.advance(Duration::days(30));
    let outcome = setup
        .engine
        .award_credits(&CreditAward::new(key("ana"), 50, CreditSource::Endorsement))
        .unwrap();
    let Some(Dispatch::PendingRequest(request)) = outcome.dispatch else {
        panic!("expected mentor request");
    };
    setup
        .engine
        .record_vote(&request.id, "mentor", VoteDecision::Approve, None)
        .unwrap();

    let grants = setup.scorer.grants.lock().clone();
    assert_eq!(grants.last(), Some(&(key("ana"), 2, 20)));

    let names: Vec<&str> = setup
        .log
        .read_all()
        .unwrap()
        .iter()
        .map(ProgressionEvent::name)
        .collect();
    assert_eq!(
        names,
        [
            "level_granted",
            "verification_initiated",
            "verification_approved",
            "level_granted"
        ]
    );
}

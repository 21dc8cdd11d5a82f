use guild_ladder::core::{CreditAward, CreditSource, LadderFile, VerificationStatus, VoteDecision};
use guild_ladder::engine::{EngineSettings, ProgressionEngine};
use guild_ladder::storage::{Database, ProgressStore};
use guild_ladder::LadderError;

use super::fixture::{key, EngineFixture, GUILD, SKILL};

#[test]
fn state_survives_reopen() {
    let fixture = EngineFixture::new();
    fixture.place("mentor", 3);
    let id = fixture.open_level_two_request("ana");
    fixture
        .engine
        .record_vote(&id, "mentor", VoteDecision::Defer, Some("one more review"))
        .unwrap();

    let reopened = ProgressionEngine::new(
        Database::open(&fixture.db_path).unwrap(),
        EngineSettings::default(),
    )
    .with_clock(fixture.clock.clone());

    let progress = reopened.progress(&key("ana")).unwrap().unwrap();
    assert_eq!(progress.current_level, 1);
    assert_eq!(progress.credits_since_level, 60);
    assert!(progress.pending_verification);

    let detail = reopened.verification(&id).unwrap();
    assert_eq!(detail.request.status, VerificationStatus::Pending);
    assert_eq!(detail.request.defer_count, 1);
    assert_eq!(detail.votes.len(), 1);
    assert_eq!(detail.feedback.len(), 1);

    assert_eq!(reopened.ladder(GUILD, SKILL).unwrap().len(), 4);
    assert_eq!(reopened.credit_history("ana", GUILD, None, None).unwrap().len(), 2);
}

#[test]
fn reopening_keeps_schema_version() {
    let fixture = EngineFixture::new();
    let first = fixture.engine.store().schema_version();
    let reopened = Database::open(&fixture.db_path).unwrap();
    assert_eq!(reopened.schema_version(), first);
    assert!(reopened.integrity_check().unwrap());
}

#[test]
fn one_pending_request_per_member_skill() {
    let fixture = EngineFixture::new();
    let id = fixture.open_level_two_request("ana");

    // A second award while pending must not dispatch again.
    let outcome = fixture.award("ana", 40);
    assert!(outcome.dispatch.is_none());
    assert!(outcome.events.is_empty());

    let pending = fixture.engine.store().list_pending_verifications(Some(GUILD)).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
}

#[test]
fn ladder_import_creates_and_updates_levels() {
    let fixture = EngineFixture::new();
    let file = LadderFile::parse(
        r#"
        [[level]]
        level = 1
        name = "Novice"

        [[level]]
        level = 2
        name = "Fluent"
        credits_required = 10
        strategy = "committee"
        verifier_minimum_level = 2
        quorum_size = 2
        "#,
    )
    .unwrap();

    let levels = fixture.engine.import_ladder(GUILD, "german", file.clone()).unwrap();
    assert_eq!(levels.len(), 2);
    let stored = fixture.engine.ladder(GUILD, "german").unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].name, "Fluent");
    assert_eq!(stored[1].quorum_size, 2);

    // Existing rungs are overwritten, higher ones are left alone.
    fixture.engine.import_ladder(GUILD, SKILL, file).unwrap();
    let stored = fixture.engine.ladder(GUILD, SKILL).unwrap();
    assert_eq!(stored.len(), 4);
    assert_eq!(stored[0].name, "Novice");
    assert_eq!(stored[3].name, "Master");
}

#[test]
fn ladder_import_rejects_gaps() {
    let fixture = EngineFixture::new();
    let file = LadderFile::parse(
        r#"
        [[level]]
        level = 1
        name = "Novice"

        [[level]]
        level = 3
        name = "Skipped"
        "#,
    )
    .unwrap();

    let err = fixture.engine.import_ladder(GUILD, SKILL, file).unwrap_err();
    assert!(matches!(err, LadderError::InvalidLadder(_)), "{err}");
    assert_eq!(fixture.engine.ladder(GUILD, SKILL).unwrap().len(), 4);
}

#[test]
fn awarding_without_a_ladder_reports_no_level() {
    let fixture = EngineFixture::new();
    let engine = ProgressionEngine::new(Database::open_in_memory().unwrap(), EngineSettings::default())
        .with_clock(fixture.clock.clone());
    let outcome = engine
        .award_credits(&CreditAward::new(key("ana"), 10, CreditSource::Endorsement))
        .unwrap();
    assert!(outcome.dispatch.is_none());
    assert_eq!(outcome.progress.current_level, 0);
    assert_eq!(outcome.progress.credits_since_level, 10);
}

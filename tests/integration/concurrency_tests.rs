use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use guild_ladder::core::{CreditAward, CreditSource, ProgressKey, VerificationOutcome, VoteDecision};
use guild_ladder::engine::{Dispatch, ProgressionEvent};
use guild_ladder::LadderError;

use super::fixture::{key, EngineFixture, GUILD};

#[test]
fn concurrent_awards_open_one_request() {
    let fixture = EngineFixture::new();
    fixture.award("ana", 5);
    fixture.clock.advance(chrono::Duration::days(40));

    let dispatched = AtomicUsize::new(0);
    let initiated = AtomicUsize::new(0);
    let engine = &fixture.engine;
    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                let outcome = engine
                    .award_credits(&CreditAward::new(key("ana"), 10, CreditSource::TaskReview))
                    .unwrap();
                if matches!(outcome.dispatch, Some(Dispatch::PendingRequest(_))) {
                    dispatched.fetch_add(1, Ordering::SeqCst);
                }
                let opened = outcome
                    .events
                    .iter()
                    .filter(|event| matches!(event, ProgressionEvent::VerificationInitiated { .. }))
                    .count();
                initiated.fetch_add(opened, Ordering::SeqCst);
            });
        }
    });

    assert_eq!(dispatched.load(Ordering::SeqCst), 1);
    assert_eq!(initiated.load(Ordering::SeqCst), 1);
    let progress = engine.progress(&key("ana")).unwrap().unwrap();
    assert_eq!(progress.credits_since_level, 80);
    assert!(progress.pending_verification);
    assert_eq!(
        engine.credit_history("ana", GUILD, None, Some(100)).unwrap().len(),
        9
    );
}

#[test]
fn concurrent_awards_to_different_members_do_not_interfere() {
    let fixture = EngineFixture::new();
    let users: Vec<String> = (0..6).map(|n| format!("member{n}")).collect();

    thread::scope(|scope| {
        for user in &users {
            let engine = &fixture.engine;
            scope.spawn(move || {
                for _ in 0..5 {
                    engine
                        .award_credits(&CreditAward::new(key(user), 3, CreditSource::Time))
                        .unwrap();
                }
            });
        }
    });

    for user in &users {
        let progress = fixture.engine.progress(&key(user)).unwrap().unwrap();
        assert_eq!(progress.current_level, 1);
        // First award was consumed by the level 1 grant.
        assert_eq!(progress.credits_since_level, 12);
    }
}

#[test]
fn concurrent_votes_resolve_exactly_once() {
    let fixture = EngineFixture::new();
    for verifier in ["bo", "cy", "di", "ed", "fu"] {
        fixture.place(verifier, 4);
    }
    // Level 3 uses peer review with a quorum of 2.
    fixture.place("ana", 2);
    fixture.clock.advance(chrono::Duration::days(91));
    let id = match fixture.award("ana", 150).dispatch {
        Some(Dispatch::PendingRequest(request)) => request.id,
        other => panic!("expected a pending request, got {other:?}"),
    };

    let approved = AtomicUsize::new(0);
    let closed = AtomicUsize::new(0);
    let engine = &fixture.engine;
    thread::scope(|scope| {
        for verifier in ["bo", "cy", "di", "ed", "fu"] {
            let id = id.as_str();
            let (approved, closed) = (&approved, &closed);
            scope.spawn(move || {
                match engine.record_vote(id, verifier, VoteDecision::Approve, None) {
                    Ok(outcome) => {
                        if outcome.outcome == Some(VerificationOutcome::Approved) {
                            approved.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    Err(LadderError::InvalidState { .. }) => {
                        closed.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(other) => panic!("unexpected error: {other}"),
                }
            });
        }
    });

    assert_eq!(approved.load(Ordering::SeqCst), 1);
    assert_eq!(closed.load(Ordering::SeqCst), 3);
    let detail = engine.verification(&id).unwrap();
    assert_eq!(detail.request.approve_count, 2);
    assert_eq!(detail.votes.len(), 2);

    let progress = engine.progress(&ProgressKey::new("ana", GUILD, "french")).unwrap().unwrap();
    assert_eq!(progress.current_level, 3);
    assert_eq!(progress.credits_since_level, 0);
    assert!(!progress.pending_verification);
}

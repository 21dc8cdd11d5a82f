//! Quorum evaluation on a bare request.

use chrono::Utc;
use proptest::prelude::*;

use guild_ladder::core::{
    ProgressKey, VerificationOutcome, VerificationRequest, VerificationStrategy, VoteDecision,
    VoterStanding,
};

fn arb_decision() -> impl Strategy<Value = VoteDecision> {
    prop_oneof![
        Just(VoteDecision::Approve),
        Just(VoteDecision::Deny),
        Just(VoteDecision::Defer),
    ]
}

proptest! {
    #[test]
    fn at_most_one_terminal_outcome(
        quorum in 1u32..5,
        decisions in prop::collection::vec(arb_decision(), 1..20),
    ) {
        let now = Utc::now();
        let key = ProgressKey::new("ana", "g", "s");
        let mut request = VerificationRequest::new(&key, 3, VerificationStrategy::Peer, quorum, now);
        let standing = VoterStanding { level: 4, already_voted: false };

        let mut outcomes = Vec::new();
        for (idx, decision) in decisions.iter().enumerate() {
            let verifier = format!("v{idx}");
            match request.record_vote(&verifier, *decision, None, standing, 3, "\n---\n", now) {
                Ok(applied) => {
                    if let Some(outcome) = applied.outcome {
                        outcomes.push(outcome);
                    }
                }
                Err(_) => prop_assert!(!request.is_pending(), "votes only fail once closed"),
            }
        }

        prop_assert!(outcomes.len() <= 1);
        let approvals = decisions.iter().filter(|d| **d == VoteDecision::Approve).count();
        let denials = decisions.iter().filter(|d| **d == VoteDecision::Deny).count();
        if let Some(outcome) = outcomes.first() {
            prop_assert!(!request.is_pending());
            match outcome {
                VerificationOutcome::Approved => prop_assert_eq!(request.approve_count, quorum),
                VerificationOutcome::Denied => prop_assert_eq!(request.deny_count, quorum),
            }
        } else {
            prop_assert!(request.is_pending());
            prop_assert!((approvals as u32) < quorum && (denials as u32) < quorum);
        }
    }
}

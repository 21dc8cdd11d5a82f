//! E2E Scenario: ladder import, credits, peer verification and audit queries.

use super::fixture::E2EFixture;

const LADDER: &str = r#"
[[level]]
level = 1
name = "Apprentice"
strategy = "auto"

[[level]]
level = 2
name = "Reviewer"
credits_required = 20
strategy = "peer"
verifier_minimum_level = 1
quorum_size = 2
weight = 25
"#;

fn pending_id(json: &serde_json::Value) -> String {
    assert_eq!(json["data"]["dispatch"]["kind"], "pending_request", "{json}");
    json["data"]["dispatch"]["id"].as_str().unwrap().to_string()
}

#[test]
fn test_peer_verification_workflow() {
    let mut fixture = E2EFixture::new("peer_verification_workflow");

    fixture.log_step("Initialize data root");
    let output = fixture.init();
    fixture.assert_success(&output, "init");

    fixture.log_step("Import ladder");
    let ladder = fixture.write_file("ladder.toml", LADDER);
    let (output, json) = fixture.robot(&["ladder", "import", "g", "docs", ladder.to_str().unwrap()]);
    fixture.assert_success(&output, "ladder import");
    assert_eq!(json["data"]["levels"].as_array().unwrap().len(), 2);

    fixture.log_step("Bring members to level 1");
    for user in ["ana", "bo", "cy", "dee"] {
        let (output, json) = fixture.robot(&["award", user, "g", "docs", "5"]);
        fixture.assert_success(&output, "award");
        assert_eq!(json["data"]["progress"]["current_level"], 1);
    }

    fixture.log_step("Cross the level 2 threshold");
    let (output, json) = fixture.robot(&[
        "award", "ana", "g", "docs", "25", "--source", "task_review", "--reviewer", "bo",
    ]);
    fixture.assert_success(&output, "award");
    let id = pending_id(&json);
    assert_eq!(json["data"]["progress"]["pending_verification"], true);

    fixture.log_step("Further credits do not open a second request");
    let (output, json) = fixture.robot(&["award", "ana", "g", "docs", "3"]);
    fixture.assert_success(&output, "award");
    assert!(json["data"]["dispatch"].is_null());
    assert_eq!(json["data"]["progress"]["credits_since_level"], 28);

    fixture.log_step("Verifiers see the request");
    let (_, json) = fixture.robot(&["pending", "bo"]);
    assert_eq!(json["data"]["count"], 1);
    assert_eq!(json["data"]["pending"][0]["request"]["id"], id.as_str());
    let (_, json) = fixture.robot(&["pending", "ana"]);
    assert_eq!(json["data"]["count"], 0);

    fixture.log_step("Self vote is rejected");
    let (output, _) = fixture.robot(&["vote", &id, "ana", "approve"]);
    fixture.assert_error_code(&output, "SELF_VOTE");

    fixture.log_step("First approval keeps the request open");
    let (output, json) = fixture.robot(&["vote", &id, "bo", "approve", "--feedback", "clean work"]);
    fixture.assert_success(&output, "vote");
    assert!(json["data"]["outcome"].is_null());
    assert_eq!(json["data"]["request"]["approve_count"], 1);

    fixture.log_step("Second vote by the same verifier is rejected");
    let (output, _) = fixture.robot(&["vote", &id, "bo", "approve"]);
    fixture.assert_error_code(&output, "DUPLICATE_VOTE");

    fixture.log_step("Quorum approves and grants");
    let (output, json) = fixture.robot(&["vote", &id, "cy", "approve"]);
    fixture.assert_success(&output, "vote");
    assert_eq!(json["data"]["outcome"], "approved");
    assert_eq!(json["data"]["progress"]["current_level"], 2);
    assert_eq!(json["data"]["progress"]["credits_since_level"], 0);

    fixture.log_step("Closed request rejects late votes");
    let (output, _) = fixture.robot(&["vote", &id, "dee", "deny"]);
    fixture.assert_error_code(&output, "VERIFICATION_CLOSED");

    fixture.log_step("Profile, history and detail");
    let (_, json) = fixture.robot(&["profile", "ana", "g"]);
    let skill = &json["data"]["skills"][0];
    assert_eq!(skill["level"], 2);
    assert_eq!(skill["level_name"], "Reviewer");
    assert_eq!(skill["lifetime_credits"], 33);

    let (_, json) = fixture.robot(&["history", "ana", "g", "--limit", "2"]);
    let entries = json["data"]["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["amount"], 3);
    assert_eq!(entries[1]["reviewer"], "bo");

    let (_, json) = fixture.robot(&["show", &id]);
    assert_eq!(json["data"]["request"]["status"], "approved");
    assert_eq!(json["data"]["votes"].as_array().unwrap().len(), 2);
    let feedback = json["data"]["feedback"].as_array().unwrap();
    assert_eq!(feedback.len(), 1);
    assert!(feedback[0].as_str().unwrap().contains("clean work"));

    fixture.log_step("Event log recorded the flow");
    let log = std::fs::read_to_string(fixture.path("events.jsonl")).unwrap();
    assert!(log.contains("\"event\":\"verification_initiated\""));
    assert!(log.contains("\"event\":\"verification_approved\""));
    assert_eq!(log.matches("\"event\":\"level_granted\"").count(), 5);

    fixture.log_step("Ledger rows are append-only");
    let db = fixture.db();
    let rows: i64 = db
        .query_row("SELECT COUNT(*) FROM credit_ledger", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 6);
}

#[test]
fn test_denial_then_sweep() {
    let mut fixture = E2EFixture::new("denial_then_sweep");
    let output = fixture.init();
    fixture.assert_success(&output, "init");
    let ladder = fixture.write_file("ladder.toml", LADDER);
    let output = fixture.run_gl(&["ladder", "import", "g", "docs", ladder.to_str().unwrap()]);
    fixture.assert_success(&output, "ladder import");

    for user in ["ana", "bo", "cy"] {
        fixture.robot(&["award", user, "g", "docs", "5"]);
    }

    fixture.log_step("Denied by quorum keeps credits");
    let (_, json) = fixture.robot(&["award", "ana", "g", "docs", "20"]);
    let first = pending_id(&json);
    fixture.robot(&["vote", &first, "bo", "deny"]);
    let (output, json) = fixture.robot(&["vote", &first, "cy", "deny"]);
    fixture.assert_success(&output, "vote");
    assert_eq!(json["data"]["outcome"], "denied");
    assert_eq!(json["data"]["progress"]["current_level"], 1);
    assert_eq!(json["data"]["progress"]["credits_since_level"], 20);
    assert_eq!(json["data"]["progress"]["pending_verification"], false);

    fixture.log_step("Re-check opens a fresh request");
    let (_, json) = fixture.robot(&["check", "ana", "g", "docs", "--dry-run"]);
    assert_eq!(json["data"]["eligible_level"], 2);
    let (_, json) = fixture.robot(&["check", "ana", "g", "docs"]);
    let second = pending_id(&json);
    assert_ne!(first, second);

    fixture.log_step("Sweep is a no-op while expiry is disabled");
    let (output, json) = fixture.robot(&["sweep"]);
    fixture.assert_success(&output, "sweep");
    assert!(json["data"]["expired"].as_array().unwrap().is_empty());

    fixture.log_step("Sweep with a zero window expires the open request");
    fixture.set_env("GL_EXPIRE_AFTER", "0s");
    let (output, json) = fixture.robot(&["sweep"]);
    fixture.assert_success(&output, "sweep");
    let expired = json["data"]["expired"].as_array().unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0]["id"], second.as_str());
    assert_eq!(expired[0]["status"], "expired");

    let (_, json) = fixture.robot(&["profile", "ana", "g"]);
    assert_eq!(json["data"]["skills"][0]["pending_verification"], false);
    assert_eq!(json["data"]["skills"][0]["credits"], 20);
}

//! End-to-end executor scenarios over in-memory backends and a mock
//! harness.

mod common;

use common::*;

use ship_commander::domain::errors::DomainError;
use ship_commander::domain::models::{ApprovalDecision, Classification, MissionRuntime, MissionState};
use ship_commander::domain::ports::{GateKind, RecordStore};
use ship_commander::services::EventKind;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn happy_path_standard_ops_mission() {
    let fixture = ExecutorFixture::new().await;
    let commission = commission("C-1", &["UC-1"]);
    let m1 = mission("M-1", &["UC-1"], Classification::StandardOps, &["src/**"]);
    fixture.seed(&commission, &[m1.clone()]).await;
    fixture.seed_demo_token(&m1);
    fixture.harness.script_reviews("M-1", vec![review_approved()]).await;
    fixture.script_approvals(vec![ApprovalDecision::Approved]).await;

    let cancel = CancellationToken::new();
    let report = fixture.executor.execute(&cancel, "C-1").await.unwrap();

    assert_eq!(report.completed, vec!["M-1"]);
    assert!(report.halted.is_empty());

    // One implementer dispatch, one reviewer dispatch.
    assert_eq!(fixture.harness.spawns_for_role("implementer").await.len(), 1);
    assert_eq!(fixture.harness.spawns_for_role("reviewer").await.len(), 1);

    // Compressed pipeline: VERIFY_IMPLEMENT once, VERIFY_RED never.
    assert_eq!(fixture.gates.count(GateKind::VerifyImplement), 1);
    assert_eq!(fixture.gates.count(GateKind::VerifyRed), 0);

    // in_progress -> review -> approved -> done on the record.
    let record = fixture.store.show("M-1").await.unwrap();
    assert_eq!(record.state_value("mission_state"), Some("done"));
    let runtime = MissionRuntime::from_record(&record, chrono::Utc::now()).unwrap();
    assert_eq!(runtime.state, MissionState::Done);
    assert_eq!(runtime.revision, 1);
    assert!(runtime.session_id.is_some());
    let comments = fixture.store.comments("M-1").await.unwrap();
    let states: Vec<&str> = comments
        .iter()
        .filter_map(|c| c.split("to=").nth(1))
        .filter_map(|rest| rest.split_whitespace().next())
        .collect();
    assert_eq!(states, vec!["in_progress", "review", "approved", "done"]);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(fixture.events.of_kind(EventKind::MissionCompleted).len(), 1);
    assert_eq!(fixture.approval.history().len(), 1);
}

#[tokio::test]
async fn approval_feedback_then_resume() {
    let fixture = ExecutorFixture::new().await;
    let commission = commission("C-1", &["UC-1"]);
    let m1 = mission("M-1", &["UC-1"], Classification::StandardOps, &["src/**"]);
    fixture.seed(&commission, &[m1.clone()]).await;
    fixture.seed_demo_token(&m1);
    fixture.harness.script_reviews("M-1", vec![review_approved()]).await;
    fixture
        .script_approvals(vec![
            ApprovalDecision::Feedback("Split mission into backend and ui tracks".into()),
            ApprovalDecision::Approved,
        ])
        .await;

    let cancel = CancellationToken::new();
    let err = fixture.executor.execute(&cancel, "C-1").await.unwrap_err();
    assert!(matches!(err, DomainError::ApprovalFeedback(ref text)
        if text == "Split mission into backend and ui tracks"));

    // Zero dispatches; feedback injected once.
    assert!(fixture.harness.spawns().await.is_empty());
    let envelope = fixture.plans.load_plan("C-1").await.unwrap();
    assert_eq!(envelope.feedback_text, "Split mission into backend and ui tracks");

    // Second run: approved, mission completes.
    let report = fixture.executor.execute(&cancel, "C-1").await.unwrap();
    assert_eq!(report.completed, vec!["M-1"]);
    assert_eq!(fixture.harness.spawns_for_role("implementer").await.len(), 1);
    assert_eq!(fixture.approval.history().len(), 2);
}

#[tokio::test]
async fn shelve_then_resume() {
    let fixture = ExecutorFixture::new().await;
    let commission = commission("C-1", &["UC-1"]);
    let m1 = mission("M-1", &["UC-1"], Classification::StandardOps, &["src/**"]);
    fixture.seed(&commission, &[m1.clone()]).await;
    fixture.seed_demo_token(&m1);
    fixture.harness.script_reviews("M-1", vec![review_approved()]).await;
    fixture
        .script_approvals(vec![
            ApprovalDecision::Shelved("Pause for dependency validation".into()),
            ApprovalDecision::Approved,
        ])
        .await;

    let cancel = CancellationToken::new();
    let err = fixture.executor.execute(&cancel, "C-1").await.unwrap_err();
    assert!(matches!(err, DomainError::ApprovalShelved(_)));
    assert!(fixture.harness.spawns().await.is_empty());

    // Shelving is durable on the commission notes.
    let record = fixture.store.show("C-1").await.unwrap();
    let notes = record.notes.unwrap();
    assert_eq!(notes["commissionStatus"], "shelved");
    assert_eq!(notes["feedbackText"], "Pause for dependency validation");

    let report = fixture.executor.execute(&cancel, "C-1").await.unwrap();
    assert_eq!(report.completed, vec!["M-1"]);
}

#[tokio::test]
async fn revision_ceiling_halts_mission() {
    let fixture = ExecutorFixture::new().await;
    let commission = commission("C-1", &["UC-1"]);
    let mut m1 = mission("M-1", &["UC-1"], Classification::StandardOps, &["src/**"]);
    m1.max_revisions = Some(1);
    fixture.seed(&commission, &[m1.clone()]).await;
    fixture.seed_demo_token(&m1);
    fixture
        .harness
        .script_reviews("M-1", vec![review_needs_fixes("tighten error handling")])
        .await;
    fixture.script_approvals(vec![ApprovalDecision::Approved]).await;

    let cancel = CancellationToken::new();
    let err = fixture.executor.execute(&cancel, "C-1").await.unwrap_err();
    assert!(matches!(
        err,
        DomainError::Halted {
            reason: ship_commander::domain::models::HaltReason::MaxRevisionsExceeded,
            ..
        }
    ));

    // One implementer dispatch, then halt.
    assert_eq!(fixture.harness.spawns_for_role("implementer").await.len(), 1);
    let record = fixture.store.show("M-1").await.unwrap();
    assert_eq!(record.state_value("mission_state"), Some("halted"));

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let halted = fixture.events.of_kind(EventKind::MissionHalted);
    assert_eq!(halted.len(), 1);
    assert_eq!(halted[0].payload["reason"], "MaxRevisionsExceeded");
}

#[tokio::test]
async fn multi_wave_carries_inter_wave_feedback() {
    let fixture = ExecutorFixture::new().await;
    let commission = commission("C-1", &["UC-1", "UC-2"]);
    let m1 = mission("M-1", &["UC-1"], Classification::StandardOps, &["backend/**"]);
    let mut m2 = mission("M-2", &["UC-2"], Classification::StandardOps, &["frontend/**"]);
    m2.depends_on = vec!["M-1".into()];
    fixture.seed(&commission, &[m1.clone(), m2.clone()]).await;
    fixture.seed_demo_token(&m1);
    fixture.seed_demo_token(&m2);
    fixture.harness.script_reviews("M-1", vec![review_approved()]).await;
    fixture.harness.script_reviews("M-2", vec![review_approved()]).await;
    fixture
        .script_approvals(vec![
            ApprovalDecision::Approved,
            ApprovalDecision::Feedback("carry wave checkpoint feedback into next mission".into()),
        ])
        .await;

    let cancel = CancellationToken::new();
    let report = fixture.executor.execute(&cancel, "C-1").await.unwrap();
    assert_eq!(report.completed, vec!["M-1", "M-2"]);
    assert_eq!(report.waves, 2);

    let implementers = fixture.harness.spawns_for_role("implementer").await;
    assert_eq!(implementers.len(), 2);
    // The second dispatch receives the inter-wave feedback as context.
    assert!(implementers[1]
        .prompt
        .contains("carry wave checkpoint feedback into next mission"));
    assert!(!implementers[0].prompt.contains("carry wave checkpoint"));

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(fixture.events.of_kind(EventKind::WaveFeedbackRecorded).len(), 1);
    assert_eq!(fixture.approval.history().len(), 2);
}

#[tokio::test]
async fn red_alert_runs_full_tdd_pipeline() {
    let fixture = ExecutorFixture::new().await;
    let commission = commission("C-1", &["UC-1"]);
    let m1 = mission("M-1", &["UC-1"], Classification::RedAlert, &["src/**"]);
    fixture.seed(&commission, &[m1.clone()]).await;
    fixture.seed_demo_token(&m1);
    fixture.harness.script_reviews("M-1", vec![review_approved()]).await;
    fixture.script_approvals(vec![ApprovalDecision::Approved]).await;

    let cancel = CancellationToken::new();
    let report = fixture.executor.execute(&cancel, "C-1").await.unwrap();
    assert_eq!(report.completed, vec!["M-1"]);

    assert_eq!(fixture.gates.count(GateKind::VerifyRed), 1);
    assert_eq!(fixture.gates.count(GateKind::VerifyGreen), 1);
    assert_eq!(fixture.gates.count(GateKind::VerifyRefactor), 1);
    assert_eq!(fixture.gates.count(GateKind::VerifyImplement), 0);

    // The criterion walked the full pipeline to complete.
    let ac = fixture.store.show("M-1/UC-1-AC-1").await.unwrap();
    assert_eq!(ac.state_value("ac_phase"), Some("complete"));
}

#[tokio::test]
async fn gate_rejection_feeds_back_and_retries() {
    let fixture = ExecutorFixture::new().await;
    let commission = commission("C-1", &["UC-1"]);
    let m1 = mission("M-1", &["UC-1"], Classification::RedAlert, &["src/**"]);
    fixture.seed(&commission, &[m1.clone()]).await;
    fixture.seed_demo_token(&m1);
    fixture.harness.script_reviews("M-1", vec![review_approved()]).await;
    fixture.script_approvals(vec![ApprovalDecision::Approved]).await;
    // First VERIFY_RED rejects; the retry accepts.
    fixture.gates.push_outcome(
        GateKind::VerifyRed,
        ship_commander::domain::ports::GateOutcome {
            exit_code: 1,
            output: "no failing test found".into(),
        },
    );

    let cancel = CancellationToken::new();
    fixture.executor.execute(&cancel, "C-1").await.unwrap();

    assert_eq!(fixture.gates.count(GateKind::VerifyRed), 2);
    // The rejected attempt's feedback reached the implementer.
    let messages = fixture.harness.messages().await;
    assert!(messages.iter().any(|m| m
        .message
        .contains("VERIFY_RED rejected attempt 1: no failing test found")));
}

#[tokio::test]
async fn overlapping_missions_serialize_across_waves() {
    let fixture = ExecutorFixture::new().await;
    let commission = commission("C-1", &["UC-1", "UC-2"]);
    // Same surface area, no declared dependency.
    let m1 = mission("M-1", &["UC-1"], Classification::StandardOps, &["src/**"]);
    let m2 = mission("M-2", &["UC-2"], Classification::StandardOps, &["src/api/mod.rs"]);
    fixture.seed(&commission, &[m1.clone(), m2.clone()]).await;
    fixture.seed_demo_token(&m1);
    fixture.seed_demo_token(&m2);
    fixture.harness.script_reviews("M-1", vec![review_approved()]).await;
    fixture.harness.script_reviews("M-2", vec![review_approved()]).await;
    fixture
        .script_approvals(vec![ApprovalDecision::Approved, ApprovalDecision::Approved])
        .await;

    let cancel = CancellationToken::new();
    let report = fixture.executor.execute(&cancel, "C-1").await.unwrap();
    // With WIP 1 both run in wave 1 sequentially; locks released between.
    assert_eq!(report.completed.len(), 2);
    assert!(report.halted.is_empty());
}

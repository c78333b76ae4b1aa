//! End-to-end runs through the engine with a fake CA

mod common;

use certflow_acme::x509::ari_certificate_id;
use certflow_domain::{
    CertificateRepository, CertificateSource, PersistenceSettings, WorkflowNode, WorkflowNodeType,
    WorkflowOutputRepository, WorkflowRunStatus, WorkflowTrigger,
};
use certflow_workflow::{NodeState, RetentionSweeper};
use chrono::Utc;
use common::{apply_node, notify_node, workflow, FakeProtocol, Harness, ACCOUNT_URL};
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_renewal_declares_replacement_of_previous_certificate() {
    let harness = Harness::new(FakeProtocol::new());
    let wf = workflow(vec![apply_node("apply", "example.com;www.example.com", 0)]);

    let first = harness
        .engine
        .execute(&wf, WorkflowTrigger::Manual, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.run.status, WorkflowRunStatus::Succeeded);
    let issued = harness
        .store
        .get_by_workflow_node_id("apply")
        .await
        .unwrap();
    assert_eq!(issued.source, CertificateSource::Request);
    assert_eq!(issued.acme_account_url, ACCOUNT_URL);

    let second = harness
        .engine
        .execute(&wf, WorkflowTrigger::Manual, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.run.status, WorkflowRunStatus::Succeeded);

    let replaces = harness.protocol.replaces.lock().unwrap().clone();
    assert_eq!(
        replaces,
        vec![None, Some(ari_certificate_id(&issued.certificate).unwrap())]
    );

    let renewed = harness
        .store
        .get_by_workflow_node_id("apply")
        .await
        .unwrap();
    assert_ne!(renewed.id, issued.id);
    assert_ne!(renewed.serial_number, issued.serial_number);
}

#[tokio::test]
async fn test_skip_propagates_to_notification() {
    let harness = Harness::new(FakeProtocol::new());
    let wf = workflow(vec![
        apply_node("apply", "example.com", 30),
        notify_node("notify"),
    ]);

    let first = harness
        .engine
        .execute(&wf, WorkflowTrigger::Manual, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.node_state("apply"), Some(NodeState::Succeeded));
    assert_eq!(first.node_state("notify"), Some(NodeState::Succeeded));

    let second = harness
        .engine
        .execute(&wf, WorkflowTrigger::Manual, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.run.status, WorkflowRunStatus::Succeeded);
    assert_eq!(second.node_state("apply"), Some(NodeState::Skipped));
    assert_eq!(second.node_state("notify"), Some(NodeState::Skipped));

    assert_eq!(harness.notifier.sent.lock().unwrap().len(), 1);
    assert_eq!(harness.protocol.replaces.lock().unwrap().len(), 1);

    let output = harness.store.get_by_node_id("apply").await.unwrap();
    assert_eq!(output.run_id, second.run.id);
    assert_eq!(output.skipped(), Some(true));
}

#[tokio::test]
async fn test_fresh_deploy_still_notifies_after_skipped_apply() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new(FakeProtocol::new());
    let deploy = WorkflowNode::new("deploy", WorkflowNodeType::Deploy).with_config(json!({
        "certificate": "apply#certificate",
        "provider": "local",
        "providerConfig": {
            "certPath": dir.path().join("live/cert.pem"),
            "keyPath": dir.path().join("live/key.pem"),
        },
    }));
    let wf = workflow(vec![
        apply_node("apply", "example.com", 30),
        deploy,
        notify_node("notify"),
    ]);

    for _ in 0..2 {
        let report = harness
            .engine
            .execute(&wf, WorkflowTrigger::Manual, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.run.status, WorkflowRunStatus::Succeeded);
        assert_eq!(report.node_state("deploy"), Some(NodeState::Succeeded));
    }

    assert_eq!(harness.notifier.sent.lock().unwrap().len(), 2);
    let deployed = std::fs::read_to_string(dir.path().join("live/cert.pem")).unwrap();
    assert!(deployed.contains("BEGIN CERTIFICATE"));
}

#[tokio::test]
async fn test_failed_issuance_halts_run_with_summary() {
    let harness = Harness::new(FakeProtocol::failing());
    let wf = workflow(vec![
        apply_node("apply", "example.com", 0),
        notify_node("notify"),
    ]);

    let report = harness
        .engine
        .execute(&wf, WorkflowTrigger::Manual, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.run.status, WorkflowRunStatus::Failed);
    assert_eq!(report.node_state("apply"), Some(NodeState::Failed));
    assert_eq!(report.node_state("notify"), Some(NodeState::Pending));
    assert!(report.run.error.contains("Failed to obtain certificate"));
    assert!(report.run.error.contains("incorrect TXT record"));
    assert!(harness.notifier.sent.lock().unwrap().is_empty());

    let output = harness.store.get_by_node_id("apply").await.unwrap();
    assert!(!output.succeeded);
}

#[tokio::test]
async fn test_repeated_cleanup_is_a_no_op() {
    let harness = Harness::new(FakeProtocol::new());
    let wf = workflow(vec![apply_node("apply", "example.com", 0)]);
    for _ in 0..2 {
        harness
            .engine
            .execute(&wf, WorkflowTrigger::Manual, CancellationToken::new())
            .await
            .unwrap();
    }

    let sweeper = RetentionSweeper::new(harness.engine.services().clone());
    let settings = PersistenceSettings {
        expired_certificates_max_days_retention: 30,
        workflow_runs_max_days_retention: 30,
    };
    let later = Utc::now() + chrono::Duration::days(60);

    let first = sweeper.sweep_with(&settings, later).await.unwrap();
    assert_eq!(first.runs, 2);
    assert!(first.outputs >= 2);
    assert!(first.logs > 0);
    // Issued certificates are still valid
    assert_eq!(first.certificates, 0);

    let second = sweeper.sweep_with(&settings, later).await.unwrap();
    assert_eq!(second.total(), 0);
}

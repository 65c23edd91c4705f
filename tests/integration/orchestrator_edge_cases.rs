use super::{
    collect_until_terminal, create_test_orchestrator, files_with_prefix, last_status, summary,
};
use async_trait::async_trait;
use chatsummary_backend::{
    models::internal::{ChatMessage, ProgressStatus},
    orchestrator::{ChatSubmission, RunState},
    services::llm_gateway::{
        GenerationOverrides, LlmError, LlmGateway, MockGateway, SummaryResult,
    },
};
use mockall::mock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

mock! {
    pub LlmBackend {}

    #[async_trait]
    impl LlmGateway for LlmBackend {
        async fn complete(&self, prompt: &str, overrides: GenerationOverrides) -> SummaryResult;
    }
}

struct PanickingGateway;

#[async_trait]
impl LlmGateway for PanickingGateway {
    async fn complete(&self, _prompt: &str, _overrides: GenerationOverrides) -> SummaryResult {
        panic!("provider client blew up");
    }
}

fn submission(patient: &str) -> ChatSubmission {
    ChatSubmission {
        patient_name: patient.to_string(),
        messages: vec![ChatMessage::new("Alice", true, "I forgot my insulin twice")],
    }
}

#[tokio::test]
async fn test_second_candidate_failure_aborts_before_synthesis() {
    let dir = tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let mut backend = MockLlmBackend::new();
    backend.expect_complete().times(2).returning(move |_, _| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(summary("only one"))
        } else {
            Err(LlmError::Transport {
                details: "connection reset".to_string(),
            })
        }
    });

    let orchestrator = create_test_orchestrator(dir.path(), Arc::new(backend), None);
    let mut rx = orchestrator.notifier().subscribe();

    let report = orchestrator.run(submission("alice")).await;
    assert_eq!(report.state, RunState::Aborted);
    assert_eq!(report.failed_at, Some(RunState::CheckingCandidates));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let events = collect_until_terminal(&mut rx).await;
    assert_eq!(last_status(&events), Some(ProgressStatus::Error));
    assert_eq!(
        events.last().unwrap().message,
        "Failed to generate summaries."
    );

    // transcript kept, nothing downstream written
    assert_eq!(files_with_prefix(dir.path(), "chat_alice_").len(), 1);
    assert!(!dir.path().join("intermediate_summaries").exists());
    assert!(files_with_prefix(dir.path(), "summary_alice_").is_empty());
}

#[tokio::test]
async fn test_first_candidate_failure_still_issues_second_call() {
    let dir = tempdir().unwrap();
    let gateway = Arc::new(MockGateway::new(vec![
        Err(LlmError::MissingText {
            raw_response: serde_json::json!({"candidates": []}),
        }),
        Ok(summary("fine")),
    ]));
    let orchestrator = create_test_orchestrator(dir.path(), gateway.clone(), None);

    let report = orchestrator.run(submission("bob")).await;

    assert_eq!(report.state, RunState::Aborted);
    assert_eq!(gateway.call_count(), 2);
    assert!(files_with_prefix(dir.path(), "summary_bob_").is_empty());
}

#[tokio::test]
async fn test_synthesis_failure_keeps_intermediates_only() {
    let dir = tempdir().unwrap();
    let gateway = Arc::new(MockGateway::new(vec![
        Ok(summary("one")),
        Ok(summary("two")),
        Err(LlmError::Unexpected {
            details: "expected value at line 1 column 1".to_string(),
        }),
    ]));
    let orchestrator = create_test_orchestrator(dir.path(), gateway.clone(), None);
    let mut rx = orchestrator.notifier().subscribe();

    let report = orchestrator.run(submission("alice")).await;
    assert_eq!(report.state, RunState::Aborted);
    assert_eq!(report.failed_at, Some(RunState::Finalizing));

    let key = report.key.unwrap();
    let intermediate = dir.path().join("intermediate_summaries");
    assert!(intermediate.join(key.intermediate_file(1)).exists());
    assert!(intermediate.join(key.intermediate_file(2)).exists());
    assert!(!dir.path().join(key.final_file()).exists());

    let events = collect_until_terminal(&mut rx).await;
    assert_eq!(
        events.last().unwrap().message,
        "Failed to synthesize summary."
    );
    assert_eq!(last_status(&events), Some(ProgressStatus::Error));
}

#[tokio::test]
async fn test_storage_failure_reports_unexpected_error() {
    let dir = tempdir().unwrap();
    let blocked_root = dir.path().join("chats");
    std::fs::write(&blocked_root, "not a directory").unwrap();

    let gateway = Arc::new(MockGateway::new(vec![]));
    let orchestrator = create_test_orchestrator(&blocked_root, gateway.clone(), None);
    let mut rx = orchestrator.notifier().subscribe();

    let report = orchestrator.run(submission("alice")).await;
    assert_eq!(report.state, RunState::Aborted);
    assert_eq!(report.failed_at, Some(RunState::Saving));
    assert!(report.key.is_none());
    assert_eq!(gateway.call_count(), 0);

    let events = collect_until_terminal(&mut rx).await;
    assert_eq!(
        events.last().unwrap().message,
        "An unexpected error occurred."
    );
}

#[tokio::test]
async fn test_panicking_gateway_is_contained() {
    let dir = tempdir().unwrap();
    let orchestrator = create_test_orchestrator(dir.path(), Arc::new(PanickingGateway), None);
    let mut rx = orchestrator.notifier().subscribe();

    let handle = orchestrator.spawn(submission("alice"));
    let report = handle.await.expect("worker task should not die");

    assert_eq!(report.state, RunState::Aborted);
    assert_eq!(report.failed_at, Some(RunState::GeneratingCandidate1));

    let events = collect_until_terminal(&mut rx).await;
    assert_eq!(last_status(&events), Some(ProgressStatus::Error));
    assert_eq!(
        events.last().unwrap().message,
        "An unexpected error occurred."
    );
}

use chrono::Utc;
use marketpipe::orchestrator::{
    FileStateStore, InitialPosition, JobRef, JobSpec, JobState, JobStateRecord, MemoryJobControl,
    Orchestrator, OrchestratorError, RestorePolicy, StateStore,
};
use marketpipe::sink::{ArtifactRef, MemoryArtifactStore};
use std::path::Path;
use tempfile::TempDir;

fn spec() -> JobSpec {
    JobSpec {
        name: "candle-processor".to_string(),
        artifact: ArtifactRef {
            bucket: "artifacts".to_string(),
            key: "processor.jar".to_string(),
        },
        source_stream: "candles".to_string(),
        runtime: "FLINK-1_20".to_string(),
        parallelism: 1,
        initial_position: InitialPosition::TrimHorizon,
        sink_bucket: "output".to_string(),
        log_stream: None,
    }
}

fn orchestrator_over(
    dir: &Path,
) -> Orchestrator<MemoryJobControl, MemoryArtifactStore, FileStateStore> {
    let artifacts = MemoryArtifactStore::new();
    artifacts.insert(&spec().artifact);
    let state = FileStateStore::new(dir.to_path_buf()).unwrap();
    Orchestrator::new(MemoryJobControl::new(), artifacts, state)
}

#[tokio::test]
async fn test_transitions_run_in_dependency_order() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator_over(dir.path());

    let outcome = orchestrator
        .deploy(&spec(), RestorePolicy::default())
        .await
        .unwrap();

    assert!(outcome.created && outcome.logging_attached && outcome.started);
    assert_eq!(outcome.final_state, JobState::Started);
}

#[tokio::test]
async fn test_redeploy_issues_zero_start_commands() {
    let dir = TempDir::new().unwrap();

    // First deployment runs the full chain.
    let first = orchestrator_over(dir.path());
    first.deploy(&spec(), RestorePolicy::default()).await.unwrap();

    // A later deployment sees the durable state and does nothing, even with
    // a brand-new process and fresh clients.
    let second = orchestrator_over(dir.path());
    let outcome = second
        .deploy(&spec(), RestorePolicy::default())
        .await
        .unwrap();

    assert!(!outcome.created && !outcome.logging_attached && !outcome.started);
    assert_eq!(outcome.final_state, JobState::Started);
}

#[tokio::test]
async fn test_third_and_fourth_deploys_stay_no_ops() {
    let dir = TempDir::new().unwrap();
    orchestrator_over(dir.path())
        .deploy(&spec(), RestorePolicy::default())
        .await
        .unwrap();

    for _ in 0..3 {
        let again = orchestrator_over(dir.path());
        let outcome = again
            .deploy(&spec(), RestorePolicy::default())
            .await
            .unwrap();
        assert!(!outcome.started);
    }
}

#[tokio::test]
async fn test_concurrent_deploys_issue_at_most_one_start() {
    let dir = TempDir::new().unwrap();

    // Seed durable state as if a prior run stopped after attaching logging,
    // leaving only the start transition outstanding.
    let seed_state = FileStateStore::new(dir.path().to_path_buf()).unwrap();
    seed_state
        .record(&JobStateRecord {
            name: "candle-processor".to_string(),
            state: JobState::LoggingAttached,
            job: Some(JobRef {
                id: "job-1".to_string(),
                name: "candle-processor".to_string(),
                log_group: "/jobs/candle-processor".to_string(),
            }),
            failed_step: None,
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

    let left = orchestrator_over(dir.path());
    let right = orchestrator_over(dir.path());

    let left_spec = spec();
    let right_spec = spec();
    let (a, b) = tokio::join!(
        left.deploy(&left_spec, RestorePolicy::default()),
        right.deploy(&right_spec, RestorePolicy::default()),
    );
    a.unwrap();
    b.unwrap();

    let starts = |calls: Vec<String>| calls.iter().filter(|c| c.starts_with("start:")).count();
    let total = starts(left.jobs().calls()) + starts(right.jobs().calls());
    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_failed_start_blocks_later_deploys() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator_over(dir.path());
    orchestrator.jobs().fail_next_start("job service down");

    let result = orchestrator.deploy(&spec(), RestorePolicy::default()).await;
    assert!(matches!(result, Err(OrchestratorError::Start { .. })));

    let retry = orchestrator_over(dir.path());
    let result = retry.deploy(&spec(), RestorePolicy::default()).await;
    match result {
        Err(OrchestratorError::PreviouslyFailed { step, .. }) => assert_eq!(step, "start"),
        other => panic!("expected PreviouslyFailed, got {:?}", other.map(|o| o.final_state)),
    }
    assert_eq!(retry.jobs().call_count(), 0);
}

#[tokio::test]
async fn test_deploy_resumes_after_interrupted_run() {
    let dir = TempDir::new().unwrap();

    // A run that fails while attaching leaves the job failed; clear the
    // failure marker the way an operator would, back to Created.
    let first = orchestrator_over(dir.path());
    first.jobs().fail_next_attach("transient outage");
    let result = first.deploy(&spec(), RestorePolicy::default()).await;
    assert!(matches!(result, Err(OrchestratorError::Attach { .. })));

    let store = FileStateStore::new(dir.path().to_path_buf()).unwrap();
    let mut recorded = store.load("candle-processor").await.unwrap().unwrap();
    assert_eq!(recorded.state, JobState::Failed);
    recorded.state = JobState::Created;
    recorded.failed_step = None;
    store.record(&recorded).await.unwrap();

    // The next deploy picks up from Created: no second create call.
    let second = orchestrator_over(dir.path());
    let outcome = second
        .deploy(&spec(), RestorePolicy::default())
        .await
        .unwrap();
    assert!(!outcome.created);
    assert!(outcome.logging_attached && outcome.started);
    assert!(second
        .jobs()
        .calls()
        .iter()
        .all(|c| !c.starts_with("create:")));
}

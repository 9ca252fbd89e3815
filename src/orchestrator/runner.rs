use crate::orchestrator::job::{
    JobApiError, JobControl, JobRef, JobSpec, JobState, LoggingDestination, RestorePolicy,
};
use crate::orchestrator::state_store::{JobStateRecord, StateStore, StateStoreError};
use crate::sink::{ArtifactStore, SinkError};
use chrono::Utc;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("job `{name}`: artifact {artifact} is not available to the processor")]
    ArtifactUnavailable {
        name: String,
        artifact: crate::sink::ArtifactRef,
    },

    #[error("job `{name}`: create failed: {source}")]
    Provisioning {
        name: String,
        #[source]
        source: JobApiError,
    },

    #[error("job `{name}`: attach logging failed: {source}")]
    Attach {
        name: String,
        #[source]
        source: JobApiError,
    },

    #[error("job `{name}`: start failed: {source}")]
    Start {
        name: String,
        #[source]
        source: JobApiError,
    },

    #[error("job `{name}` previously failed during `{step}`; operator intervention required")]
    PreviouslyFailed { name: String, step: String },

    #[error("job `{name}`: recorded state has no job handle")]
    MissingJobHandle { name: String },

    #[error("state store error: {0}")]
    State(#[from] StateStoreError),

    #[error("artifact probe failed: {0}")]
    Sink(#[from] SinkError),
}

/// What one orchestration run actually did. A redeploy against an
/// already-started job reports all three flags false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub job_name: String,
    pub created: bool,
    pub logging_attached: bool,
    pub started: bool,
    pub final_state: JobState,
}

/// Runs the linear provisioning chain for one job identity:
/// create, then attach logging, then start once. Each transition is durably
/// recorded before the next is attempted, and each runs at most once per
/// identity no matter how many times the orchestration itself is invoked.
pub struct Orchestrator<J, A, S> {
    jobs: J,
    artifacts: A,
    state: S,
}

impl<J: JobControl, A: ArtifactStore, S: StateStore> Orchestrator<J, A, S> {
    pub fn new(jobs: J, artifacts: A, state: S) -> Self {
        Self {
            jobs,
            artifacts,
            state,
        }
    }

    pub fn jobs(&self) -> &J {
        &self.jobs
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub async fn deploy(
        &self,
        spec: &JobSpec,
        policy: RestorePolicy,
    ) -> Result<DeployOutcome, OrchestratorError> {
        let recorded = self.state.load(&spec.name).await?;
        let mut state = recorded.as_ref().map(|r| r.state).unwrap_or(JobState::Defined);
        let mut job = recorded.as_ref().and_then(|r| r.job.clone());

        let mut outcome = DeployOutcome {
            job_name: spec.name.clone(),
            created: false,
            logging_attached: false,
            started: false,
            final_state: state,
        };

        if state.is_started() {
            info!(job = %spec.name, state = ?state, "Job already started, deploy is a no-op");
            return Ok(outcome);
        }
        if state == JobState::Failed {
            let step = recorded
                .and_then(|r| r.failed_step)
                .unwrap_or_else(|| "unknown".to_string());
            return Err(OrchestratorError::PreviouslyFailed {
                name: spec.name.clone(),
                step,
            });
        }

        if state == JobState::Defined {
            let created = match self.create(spec).await {
                Ok(created) => created,
                Err(e) => return Err(self.fail(spec, None, "create", e).await),
            };
            self.save(spec, JobState::Created, Some(&created)).await?;
            job = Some(created);
            state = JobState::Created;
            outcome.created = true;
        }

        // Resumed runs past `Created` must carry the handle from the record.
        let job = job.ok_or_else(|| OrchestratorError::MissingJobHandle {
            name: spec.name.clone(),
        })?;

        if state == JobState::Created {
            let destination = LoggingDestination::for_job(&job, spec.log_stream.as_deref());
            if let Err(source) = self.jobs.attach_logging(&job, &destination).await {
                let e = OrchestratorError::Attach {
                    name: spec.name.clone(),
                    source,
                };
                return Err(self.fail(spec, Some(&job), "attach_logging", e).await);
            }
            info!(
                job = %spec.name,
                log_group = %destination.log_group,
                log_stream = %destination.log_stream,
                "Logging attached"
            );
            self.save(spec, JobState::LoggingAttached, Some(&job)).await?;
            state = JobState::LoggingAttached;
            outcome.logging_attached = true;
        }

        if state == JobState::LoggingAttached {
            if self.state.claim_start(&spec.name).await? {
                if let Err(source) = self.jobs.start_job(&job, &policy).await {
                    let e = OrchestratorError::Start {
                        name: spec.name.clone(),
                        source,
                    };
                    return Err(self.fail(spec, Some(&job), "start", e).await);
                }
                info!(
                    job = %spec.name,
                    skip_restore = policy.skip_restore_from_snapshot,
                    "Start command issued"
                );
                self.save(spec, JobState::Started, Some(&job)).await?;
                outcome.started = true;
            } else {
                info!(job = %spec.name, "Start already claimed by a concurrent run, skipping");
            }
            state = JobState::Started;
        }

        outcome.final_state = state;
        Ok(outcome)
    }

    /// The create transition: the artifact must exist before the job
    /// definition can reference it.
    async fn create(&self, spec: &JobSpec) -> Result<JobRef, OrchestratorError> {
        if !self.artifacts.accepts_artifact(&spec.artifact).await? {
            return Err(OrchestratorError::ArtifactUnavailable {
                name: spec.name.clone(),
                artifact: spec.artifact.clone(),
            });
        }

        let job = self
            .jobs
            .create_job(spec)
            .await
            .map_err(|source| OrchestratorError::Provisioning {
                name: spec.name.clone(),
                source,
            })?;
        info!(job = %spec.name, id = %job.id, "Job created");
        Ok(job)
    }

    async fn save(
        &self,
        spec: &JobSpec,
        state: JobState,
        job: Option<&JobRef>,
    ) -> Result<(), OrchestratorError> {
        self.state
            .record(&JobStateRecord {
                name: spec.name.clone(),
                state,
                job: job.cloned(),
                failed_step: None,
                updated_at: Utc::now(),
            })
            .await?;
        Ok(())
    }

    /// Record the failed transition and hand the error back. Failures here
    /// are one-time and operator-escalated, never auto-retried.
    async fn fail(
        &self,
        spec: &JobSpec,
        job: Option<&JobRef>,
        step: &str,
        error: OrchestratorError,
    ) -> OrchestratorError {
        error!(job = %spec.name, step, error = %error, "Transition failed, marking job failed");

        let record = JobStateRecord {
            name: spec.name.clone(),
            state: JobState::Failed,
            job: job.cloned(),
            failed_step: Some(step.to_string()),
            updated_at: Utc::now(),
        };
        if let Err(store_error) = self.state.record(&record).await {
            error!(job = %spec.name, error = %store_error, "Could not record failure state");
        }

        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::job::{InitialPosition, MemoryJobControl};
    use crate::orchestrator::state_store::MemoryStateStore;
    use crate::sink::{ArtifactRef, MemoryArtifactStore};

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

    fn orchestrator_with_artifact(
    ) -> Orchestrator<MemoryJobControl, MemoryArtifactStore, MemoryStateStore> {
        let artifacts = MemoryArtifactStore::new();
        artifacts.insert(&spec().artifact);
        Orchestrator::new(MemoryJobControl::new(), artifacts, MemoryStateStore::new())
    }

    #[tokio::test]
    async fn test_first_deploy_runs_all_three_transitions_in_order() {
        let orchestrator = orchestrator_with_artifact();

        let outcome = orchestrator
            .deploy(&spec(), RestorePolicy::default())
            .await
            .unwrap();

        assert!(outcome.created && outcome.logging_attached && outcome.started);
        assert_eq!(outcome.final_state, JobState::Started);
        assert_eq!(
            orchestrator.jobs.calls(),
            vec!["create:candle-processor", "attach:job-1", "start:job-1"]
        );
    }

    #[tokio::test]
    async fn test_second_deploy_is_a_pure_no_op() {
        let orchestrator = orchestrator_with_artifact();

        orchestrator
            .deploy(&spec(), RestorePolicy::default())
            .await
            .unwrap();
        let calls_after_first = orchestrator.jobs.call_count();

        let outcome = orchestrator
            .deploy(&spec(), RestorePolicy::default())
            .await
            .unwrap();

        assert!(!outcome.created && !outcome.logging_attached && !outcome.started);
        assert_eq!(orchestrator.jobs.call_count(), calls_after_first);
    }

    #[tokio::test]
    async fn test_deploy_against_running_job_makes_zero_calls() {
        let artifacts = MemoryArtifactStore::new();
        artifacts.insert(&spec().artifact);
        let state = MemoryStateStore::new();
        state
            .record(&JobStateRecord {
                name: "candle-processor".to_string(),
                state: JobState::Running,
                job: Some(JobRef {
                    id: "job-9".to_string(),
                    name: "candle-processor".to_string(),
                    log_group: "/jobs/candle-processor".to_string(),
                }),
                failed_step: None,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        let orchestrator = Orchestrator::new(MemoryJobControl::new(), artifacts, state);

        let outcome = orchestrator
            .deploy(&spec(), RestorePolicy::default())
            .await
            .unwrap();

        assert!(!outcome.created && !outcome.logging_attached && !outcome.started);
        assert_eq!(outcome.final_state, JobState::Running);
        assert_eq!(orchestrator.jobs.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_artifact_fails_create_and_records_failed() {
        let orchestrator = Orchestrator::new(
            MemoryJobControl::new(),
            MemoryArtifactStore::new(),
            MemoryStateStore::new(),
        );

        let result = orchestrator.deploy(&spec(), RestorePolicy::default()).await;
        assert!(matches!(
            result,
            Err(OrchestratorError::ArtifactUnavailable { .. })
        ));
        // Nothing was created, so no job-control calls at all
        assert_eq!(orchestrator.jobs.call_count(), 0);

        let recorded = orchestrator.state.load("candle-processor").await.unwrap().unwrap();
        assert_eq!(recorded.state, JobState::Failed);
        assert_eq!(recorded.failed_step.as_deref(), Some("create"));
    }

    #[tokio::test]
    async fn test_attach_failure_marks_failed_and_blocks_redeploys() {
        let orchestrator = orchestrator_with_artifact();
        orchestrator.jobs.fail_next_attach("logging backend down");

        let result = orchestrator.deploy(&spec(), RestorePolicy::default()).await;
        assert!(matches!(result, Err(OrchestratorError::Attach { .. })));
        assert_eq!(
            orchestrator.jobs.calls(),
            vec!["create:candle-processor", "attach:job-1"]
        );

        let result = orchestrator.deploy(&spec(), RestorePolicy::default()).await;
        assert!(matches!(
            result,
            Err(OrchestratorError::PreviouslyFailed { .. })
        ));
        // The failed redeploy made no further calls
        assert_eq!(orchestrator.jobs.call_count(), 2);
    }

    #[tokio::test]
    async fn test_resume_from_created_skips_create() {
        let orchestrator = orchestrator_with_artifact();

        // Seed the store as if a previous run created the job and stopped.
        orchestrator
            .state
            .record(&JobStateRecord {
                name: "candle-processor".to_string(),
                state: JobState::Created,
                job: Some(JobRef {
                    id: "job-7".to_string(),
                    name: "candle-processor".to_string(),
                    log_group: "/jobs/candle-processor".to_string(),
                }),
                failed_step: None,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let outcome = orchestrator
            .deploy(&spec(), RestorePolicy::default())
            .await
            .unwrap();

        assert!(!outcome.created);
        assert!(outcome.logging_attached && outcome.started);
        assert_eq!(
            orchestrator.jobs.calls(),
            vec!["attach:job-7", "start:job-7"]
        );
    }

    #[tokio::test]
    async fn test_lost_start_claim_issues_no_start_command() {
        let orchestrator = orchestrator_with_artifact();

        // Another run already holds the claim for this identity.
        assert!(orchestrator.state.claim_start("candle-processor").await.unwrap());

        let outcome = orchestrator
            .deploy(&spec(), RestorePolicy::default())
            .await
            .unwrap();

        assert!(outcome.created && outcome.logging_attached);
        assert!(!outcome.started);
        assert_eq!(
            orchestrator.jobs.calls(),
            vec!["create:candle-processor", "attach:job-1"]
        );
    }
}

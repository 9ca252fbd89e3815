use crate::config::{self, ConfigError};
use crate::orchestrator::{
    FileStateStore, HttpJobControl, JobApiError, Orchestrator, OrchestratorError, RestorePolicy,
    StateStoreError,
};
use crate::sink::{HttpArtifactStore, SinkError};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("job api error: {0}")]
    JobApi(#[from] JobApiError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("state store error: {0}")]
    State(#[from] StateStoreError),

    #[error("orchestration error: {0}")]
    Orchestrator(#[from] OrchestratorError),
}

/// Run the provisioning lifecycle once for the configured job identity.
/// Safe to invoke on every deployment: completed transitions never repeat.
pub async fn run() -> Result<(), DeployError> {
    let config = config::deploy_from_env()?;
    info!(
        job = %config.job_name,
        artifact = %config.artifact,
        source_stream = %config.source_stream,
        "Starting orchestration"
    );

    let jobs = HttpJobControl::new(config.job_api_url.clone(), config.call_timeout)?;
    let artifacts = HttpArtifactStore::new(config.sink_api_url.clone(), config.call_timeout)?;
    let state = FileStateStore::new(config.state_dir.clone())?;

    let orchestrator = Orchestrator::new(jobs, artifacts, state);
    let outcome = orchestrator
        .deploy(&config.job_spec(), RestorePolicy::default())
        .await?;

    info!(
        job = %outcome.job_name,
        created = outcome.created,
        logging_attached = outcome.logging_attached,
        started = outcome.started,
        state = ?outcome.final_state,
        "Orchestration finished"
    );
    Ok(())
}

use crate::sink::ArtifactRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Lifecycle of one processor job identity. Redeploys of the same name must
/// never move a job backwards or repeat a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Defined,
    Created,
    LoggingAttached,
    Started,
    Running,
    Failed,
}

impl JobState {
    /// True once the one-time start command has been issued; `Running` is
    /// reported by the job service after the processor comes up.
    pub fn is_started(self) -> bool {
        matches!(self, JobState::Started | JobState::Running)
    }
}

/// Where the processor begins consuming the source stream on first start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InitialPosition {
    Latest,
    TrimHorizon,
}

impl InitialPosition {
    pub fn as_str(self) -> &'static str {
        match self {
            InitialPosition::Latest => "LATEST",
            InitialPosition::TrimHorizon => "TRIM_HORIZON",
        }
    }
}

/// Everything needed to provision the processor job. `name` is the stable
/// identity across redeploys and the idempotency key for the one-time start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub artifact: ArtifactRef,
    pub source_stream: String,
    pub runtime: String,
    pub parallelism: u32,
    pub initial_position: InitialPosition,
    pub sink_bucket: String,
    /// Log stream name override; defaults to `<name>-app`.
    pub log_stream: Option<String>,
}

impl JobSpec {
    /// The property map handed to the processor's runtime environment.
    pub fn runtime_properties(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("source.stream".to_string(), self.source_stream.clone()),
            (
                "source.initial.position".to_string(),
                self.initial_position.as_str().to_string(),
            ),
            ("sink.bucket".to_string(), self.sink_bucket.clone()),
        ])
    }
}

/// Handle returned by job creation. The log group only exists after create,
/// which is why attaching logging is ordered strictly behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRef {
    pub id: String,
    pub name: String,
    pub log_group: String,
}

/// Logging destination bound to a created job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingDestination {
    pub log_group: String,
    pub log_stream: String,
}

impl LoggingDestination {
    pub fn for_job(job: &JobRef, stream_override: Option<&str>) -> Self {
        Self {
            log_group: job.log_group.clone(),
            log_stream: stream_override
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("{}-app", job.name)),
        }
    }
}

/// Restore behavior carried on the one-time start command. Defaults skip
/// any prior checkpoint and tolerate state the new processor version cannot
/// map, so a redeployed job starts cleanly from the stream's configured
/// initial position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RestorePolicy {
    pub skip_restore_from_snapshot: bool,
    pub allow_non_restored_state: bool,
}

impl Default for RestorePolicy {
    fn default() -> Self {
        Self {
            skip_restore_from_snapshot: true,
            allow_non_restored_state: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum JobApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("referenced resource missing: {0}")]
    MissingDependency(String),

    #[error("job service returned status {status}: {message}")]
    Service { status: u16, message: String },
}

/// Control surface of the external job service. The orchestrator sequences
/// these calls; the service owns the job's runtime from then on.
#[async_trait]
pub trait JobControl: Send + Sync {
    async fn create_job(&self, spec: &JobSpec) -> Result<JobRef, JobApiError>;
    async fn attach_logging(
        &self,
        job: &JobRef,
        destination: &LoggingDestination,
    ) -> Result<(), JobApiError>;
    async fn start_job(&self, job: &JobRef, policy: &RestorePolicy) -> Result<(), JobApiError>;
}

/// HTTP client for the job service.
#[derive(Debug, Clone)]
pub struct HttpJobControl {
    base_url: String,
    client: reqwest::Client,
}

impl HttpJobControl {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, JobApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, JobApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            404 => JobApiError::MissingDependency(message),
            s => JobApiError::Service { status: s, message },
        })
    }

    fn map_send_error(error: reqwest::Error) -> JobApiError {
        if error.is_timeout() {
            JobApiError::Timeout
        } else {
            JobApiError::Http(error)
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateJobRequest<'a> {
    name: &'a str,
    artifact: &'a ArtifactRef,
    source_stream: &'a str,
    runtime: &'a str,
    parallelism: u32,
    runtime_properties: BTreeMap<String, String>,
}

#[async_trait]
impl JobControl for HttpJobControl {
    async fn create_job(&self, spec: &JobSpec) -> Result<JobRef, JobApiError> {
        let url = format!("{}/jobs", self.base_url);
        let request = CreateJobRequest {
            name: &spec.name,
            artifact: &spec.artifact,
            source_stream: &spec.source_stream,
            runtime: &spec.runtime,
            parallelism: spec.parallelism,
            runtime_properties: spec.runtime_properties(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn attach_logging(
        &self,
        job: &JobRef,
        destination: &LoggingDestination,
    ) -> Result<(), JobApiError> {
        let url = format!("{}/jobs/{}/logging", self.base_url, job.id);
        let response = self
            .client
            .post(&url)
            .json(destination)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn start_job(&self, job: &JobRef, policy: &RestorePolicy) -> Result<(), JobApiError> {
        let url = format!("{}/jobs/{}/start", self.base_url, job.id);
        let response = self
            .client
            .post(&url)
            .json(policy)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        Self::check(response).await?;
        Ok(())
    }
}

/// In-memory job service for tests. Records every call in order so tests can
/// assert both counts and sequencing; individual steps can be scripted to
/// fail once.
#[derive(Debug, Default)]
pub struct MemoryJobControl {
    calls: Mutex<Vec<String>>,
    next_id: Mutex<u64>,
    fail_create: Mutex<Option<String>>,
    fail_attach: Mutex<Option<String>>,
    fail_start: Mutex<Option<String>>,
}

impl MemoryJobControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_create(&self, message: &str) {
        *self.fail_create.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_next_attach(&self, message: &str) {
        *self.fail_attach.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_next_start(&self, message: &str) {
        *self.fail_start.lock().unwrap() = Some(message.to_string());
    }

    /// Every call in invocation order, e.g. `["create:app", "attach:job-1"]`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn scripted_failure(slot: &Mutex<Option<String>>) -> Option<JobApiError> {
        slot.lock().unwrap().take().map(|message| JobApiError::Service {
            status: 500,
            message,
        })
    }
}

#[async_trait]
impl JobControl for MemoryJobControl {
    async fn create_job(&self, spec: &JobSpec) -> Result<JobRef, JobApiError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("create:{}", spec.name));
        if let Some(error) = Self::scripted_failure(&self.fail_create) {
            return Err(error);
        }

        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        Ok(JobRef {
            id: format!("job-{}", next),
            name: spec.name.clone(),
            log_group: format!("/jobs/{}", spec.name),
        })
    }

    async fn attach_logging(
        &self,
        job: &JobRef,
        _destination: &LoggingDestination,
    ) -> Result<(), JobApiError> {
        self.calls.lock().unwrap().push(format!("attach:{}", job.id));
        if let Some(error) = Self::scripted_failure(&self.fail_attach) {
            return Err(error);
        }
        Ok(())
    }

    async fn start_job(&self, job: &JobRef, _policy: &RestorePolicy) -> Result<(), JobApiError> {
        self.calls.lock().unwrap().push(format!("start:{}", job.id));
        if let Some(error) = Self::scripted_failure(&self.fail_start) {
            return Err(error);
        }
        Ok(())
    }
}

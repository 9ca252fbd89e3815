use crate::orchestrator::{InitialPosition, JobSpec};
use crate::sink::ArtifactRef;
use crate::source::FetchWindow;
use std::path::PathBuf;
use std::time::Duration;

/// Which candle provider backs the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Synthetic,
    Rest,
}

/// Configuration for one producer tick, environment-supplied by the
/// deployment platform. Validated before any side effect.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub stream_name: String,
    pub ticker: String,
    pub window: FetchWindow,
    pub dry_run: bool,
    pub source: SourceKind,
    /// Stream service endpoint. Unused (and not required) in dry-run mode.
    pub log_api_url: Option<String>,
    /// Upstream market-data endpoint; required for the rest source.
    pub data_api_url: Option<String>,
    /// Name of the secret holding the upstream credentials; required for
    /// the rest source.
    pub api_secret_name: Option<String>,
    pub write_timeout: Duration,
    pub max_attempts: usize,
}

/// Configuration for one orchestration run.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub job_name: String,
    pub artifact: ArtifactRef,
    pub source_stream: String,
    pub job_api_url: String,
    pub sink_api_url: String,
    pub state_dir: PathBuf,
    pub runtime: String,
    pub parallelism: u32,
    pub initial_position: InitialPosition,
    pub sink_bucket: String,
    pub log_stream: Option<String>,
    pub call_timeout: Duration,
}

impl DeployConfig {
    pub fn job_spec(&self) -> JobSpec {
        JobSpec {
            name: self.job_name.clone(),
            artifact: self.artifact.clone(),
            source_stream: self.source_stream.clone(),
            runtime: self.runtime.clone(),
            parallelism: self.parallelism,
            initial_position: self.initial_position,
            sink_bucket: self.sink_bucket.clone(),
            log_stream: self.log_stream.clone(),
        }
    }
}

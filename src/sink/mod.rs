use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("artifact probe failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("artifact store returned status {0}")]
    Service(u16),
}

/// Location of the processor's executable artifact in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub bucket: String,
    pub key: String,
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// The durable object store the processor sinks into. Only the artifact
/// existence/permission probe is visible here; the processor writes to the
/// store continuously outside this crate's responsibility.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn accepts_artifact(&self, artifact: &ArtifactRef) -> Result<bool, SinkError>;
}

/// Probes the object store over HTTP with a HEAD request.
#[derive(Debug, Clone)]
pub struct HttpArtifactStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpArtifactStore {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn accepts_artifact(&self, artifact: &ArtifactRef) -> Result<bool, SinkError> {
        let url = format!("{}/{}/{}", self.base_url, artifact.bucket, artifact.key);
        let response = self.client.head(&url).send().await?;

        match response.status().as_u16() {
            200 => Ok(true),
            403 | 404 => Ok(false),
            s => Err(SinkError::Service(s)),
        }
    }
}

/// In-memory artifact store for tests: knows exactly the refs inserted.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    known: Mutex<HashSet<String>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, artifact: &ArtifactRef) {
        self.known.lock().unwrap().insert(artifact.to_string());
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn accepts_artifact(&self, artifact: &ArtifactRef) -> Result<bool, SinkError> {
        Ok(self.known.lock().unwrap().contains(&artifact.to_string()))
    }
}

use crate::orchestrator::job::{JobRef, JobState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt state for job `{name}`: {source}")]
    Corrupt {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable record of where a job identity is in its lifecycle. One document
/// per job name; the document survives redeploys and is the source of truth
/// for which transitions have already run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStateRecord {
    pub name: String,
    pub state: JobState,
    pub job: Option<JobRef>,
    pub failed_step: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Durable state behind the orchestrator. `claim_start` is the idempotency
/// gate for the one-time start: an atomic read-or-set, so two concurrent
/// orchestration runs cannot both conclude "not yet started".
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, name: &str) -> Result<Option<JobStateRecord>, StateStoreError>;
    async fn record(&self, record: &JobStateRecord) -> Result<(), StateStoreError>;
    async fn claim_start(&self, name: &str) -> Result<bool, StateStoreError>;
}

/// File-backed store: one JSON document per job under the state directory,
/// written via tempfile-and-rename; the start claim is an `O_EXCL` marker
/// file, so exactly one claimant wins.
#[derive(Debug)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: PathBuf) -> Result<Self, StateStoreError> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn state_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    fn claim_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.start", name))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, name: &str) -> Result<Option<JobStateRecord>, StateStoreError> {
        let raw = match fs::read_to_string(self.state_path(name)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record = serde_json::from_str(&raw).map_err(|source| StateStoreError::Corrupt {
            name: name.to_string(),
            source,
        })?;
        Ok(Some(record))
    }

    async fn record(&self, record: &JobStateRecord) -> Result<(), StateStoreError> {
        let path = self.state_path(&record.name);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(record).map_err(|source| StateStoreError::Corrupt {
            name: record.name.clone(),
            source,
        })?;

        fs::write(&tmp, body)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    async fn claim_start(&self, name: &str) -> Result<bool, StateStoreError> {
        use std::io::Write;

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.claim_path(name))
        {
            Ok(mut file) => {
                write!(file, "{}", Utc::now().to_rfc3339())?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store with the same claim semantics, for tests.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<String, JobStateRecord>>,
    claims: Mutex<HashSet<String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, name: &str) -> Result<Option<JobStateRecord>, StateStoreError> {
        Ok(self.records.lock().unwrap().get(name).cloned())
    }

    async fn record(&self, record: &JobStateRecord) -> Result<(), StateStoreError> {
        self.records
            .lock()
            .unwrap()
            .insert(record.name.clone(), record.clone());
        Ok(())
    }

    async fn claim_start(&self, name: &str) -> Result<bool, StateStoreError> {
        Ok(self.claims.lock().unwrap().insert(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(name: &str, state: JobState) -> JobStateRecord {
        JobStateRecord {
            name: name.to_string(),
            state,
            job: None,
            failed_step: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().to_path_buf()).unwrap();

        assert!(store.load("app").await.unwrap().is_none());

        store.record(&record("app", JobState::Created)).await.unwrap();
        let loaded = store.load("app").await.unwrap().unwrap();
        assert_eq!(loaded.state, JobState::Created);

        store
            .record(&record("app", JobState::LoggingAttached))
            .await
            .unwrap();
        let loaded = store.load("app").await.unwrap().unwrap();
        assert_eq!(loaded.state, JobState::LoggingAttached);
    }

    #[tokio::test]
    async fn test_file_store_claim_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().to_path_buf()).unwrap();

        assert!(store.claim_start("app").await.unwrap());
        assert!(!store.claim_start("app").await.unwrap());
        assert!(store.claim_start("other-app").await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_survives_a_fresh_store_over_the_same_dir() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().to_path_buf()).unwrap();
        assert!(store.claim_start("app").await.unwrap());

        let second = FileStateStore::new(dir.path().to_path_buf()).unwrap();
        assert!(!second.claim_start("app").await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupt_state_surfaces_as_error() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().to_path_buf()).unwrap();
        fs::write(dir.path().join("app.json"), "not json").unwrap();

        assert!(matches!(
            store.load("app").await,
            Err(StateStoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_memory_store_claim_semantics_match() {
        let store = MemoryStateStore::new();
        assert!(store.claim_start("app").await.unwrap());
        assert!(!store.claim_start("app").await.unwrap());
    }
}

pub mod job;
pub mod runner;
pub mod state_store;

pub use job::{
    HttpJobControl, InitialPosition, JobApiError, JobControl, JobRef, JobSpec, JobState,
    LoggingDestination, MemoryJobControl, RestorePolicy,
};
pub use runner::{DeployOutcome, Orchestrator, OrchestratorError};
pub use state_store::{
    FileStateStore, JobStateRecord, MemoryStateStore, StateStore, StateStoreError,
};

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret `{0}` not found")]
    NotFound(String),

    #[error("secret `{name}` is malformed: {source}")]
    Malformed {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Credentials for the upstream market-data provider, stored as the secret
/// document `{"api_key": ..., "api_secret": ...}`.
#[derive(Clone, Deserialize)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Retrieval side of the external secret manager. Absence of a required
/// secret is a configuration failure, never retried.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<ApiCredentials, SecretError>;
}

/// Reads secrets the deployment platform injected into the process
/// environment: the variable named by the secret holds the JSON document.
#[derive(Debug, Default)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, name: &str) -> Result<ApiCredentials, SecretError> {
        let raw = std::env::var(name).map_err(|_| SecretError::NotFound(name.to_string()))?;
        serde_json::from_str(&raw).map_err(|source| SecretError::Malformed {
            name: name.to_string(),
            source,
        })
    }
}

/// In-memory secret store for tests.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<String, ApiCredentials>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, credentials: ApiCredentials) {
        self.secrets
            .lock()
            .unwrap()
            .insert(name.to_string(), credentials);
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_secret(&self, name: &str) -> Result<ApiCredentials, SecretError> {
        self.secrets
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }
}

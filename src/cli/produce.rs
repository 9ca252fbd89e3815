use crate::config::{self, ConfigError, ProducerConfig, SourceKind};
use crate::producer::writer::WriteError;
use crate::producer::{BatchWriter, ChunkLimits, RetryPolicy, WriterConfig};
use crate::secrets::{EnvSecretStore, SecretError, SecretStore};
use crate::source::{CandleProvider, RestProvider, SourceError, SyntheticProvider};
use crate::stream::{HttpTransport, MemoryTransport, StreamTransport, TransportError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ProduceError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("secret error: {0}")]
    Secret(#[from] SecretError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("write error: {0}")]
    Write(#[from] WriteError),

    #[error("{failed} of {total} records failed to write")]
    PartialFailure { failed: usize, total: usize },
}

/// Entry point for one scheduled producer tick. No durable state is carried
/// between invocations; overlapping ticks each own their records and report.
pub async fn run(dry_run_override: Option<bool>) -> Result<(), ProduceError> {
    let mut config = config::producer_from_env()?;
    if let Some(dry_run) = dry_run_override {
        config.dry_run = dry_run;
    }
    produce(config, &EnvSecretStore::new()).await
}

pub async fn produce(
    config: ProducerConfig,
    secrets: &dyn SecretStore,
) -> Result<(), ProduceError> {
    let invocation = Uuid::new_v4();
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    info!(
        invocation = %invocation,
        host = %host,
        ticker = %config.ticker,
        stream = %config.stream_name,
        dry_run = config.dry_run,
        "Producer tick starting"
    );

    let provider: Box<dyn CandleProvider> = match config.source {
        SourceKind::Synthetic => Box::new(SyntheticProvider::new()),
        SourceKind::Rest => {
            let secret_name = config
                .api_secret_name
                .as_deref()
                .ok_or(ConfigError::Missing("API_SECRET_NAME"))?;
            let data_api_url = config
                .data_api_url
                .clone()
                .ok_or(ConfigError::Missing("DATA_API_URL"))?;
            let credentials = secrets.get_secret(secret_name).await?;
            Box::new(RestProvider::new(
                data_api_url,
                config.write_timeout,
                credentials,
            )?)
        }
    };

    let candles = provider.fetch(&config.ticker, &config.window).await?;
    info!(invocation = %invocation, count = candles.len(), "Fetched candles");
    for candle in candles.iter().take(3) {
        debug!(
            invocation = %invocation,
            sample = %serde_json::to_string(candle).unwrap_or_default(),
            "Sample candle"
        );
    }

    let records: Vec<_> = candles.into_iter().map(|c| c.into_record()).collect();
    let total = records.len();

    let transport: Arc<dyn StreamTransport> = if config.dry_run {
        Arc::new(MemoryTransport::new())
    } else {
        let url = config
            .log_api_url
            .clone()
            .ok_or(ConfigError::Missing("LOG_API_URL"))?;
        Arc::new(HttpTransport::new(url, config.write_timeout)?)
    };

    let writer = BatchWriter::new(
        transport,
        WriterConfig {
            stream_name: config.stream_name.clone(),
            dry_run: config.dry_run,
            limits: ChunkLimits::default(),
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                ..RetryPolicy::default()
            },
        },
    );

    let report = writer.write(records).await?;
    if report.all_accepted() {
        info!(invocation = %invocation, accepted = report.accepted, "Producer tick complete");
        return Ok(());
    }

    for failure in &report.failed {
        warn!(
            invocation = %invocation,
            key = %failure.record.partition_key,
            kind = ?failure.kind,
            reason = %failure.reason,
            "Record failed"
        );
    }
    Err(ProduceError::PartialFailure {
        failed: report.failed.len(),
        total,
    })
}

use crate::config::types::{DeployConfig, ProducerConfig, SourceKind};
use crate::orchestrator::InitialPosition;
use crate::sink::ArtifactRef;
use crate::source::FetchWindow;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable `{0}` is not set")]
    Missing(&'static str),

    #[error("environment variable `{name}` is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Upper bound on candles per fetch, so a mistyped window cannot ask for
/// millions of records in one tick.
const MAX_WINDOW_RECORDS: usize = 10_000;

/// Load producer configuration from the process environment.
pub fn producer_from_env() -> Result<ProducerConfig, ConfigError> {
    producer_from_lookup(|name| std::env::var(name).ok())
}

/// Load deploy configuration from the process environment.
pub fn deploy_from_env() -> Result<DeployConfig, ConfigError> {
    deploy_from_lookup(|name| std::env::var(name).ok())
}

/// Parse producer configuration from an injected lookup, so tests supply a
/// map instead of mutating process env.
pub fn producer_from_lookup<F>(lookup: F) -> Result<ProducerConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let stream_name = required(&lookup, "STREAM_NAME")?;

    let ticker = optional(&lookup, "TICKER").unwrap_or_else(|| "MSFT".to_string());
    let period_label = optional(&lookup, "PERIOD").unwrap_or_else(|| "1d".to_string());
    let interval_label = optional(&lookup, "INTERVAL").unwrap_or_else(|| "1m".to_string());

    let period = parse_duration("PERIOD", &period_label)?;
    let interval = parse_duration("INTERVAL", &interval_label)?;
    if interval.is_zero() {
        return Err(ConfigError::Invalid {
            name: "INTERVAL",
            reason: "interval must be non-zero".to_string(),
        });
    }
    if period < interval {
        return Err(ConfigError::Invalid {
            name: "PERIOD",
            reason: format!(
                "period {} is shorter than interval {}",
                period_label, interval_label
            ),
        });
    }

    let window = FetchWindow {
        period,
        interval,
        period_label,
        interval_label,
    };
    if window.record_count() > MAX_WINDOW_RECORDS {
        return Err(ConfigError::Invalid {
            name: "PERIOD",
            reason: format!(
                "window spans {} records, limit is {}",
                window.record_count(),
                MAX_WINDOW_RECORDS
            ),
        });
    }

    let dry_run = parse_bool("DRY_RUN", optional(&lookup, "DRY_RUN"), false)?;

    let source = match optional(&lookup, "SOURCE").as_deref() {
        None | Some("synthetic") => SourceKind::Synthetic,
        Some("rest") => SourceKind::Rest,
        Some(other) => {
            return Err(ConfigError::Invalid {
                name: "SOURCE",
                reason: format!("unknown source `{}` (expected synthetic or rest)", other),
            })
        }
    };

    let log_api_url = optional(&lookup, "LOG_API_URL");
    if !dry_run && log_api_url.is_none() {
        return Err(ConfigError::Missing("LOG_API_URL"));
    }

    let data_api_url = optional(&lookup, "DATA_API_URL");
    let api_secret_name = optional(&lookup, "API_SECRET_NAME");
    if source == SourceKind::Rest {
        if data_api_url.is_none() {
            return Err(ConfigError::Missing("DATA_API_URL"));
        }
        if api_secret_name.is_none() {
            return Err(ConfigError::Missing("API_SECRET_NAME"));
        }
    }

    let write_timeout = parse_duration(
        "WRITE_TIMEOUT",
        &optional(&lookup, "WRITE_TIMEOUT").unwrap_or_else(|| "10s".to_string()),
    )?;
    let max_attempts = parse_count("MAX_ATTEMPTS", optional(&lookup, "MAX_ATTEMPTS"), 5)?;

    Ok(ProducerConfig {
        stream_name,
        ticker,
        window,
        dry_run,
        source,
        log_api_url,
        data_api_url,
        api_secret_name,
        write_timeout,
        max_attempts,
    })
}

/// Parse deploy configuration from an injected lookup.
pub fn deploy_from_lookup<F>(lookup: F) -> Result<DeployConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let job_name = required(&lookup, "JOB_NAME")?;
    if !job_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Invalid {
            name: "JOB_NAME",
            reason: "job names may only contain letters, digits, `-` and `_`".to_string(),
        });
    }

    let artifact = ArtifactRef {
        bucket: required(&lookup, "ARTIFACT_BUCKET")?,
        key: required(&lookup, "ARTIFACT_KEY")?,
    };
    let source_stream = required(&lookup, "SOURCE_STREAM")?;
    let job_api_url = required(&lookup, "JOB_API_URL")?;
    let sink_api_url = required(&lookup, "SINK_API_URL")?;

    let state_dir = PathBuf::from(
        optional(&lookup, "STATE_DIR").unwrap_or_else(|| "/var/lib/marketpipe".to_string()),
    );
    let runtime = optional(&lookup, "RUNTIME").unwrap_or_else(|| "FLINK-1_20".to_string());
    let parallelism = parse_count("PARALLELISM", optional(&lookup, "PARALLELISM"), 1)? as u32;

    let initial_position = match optional(&lookup, "INITIAL_POSITION")
        .map(|p| p.to_ascii_lowercase().replace('_', "-"))
        .as_deref()
    {
        None | Some("trim-horizon") => InitialPosition::TrimHorizon,
        Some("latest") => InitialPosition::Latest,
        Some(other) => {
            return Err(ConfigError::Invalid {
                name: "INITIAL_POSITION",
                reason: format!(
                    "unknown position `{}` (expected latest or trim-horizon)",
                    other
                ),
            })
        }
    };

    // The original deployment reused the artifact bucket as the processor's
    // output bucket unless told otherwise.
    let sink_bucket =
        optional(&lookup, "SINK_BUCKET").unwrap_or_else(|| artifact.bucket.clone());
    let log_stream = optional(&lookup, "LOG_DESTINATION");
    let call_timeout = parse_duration(
        "CALL_TIMEOUT",
        &optional(&lookup, "CALL_TIMEOUT").unwrap_or_else(|| "30s".to_string()),
    )?;

    Ok(DeployConfig {
        job_name,
        artifact,
        source_stream,
        job_api_url,
        sink_api_url,
        state_dir,
        runtime,
        parallelism,
        initial_position,
        sink_bucket,
        log_stream,
        call_timeout,
    })
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|value| !value.trim().is_empty())
}

fn parse_duration(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn parse_bool(
    name: &'static str,
    raw: Option<String>,
    default: bool,
) -> Result<bool, ConfigError> {
    match raw.map(|v| v.to_ascii_lowercase()).as_deref() {
        None => Ok(default),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            name,
            reason: format!("expected true or false, got `{}`", other),
        }),
    }
}

fn parse_count(
    name: &'static str,
    raw: Option<String>,
    default: usize,
) -> Result<usize, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value: usize = raw.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        reason: format!("expected a positive integer, got `{}`", raw),
    })?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            name,
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(value)
}

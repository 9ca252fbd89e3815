use crate::secrets::ApiCredentials;
use crate::source::{Candle, CandleProvider, FetchWindow, SourceError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Authenticated client for the upstream market-data REST API. Read-only:
/// the provider only ever issues GETs.
#[derive(Debug)]
pub struct RestProvider {
    base_url: String,
    client: reqwest::Client,
    credentials: ApiCredentials,
}

impl RestProvider {
    pub fn new(
        base_url: String,
        timeout: Duration,
        credentials: ApiCredentials,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            credentials,
        })
    }
}

// ===== Response Types =====

#[derive(Debug, Deserialize)]
struct BarsResponse {
    bars: Vec<Bar>,
}

#[derive(Debug, Deserialize)]
struct Bar {
    /// Bar timestamp, epoch milliseconds.
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: u64,
}

#[async_trait]
impl CandleProvider for RestProvider {
    async fn fetch(&self, symbol: &str, window: &FetchWindow) -> Result<Vec<Candle>, SourceError> {
        let url = format!(
            "{}/stocks/{}/bars?interval={}&limit={}",
            self.base_url,
            symbol,
            window.interval_label,
            window.record_count()
        );

        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.credentials.api_key)
            .header("X-Api-Secret", &self.credentials.api_secret)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::Unavailable {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: BarsResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))?;

        let mut candles = Vec::with_capacity(body.bars.len());
        for bar in body.bars {
            let ts = DateTime::<Utc>::from_timestamp_millis(bar.t)
                .ok_or_else(|| SourceError::Malformed(format!("bar timestamp {} out of range", bar.t)))?;
            candles.push(Candle {
                symbol: symbol.to_string(),
                ts,
                open: bar.o,
                high: bar.h,
                low: bar.l,
                close: bar.c,
                volume: bar.v,
                interval: window.interval_label.clone(),
                period: window.period_label.clone(),
                source: "rest".to_string(),
            });
        }

        // The contract is newest-first regardless of upstream order.
        candles.sort_by(|a, b| b.ts.cmp(&a.ts));

        Ok(candles)
    }
}

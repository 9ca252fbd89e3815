use crate::source::{Candle, CandleProvider, FetchWindow, SourceError};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;

/// Generates plausible OHLCV bars without touching any upstream provider.
/// Used when `SOURCE=synthetic` and as the default for local runs.
#[derive(Debug, Default)]
pub struct SyntheticProvider;

impl SyntheticProvider {
    pub fn new() -> Self {
        Self
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[async_trait]
impl CandleProvider for SyntheticProvider {
    async fn fetch(&self, symbol: &str, window: &FetchWindow) -> Result<Vec<Candle>, SourceError> {
        let count = window.record_count();
        let interval_ms = window.interval.as_millis() as i64;
        let now = Utc::now();
        let mut rng = rand::thread_rng();

        let mut candles = Vec::with_capacity(count);
        for i in 0..count {
            let ts = now - chrono::Duration::milliseconds(interval_ms * i as i64);
            let open = round2(rng.gen_range(100.0..200.0));
            let high = round2(open + rng.gen_range(0.0..10.0));
            let low = round2(open - rng.gen_range(0.0..10.0));
            let close = round2(rng.gen_range(low..=high));
            let volume = rng.gen_range(1_000..=10_000);

            candles.push(Candle {
                symbol: symbol.to_string(),
                ts,
                open,
                high,
                low,
                close,
                volume,
                interval: window.interval_label.clone(),
                period: window.period_label.clone(),
                source: "synthetic".to_string(),
            });
        }

        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn minute_window(period_secs: u64) -> FetchWindow {
        FetchWindow {
            period: Duration::from_secs(period_secs),
            interval: Duration::from_secs(60),
            period_label: format!("{}s", period_secs),
            interval_label: "1m".to_string(),
        }
    }

    #[tokio::test]
    async fn test_five_minute_window_yields_five_decreasing_candles() {
        let provider = SyntheticProvider::new();
        let candles = provider.fetch("MSFT", &minute_window(300)).await.unwrap();

        assert_eq!(candles.len(), 5);
        for pair in candles.windows(2) {
            assert!(pair[0].ts > pair[1].ts);
            assert_eq!((pair[0].ts - pair[1].ts).num_milliseconds(), 60_000);
        }
    }

    #[tokio::test]
    async fn test_ohlc_invariants_hold() {
        let provider = SyntheticProvider::new();
        let candles = provider.fetch("MSFT", &minute_window(3600)).await.unwrap();

        assert_eq!(candles.len(), 60);
        for candle in &candles {
            assert_eq!(candle.symbol, "MSFT");
            assert!(candle.low <= candle.open && candle.open <= candle.high);
            assert!(candle.low <= candle.close && candle.close <= candle.high);
            assert!((1_000..=10_000).contains(&candle.volume));
            assert_eq!(candle.source, "synthetic");
        }
    }
}

//! Candlestick (OHLCV) passthrough.
//!
//! One validated request in, one upstream call out. There is no caching and
//! no merging: the result is whatever Bybit returns for that series.
//!
//! | Parameter  | Rule                                              |
//! |------------|---------------------------------------------------|
//! | `symbol`   | required, normalized to upper case                |
//! | `interval` | one of `1 3 5 15 30 60 120 240 360 720 D W M`     |
//! | `limit`    | `1..=1000` (default 1000)                         |
//! | `start_ms` | optional, must not exceed `end_ms`                |

use anyhow::Context;
use coinagg_core::config::KlineConfig;
use coinagg_core::{AggError, Candle, Symbol, normalize_symbol};
use tracing::debug;

use super::json_parser;

const KLINE_PATH: &str = "/v5/market/kline";

/// Intervals accepted by Bybit (minutes, or day / week / month).
pub const VALID_INTERVALS: &[&str] =
    &["1", "3", "5", "15", "30", "60", "120", "240", "360", "720", "D", "W", "M"];

/// Maximum candles per request.
pub const MAX_LIMIT: u32 = 1000;

/// A candlestick query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlineRequest {
    pub symbol: Symbol,
    pub interval: String,
    pub start_ms: Option<u64>,
    pub end_ms: Option<u64>,
    pub limit: u32,
}

impl KlineRequest {
    /// Request the latest [`MAX_LIMIT`] candles.
    pub fn new(symbol: &str, interval: &str) -> Self {
        Self {
            symbol: normalize_symbol(symbol),
            interval: interval.trim().to_string(),
            start_ms: None,
            end_ms: None,
            limit: MAX_LIMIT,
        }
    }

    /// Reject requests that cannot succeed before spending an upstream call.
    pub fn validate(&self) -> Result<(), AggError> {
        if self.symbol.is_empty() || self.interval.is_empty() {
            return Err(AggError::InvalidRequest("symbol and interval are required".into()));
        }
        if !VALID_INTERVALS.contains(&self.interval.as_str()) {
            return Err(AggError::InvalidRequest(format!(
                "unsupported interval '{}', expected one of {}",
                self.interval,
                VALID_INTERVALS.join(" ")
            )));
        }
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(AggError::InvalidRequest(format!(
                "limit must be in 1..={MAX_LIMIT}, got {}",
                self.limit
            )));
        }
        if let (Some(start), Some(end)) = (self.start_ms, self.end_ms) {
            if start > end {
                return Err(AggError::InvalidRequest(format!("start {start} is after end {end}")));
            }
        }
        Ok(())
    }

    /// Query-string pairs for the kline endpoint.
    fn query(&self, category: &str) -> Vec<(&'static str, String)> {
        let mut q = vec![
            ("category", category.to_string()),
            ("symbol", self.symbol.clone()),
            ("interval", self.interval.clone()),
            ("limit", self.limit.to_string()),
        ];
        if let Some(start) = self.start_ms {
            q.push(("start", start.to_string()));
        }
        if let Some(end) = self.end_ms {
            q.push(("end", end.to_string()));
        }
        q
    }
}

/// Stateless Bybit kline client.
pub struct BybitKlineClient {
    http: reqwest::Client,
    base_url: String,
    category: String,
}

impl BybitKlineClient {
    pub fn new(cfg: &KlineConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .build()
            .context("build HTTP client")?;
        Ok(Self { http, base_url: cfg.base_url.clone(), category: cfg.category.clone() })
    }

    /// Fetch one candlestick series.
    ///
    /// Returns [`AggError::InvalidRequest`] without any network call when the
    /// request fails validation, and [`AggError::NotFound`] when Bybit returns
    /// an empty series (unknown symbol, or no trading in the range).
    pub async fn fetch(&self, req: &KlineRequest) -> Result<Vec<Candle>, AggError> {
        req.validate()?;

        let candles = self
            .fetch_raw(req)
            .await
            .map_err(|e| AggError::source_failed("bybit-klines", format!("{e:#}")))?;
        if candles.is_empty() {
            return Err(AggError::NotFound(format!(
                "no kline data for {} at interval {}",
                req.symbol, req.interval
            )));
        }
        debug!("[klines] {} {} → {} candle(s)", req.symbol, req.interval, candles.len());
        Ok(candles)
    }

    async fn fetch_raw(&self, req: &KlineRequest) -> anyhow::Result<Vec<Candle>> {
        let url = format!("{}{}", self.base_url, KLINE_PATH);
        let body: serde_json::Value = self
            .http
            .get(&url)
            .query(&req.query(&self.category))
            .send()
            .await
            .context("kline request failed")?
            .error_for_status()
            .context("kline HTTP error")?
            .json()
            .await
            .context("kline body is not JSON")?;
        json_parser::parse_klines(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_request_normalizes() {
        let req = KlineRequest::new(" btcusdt", "60 ");
        assert_eq!(req.symbol, "BTCUSDT");
        assert_eq!(req.interval, "60");
        assert_eq!(req.limit, MAX_LIMIT);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn rejects_missing_parameters() {
        assert!(matches!(KlineRequest::new("", "60").validate(), Err(AggError::InvalidRequest(_))));
        assert!(matches!(
            KlineRequest::new("BTCUSDT", "").validate(),
            Err(AggError::InvalidRequest(_))
        ));
    }

    #[test]
    fn rejects_bad_interval_and_limit() {
        assert!(KlineRequest::new("BTCUSDT", "2").validate().is_err());
        assert!(KlineRequest::new("BTCUSDT", "d").validate().is_err());

        let mut req = KlineRequest::new("BTCUSDT", "D");
        req.limit = 0;
        assert!(req.validate().is_err());
        req.limit = MAX_LIMIT + 1;
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_inverted_range() {
        let mut req = KlineRequest::new("BTCUSDT", "W");
        req.start_ms = Some(2_000);
        req.end_ms = Some(1_000);
        assert!(req.validate().is_err());
        req.end_ms = Some(2_000);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn query_includes_optional_bounds() {
        let mut req = KlineRequest::new("BTCUSDT", "1");
        req.limit = 10;
        req.start_ms = Some(5);
        let q = req.query("spot");
        assert!(q.contains(&("limit", "10".to_string())));
        assert!(q.contains(&("start", "5".to_string())));
        assert!(!q.iter().any(|(k, _)| *k == "end"));
    }

    #[tokio::test]
    async fn invalid_request_fails_before_network() {
        let client = BybitKlineClient::new(&KlineConfig {
            base_url: "http://127.0.0.1:9".into(),
            category: "spot".into(),
            timeout_ms: 100,
        })
        .unwrap();
        let err = client.fetch(&KlineRequest::new("BTCUSDT", "7")).await.unwrap_err();
        assert!(matches!(err, AggError::InvalidRequest(_)));
    }
}

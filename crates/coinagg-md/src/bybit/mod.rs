//! Bybit market data over the v5 public REST API.
//!
//! - [`BybitTickerSource`]: price / 24h change / 24h volume for every spot
//!   pair in one `/v5/market/tickers` call.
//! - [`klines::BybitKlineClient`]: stateless candlestick passthrough; never
//!   touches the cache.

pub mod json_parser;
pub mod klines;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use coinagg_core::config::SourceConfig;
use coinagg_core::{AggError, SymbolUniverse};
use tracing::debug;

use crate::{SourceBatch, UpstreamSource};

pub const BYBIT_REST_URL: &str = "https://api.bybit.com";
const TICKERS_PATH: &str = "/v5/market/tickers";

/// Ticker source: fills `price`, `price_change_24h_pct` and `volume_24h`.
pub struct BybitTickerSource {
    name: String,
    http: reqwest::Client,
    base_url: String,
    category: String,
}

impl BybitTickerSource {
    /// Create a ticker source. `timeout` bounds each HTTP request.
    pub fn new(
        name: String,
        base_url: String,
        category: String,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self { name, http, base_url, category })
    }

    /// Create from a [`SourceConfig`], applying Bybit defaults.
    pub fn from_config(cfg: &SourceConfig, timeout: Duration) -> Result<Self> {
        Self::new(
            cfg.name.clone(),
            cfg.base_url.clone().unwrap_or_else(|| BYBIT_REST_URL.into()),
            cfg.category.clone().unwrap_or_else(|| "spot".into()),
            timeout,
        )
    }

    async fn fetch_tickers(&self, universe: &SymbolUniverse) -> Result<SourceBatch> {
        let url = format!("{}{}", self.base_url, TICKERS_PATH);
        let body: serde_json::Value = self
            .http
            .get(&url)
            .query(&[("category", self.category.as_str())])
            .send()
            .await
            .context("tickers request failed")?
            .error_for_status()
            .context("tickers HTTP error")?
            .json()
            .await
            .context("tickers body is not JSON")?;

        let batch = json_parser::parse_tickers(&body, universe)?;
        debug!("[{}] {} ticker(s) in universe", self.name, batch.len());
        Ok(batch)
    }
}

#[async_trait]
impl UpstreamSource for BybitTickerSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, universe: &SymbolUniverse) -> Result<SourceBatch, AggError> {
        self.fetch_tickers(universe)
            .await
            .map_err(|e| AggError::source_failed(&self.name, format!("{e:#}")))
    }
}

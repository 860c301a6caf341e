//! Source registry: factory for creating upstream sources from config.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use coinagg_core::config::{AppConfig, SourceConfig};

use crate::UpstreamSource;
use crate::bybit::BybitTickerSource;
use crate::coingecko::CoinGeckoSource;
use crate::manual::ManualSource;

/// Create an [`UpstreamSource`] based on the `kind` field in the config.
///
/// `timeout` is the per-source deadline; HTTP sources also apply it to their
/// client so a hung connection is torn down with the request.
pub fn create_source(config: &SourceConfig, timeout: Duration) -> Result<Arc<dyn UpstreamSource>> {
    let source: Arc<dyn UpstreamSource> = match config.kind.to_lowercase().as_str() {
        "bybit_tickers" | "bybit" => Arc::new(BybitTickerSource::from_config(config, timeout)?),
        "coingecko_markets" | "coingecko" => {
            Arc::new(CoinGeckoSource::from_config(config, timeout)?)
        }
        "manual" => Arc::new(ManualSource::from_config(config)),
        other => return Err(anyhow!("unknown source kind '{other}' for source '{}'", config.name)),
    };
    Ok(source)
}

/// Create every configured source, in config order.
pub fn create_sources(config: &AppConfig) -> Result<Vec<Arc<dyn UpstreamSource>>> {
    let timeout = config.cache.source_timeout();
    config.sources.iter().map(|s| create_source(s, timeout)).collect()
}

//! Configuration parsing for the aggregator.
//!
//! Everything is read from a single JSON config file: logging metadata, the
//! symbol universe, cache/refresh timing, the upstream sources, and the
//! merge priority order.
//!
//! # Example config
//!
//! ```json
//! {
//!   "logging": { "module_name": "coinagg", "log_path": "/tmp/log" },
//!   "universe": { "quote_asset": "USDT" },
//!   "cache": { "ttl_secs": 300, "source_timeout_ms": 10000 },
//!   "priority": ["bybit", "coingecko"],
//!   "sources": [
//!     { "name": "bybit", "kind": "bybit_tickers" },
//!     { "name": "coingecko", "kind": "coingecko_markets", "pages": 1 }
//!   ],
//!   "klines": { "base_url": "https://api.bybit.com" }
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AggError;
use crate::types::{PartialRecord, SymbolUniverse};

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Logging metadata (module name, log path, level).
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Which symbols are aggregated.
    #[serde(default)]
    pub universe: SymbolUniverse,

    /// Cache and refresh timing.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Merge priority: for each field, the first source in this list that
    /// supplies it wins. Sources not listed rank after all listed ones.
    #[serde(default)]
    pub priority: Vec<String>,

    /// Upstream sources, one entry per source instance.
    pub sources: Vec<SourceConfig>,

    /// Candlestick passthrough settings.
    #[serde(default)]
    pub klines: KlineConfig,
}

/// Logging metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_module_name")]
    pub module_name: String,
    pub log_path: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { module_name: default_module_name(), log_path: None, log_level: default_log_level() }
    }
}

/// Cache freshness and refresh policy.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Maximum snapshot age before a read triggers a refresh.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Deadline for a single upstream call.
    #[serde(default = "default_source_timeout_ms")]
    pub source_timeout_ms: u64,

    /// Attempts per source per refresh cycle (1 = no retry).
    #[serde(default = "default_source_attempts")]
    pub source_attempts: u32,

    /// Initial backoff between attempts; doubles after each failure.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// After a refresh in which every source failed, keep serving the stale
    /// snapshot for this long before trying again.
    #[serde(default = "default_failure_cooldown_secs")]
    pub failure_cooldown_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn failure_cooldown(&self) -> Duration {
        Duration::from_secs(self.failure_cooldown_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            source_timeout_ms: default_source_timeout_ms(),
            source_attempts: default_source_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            failure_cooldown_secs: default_failure_cooldown_secs(),
        }
    }
}

/// A single upstream source.
///
/// `kind` selects the implementation; the remaining fields are read only by
/// the kinds that use them.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Unique source name, used in `priority` and in snapshot status maps.
    pub name: String,

    /// Source implementation: `"bybit_tickers"`, `"coingecko_markets"`, `"manual"`.
    pub kind: String,

    /// REST base URL override (defaults depend on `kind`).
    pub base_url: Option<String>,

    /// Bybit product category (default: `"spot"`).
    pub category: Option<String>,

    /// CoinGecko valuation currency (default: `"usd"`).
    pub vs_currency: Option<String>,

    /// CoinGecko page size (default: 250, max 250).
    pub per_page: Option<u32>,

    /// CoinGecko pages to fetch per refresh (default: 1).
    pub pages: Option<u32>,

    /// Optional API key sent by sources that support one.
    pub api_key: Option<String>,

    /// Static records for the `manual` kind, keyed by symbol.
    #[serde(default)]
    pub records: BTreeMap<String, PartialRecord>,
}

impl SourceConfig {
    /// Minimal config with only `name` and `kind` set.
    pub fn new(name: &str, kind: &str) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            base_url: None,
            category: None,
            vs_currency: None,
            per_page: None,
            pages: None,
            api_key: None,
            records: BTreeMap::new(),
        }
    }
}

/// Candlestick passthrough settings.
#[derive(Debug, Clone, Deserialize)]
pub struct KlineConfig {
    #[serde(default = "default_bybit_rest_url")]
    pub base_url: String,
    #[serde(default = "default_kline_category")]
    pub category: String,
    #[serde(default = "default_source_timeout_ms")]
    pub timeout_ms: u64,
}

impl KlineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for KlineConfig {
    fn default() -> Self {
        Self {
            base_url: default_bybit_rest_url(),
            category: default_kline_category(),
            timeout_ms: default_source_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Check cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), AggError> {
        if self.sources.is_empty() {
            return Err(AggError::Config("at least one source is required".into()));
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(AggError::Config(format!(
                    "source of kind '{}' has an empty name",
                    source.kind
                )));
            }
            if !names.insert(source.name.as_str()) {
                return Err(AggError::Config(format!("duplicate source name '{}'", source.name)));
            }
        }

        let mut seen = HashSet::new();
        for name in &self.priority {
            if !names.contains(name.as_str()) {
                return Err(AggError::Config(format!("priority names unknown source '{name}'")));
            }
            if !seen.insert(name.as_str()) {
                return Err(AggError::Config(format!("priority lists '{name}' twice")));
            }
        }

        if self.universe.quote_asset.trim().is_empty() {
            return Err(AggError::Config("universe.quote_asset must not be empty".into()));
        }
        if self.cache.ttl_secs == 0 {
            return Err(AggError::Config("cache.ttl_secs must be > 0".into()));
        }
        if self.cache.source_timeout_ms == 0 {
            return Err(AggError::Config("cache.source_timeout_ms must be > 0".into()));
        }
        if self.cache.source_attempts == 0 {
            return Err(AggError::Config("cache.source_attempts must be >= 1".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Defaults (used by serde)
// ---------------------------------------------------------------------------

fn default_module_name() -> String {
    "coinagg".into()
}

fn default_log_level() -> String {
    "info".into()
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_source_timeout_ms() -> u64 {
    10_000
}

fn default_source_attempts() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_failure_cooldown_secs() -> u64 {
    10
}

fn default_bybit_rest_url() -> String {
    "https://api.bybit.com".into()
}

fn default_kline_category() -> String {
    "spot".into()
}

/// Parse a JSON config string and validate it.
pub fn parse_config(content: &str) -> anyhow::Result<AppConfig> {
    let config: AppConfig = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load, parse and validate a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

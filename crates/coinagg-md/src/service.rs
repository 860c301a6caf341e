//! Façade consumed by transport layers.

use std::sync::Arc;

use anyhow::Result;
use coinagg_core::config::AppConfig;
use coinagg_core::{AggError, MarketDataEntry, Snapshot, normalize_symbol};
use tracing::info;

use crate::cache::{CacheStatus, RefreshPolicy, SnapshotCache};
use crate::coordinator::RefreshCoordinator;
use crate::merger::Merger;
use crate::registry::create_sources;

/// Read API over the snapshot cache.
///
/// Both reads may await a refresh (network I/O) when the snapshot is stale;
/// see [`SnapshotCache::get_snapshot`].
#[derive(Clone)]
pub struct AggregationService {
    cache: SnapshotCache,
}

impl AggregationService {
    pub fn new(cache: SnapshotCache) -> Self {
        Self { cache }
    }

    /// Build sources, merger and cache from a validated config.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let sources = create_sources(config)?;
        let policy = RefreshPolicy::from_config(&config.cache);
        let coordinator = RefreshCoordinator::new(
            sources,
            Merger::new(config.priority.clone()),
            config.universe.normalized(),
            &policy,
        );
        info!(
            "aggregation service: sources {:?}, priority {:?}, ttl {:?}",
            coordinator.source_names(),
            config.priority,
            policy.ttl
        );
        Ok(Self::new(SnapshotCache::new(coordinator, &policy)))
    }

    pub async fn get_snapshot(&self) -> Result<Arc<Snapshot>, AggError> {
        self.cache.get_snapshot().await
    }

    /// Look up one symbol in the current snapshot.
    ///
    /// The symbol is normalized (`btcusdt` finds `BTCUSDT`). A symbol the
    /// snapshot does not carry is [`AggError::NotFound`]; no symbol-specific
    /// fetch is made.
    pub async fn get_entry(&self, symbol: &str) -> Result<MarketDataEntry, AggError> {
        let symbol = normalize_symbol(symbol);
        let snapshot = self.get_snapshot().await?;
        snapshot.get(&symbol).cloned().ok_or(AggError::NotFound(symbol))
    }

    pub fn status(&self) -> CacheStatus {
        self.cache.state()
    }
}

#[cfg(test)]
mod tests {
    use coinagg_core::SymbolUniverse;
    use coinagg_core::config::parse_config;

    use super::*;
    use crate::UpstreamSource;
    use crate::test_util::{ScriptedSource, batch, price};

    fn service(source: Arc<ScriptedSource>) -> AggregationService {
        let policy = RefreshPolicy::default();
        let sources: Vec<Arc<dyn UpstreamSource>> = vec![source];
        let coordinator =
            RefreshCoordinator::new(sources, Merger::default(), SymbolUniverse::default(), &policy);
        AggregationService::new(SnapshotCache::new(coordinator, &policy))
    }

    #[tokio::test(start_paused = true)]
    async fn get_entry_normalizes_and_reports_missing() {
        let src = Arc::new(ScriptedSource::ok("a", batch([("BTCUSDT", price(60_000.0))])));
        let svc = service(src.clone());
        assert_eq!(svc.status(), CacheStatus::Empty);

        let btc = svc.get_entry(" btcusdt ").await.unwrap();
        assert_eq!(btc.symbol, "BTCUSDT");
        assert_eq!(btc.price(), Some(60_000.0));

        let missing = svc.get_entry("DOGEUSDT").await.unwrap_err();
        assert_eq!(missing, AggError::NotFound("DOGEUSDT".into()));
        assert_eq!(src.calls(), 1);
        assert_eq!(svc.status(), CacheStatus::Fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn get_entry_propagates_total_failure_on_empty_cache() {
        let svc = service(Arc::new(ScriptedSource::failing("a")));
        assert!(matches!(svc.get_entry("BTCUSDT").await, Err(AggError::AllSourcesFailed(_))));
    }

    #[tokio::test]
    async fn builds_from_config_with_manual_source() {
        let config = parse_config(
            r#"{
                "universe": { "quote_asset": "USDT" },
                "sources": [{
                    "name": "pinned",
                    "kind": "manual",
                    "records": { "btcusdt": { "price": 1.0, "logo_url": "btc.png" } }
                }]
            }"#,
        )
        .unwrap();
        let svc = AggregationService::from_config(&config).unwrap();

        let snap = svc.get_snapshot().await.unwrap();
        assert_eq!(snap.source_status.keys().collect::<Vec<_>>(), vec!["pinned"]);
        assert_eq!(svc.get_entry("BTCUSDT").await.unwrap().logo_url(), Some("btc.png"));
    }
}

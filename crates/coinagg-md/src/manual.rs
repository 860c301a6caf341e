//! Static records from configuration.
//!
//! Lets an operator pin fields the live feeds get wrong or do not carry (a
//! logo URL, a display name), or run the engine offline. Placed first in the
//! priority list it overrides live data; placed last it only fills gaps.

use async_trait::async_trait;
use coinagg_core::config::SourceConfig;
use coinagg_core::{AggError, SymbolUniverse, normalize_symbol};

use crate::{SourceBatch, UpstreamSource};

/// Source that always returns the same configured records.
pub struct ManualSource {
    name: String,
    records: SourceBatch,
}

impl ManualSource {
    pub fn new(name: String, records: SourceBatch) -> Self {
        let records = records
            .into_iter()
            .map(|(sym, rec)| (normalize_symbol(&sym), rec))
            .filter(|(_, rec)| !rec.is_empty())
            .collect();
        Self { name, records }
    }

    pub fn from_config(cfg: &SourceConfig) -> Self {
        Self::new(cfg.name.clone(), cfg.records.clone())
    }
}

#[async_trait]
impl UpstreamSource for ManualSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, universe: &SymbolUniverse) -> Result<SourceBatch, AggError> {
        Ok(self
            .records
            .iter()
            .filter(|(sym, _)| universe.contains(sym))
            .map(|(sym, rec)| (sym.clone(), rec.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use coinagg_core::PartialRecord;

    use super::*;

    #[tokio::test]
    async fn returns_configured_records_in_universe() {
        let mut records = SourceBatch::new();
        let logo = PartialRecord { logo_url: Some("btc.png".into()), ..Default::default() };
        records.insert("btcusdt".into(), logo);
        let name = PartialRecord { name: Some("Ethereum".into()), ..Default::default() };
        records.insert("ETHUSDC".into(), name);
        records.insert("SOLUSDT".into(), PartialRecord::default());

        let src = ManualSource::new("manual".into(), records);
        let batch = src.fetch(&SymbolUniverse::quoted_in("USDT")).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch["BTCUSDT"].logo_url.as_deref(), Some("btc.png"));
    }
}

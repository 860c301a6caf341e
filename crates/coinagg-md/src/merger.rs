//! Merges per-source batches into one [`Snapshot`].
//!
//! # Field precedence
//!
//! Precedence is configuration, never inferred from data: for every field of
//! every symbol, the first source in the priority list that supplies the
//! field wins, and later sources only fill fields that are still absent.
//! Sources missing from the list rank after all listed ones, ordered by name,
//! so the result never depends on the order in which fetches completed.
//!
//! ```text
//! priority = [bybit, coingecko]
//!
//! bybit      BTCUSDT { price: 60000, volume_24h: 20576 }
//! coingecko  BTCUSDT { price: 59990, market_cap: 1.2e12, logo_url: ... }
//! ───────────────────────────────────────────────────────────────────────
//! merged     BTCUSDT { price: 60000, volume_24h: 20576, market_cap: 1.2e12, logo_url: ... }
//! ```

use std::collections::BTreeMap;

use ahash::AHashMap;
use coinagg_core::{AggError, MarketDataEntry, PartialRecord, Snapshot, SourceStatus, Symbol};

use crate::SourceBatch;

/// Outcome of one source in one refresh cycle.
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub source: String,
    pub result: Result<SourceBatch, AggError>,
}

impl SourceOutcome {
    pub fn new(source: impl Into<String>, result: Result<SourceBatch, AggError>) -> Self {
        Self { source: source.into(), result }
    }
}

/// Priority-ordered merger.
#[derive(Debug, Clone, Default)]
pub struct Merger {
    priority: Vec<String>,
}

impl Merger {
    pub fn new(priority: Vec<String>) -> Self {
        Self { priority }
    }

    /// Sort key: position in the priority list, then name.
    fn rank<'a>(&self, source: &'a str) -> (usize, &'a str) {
        let pos = self.priority.iter().position(|p| p == source).unwrap_or(self.priority.len());
        (pos, source)
    }

    /// Merge one cycle's outcomes into a snapshot stamped `generated_at_ms`.
    ///
    /// Failed sources contribute no symbols and are recorded as
    /// [`SourceStatus::Failed`]. Symbols whose merged record has no field are
    /// dropped.
    pub fn merge(&self, mut outcomes: Vec<SourceOutcome>, generated_at_ms: u64) -> Snapshot {
        outcomes.sort_by(|a, b| self.rank(&a.source).cmp(&self.rank(&b.source)));

        let mut source_status = BTreeMap::new();
        let mut merged: AHashMap<Symbol, PartialRecord> = AHashMap::new();

        for outcome in &outcomes {
            match &outcome.result {
                Ok(batch) => {
                    for (sym, record) in batch {
                        merged.entry(sym.clone()).or_default().fill_missing(record);
                    }
                    source_status.insert(outcome.source.clone(), SourceStatus::Ok);
                }
                Err(e) => {
                    let status = SourceStatus::Failed { reason: e.to_string() };
                    source_status.insert(outcome.source.clone(), status);
                }
            }
        }

        let entries = merged
            .into_iter()
            .filter_map(|(sym, fields)| {
                MarketDataEntry::from_record(sym.clone(), fields).map(|e| (sym, e))
            })
            .collect();

        Snapshot { entries, generated_at_ms, source_status }
    }
}

/// Returns `true` if the status map is non-empty and every source failed.
pub fn all_failed(source_status: &BTreeMap<String, SourceStatus>) -> bool {
    !source_status.is_empty() && source_status.values().all(|s| !s.is_ok())
}

/// One-line summary of failed sources, e.g. `"a: timed out; b: HTTP 500"`.
pub fn failure_summary(source_status: &BTreeMap<String, SourceStatus>) -> String {
    source_status
        .iter()
        .filter_map(|(name, status)| match status {
            SourceStatus::Failed { reason } => Some(format!("{name}: {reason}")),
            SourceStatus::Ok => None,
        })
        .collect::<Vec<_>>()
        .join("; ")
}

//! Market data structures: the records flowing from sources through the
//! merger into snapshots.
//!
//! # Field presence
//!
//! Every field is optional. A provider that does not report a value leaves it
//! `None`, and that `None` survives all the way to the consumer: the merger
//! fills a field from a lower-priority source, but never invents one.
//!
//! # Timestamp convention
//!
//! All timestamps are in **milliseconds since Unix epoch** (ms).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::symbol::Symbol;

// ---------------------------------------------------------------------------
// PartialRecord
// ---------------------------------------------------------------------------

/// Category-scoped fields for one symbol from one source.
///
/// A ticker feed fills `price`/`volume_24h`, a market-cap feed fills
/// `market_cap`/`logo_url`, and so on; the schema is shared so the merger can
/// treat all sources uniformly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// 24h price change as a fraction (`0.0123` = +1.23%).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_change_24h_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_24h: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap_rank: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

impl PartialRecord {
    /// Returns `true` if no field is populated.
    pub fn is_empty(&self) -> bool {
        self.price.is_none()
            && self.price_change_24h_pct.is_none()
            && self.volume_24h.is_none()
            && self.market_cap.is_none()
            && self.market_cap_rank.is_none()
            && self.name.is_none()
            && self.logo_url.is_none()
    }

    /// Fill every field that is still `None` from `other`.
    ///
    /// Populated fields are never overwritten.
    pub fn fill_missing(&mut self, other: &PartialRecord) {
        fill(&mut self.price, &other.price);
        fill(&mut self.price_change_24h_pct, &other.price_change_24h_pct);
        fill(&mut self.volume_24h, &other.volume_24h);
        fill(&mut self.market_cap, &other.market_cap);
        fill(&mut self.market_cap_rank, &other.market_cap_rank);
        fill(&mut self.name, &other.name);
        fill(&mut self.logo_url, &other.logo_url);
    }
}

#[inline]
fn fill<T: Clone>(slot: &mut Option<T>, from: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(from);
    }
}

// ---------------------------------------------------------------------------
// MarketDataEntry
// ---------------------------------------------------------------------------

/// Merged view of one symbol across all sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDataEntry {
    pub symbol: Symbol,
    #[serde(flatten)]
    pub fields: PartialRecord,
}

impl MarketDataEntry {
    /// Build an entry from a merged record.
    ///
    /// Returns `None` when the record has no populated field: such a symbol
    /// is dropped from the snapshot rather than emitted as a placeholder.
    pub fn from_record(symbol: Symbol, fields: PartialRecord) -> Option<Self> {
        (!fields.is_empty()).then_some(Self { symbol, fields })
    }

    pub fn price(&self) -> Option<f64> {
        self.fields.price
    }

    pub fn market_cap(&self) -> Option<f64> {
        self.fields.market_cap
    }

    pub fn volume_24h(&self) -> Option<f64> {
        self.fields.volume_24h
    }

    pub fn logo_url(&self) -> Option<&str> {
        self.fields.logo_url.as_deref()
    }
}

// ---------------------------------------------------------------------------
// SourceStatus
// ---------------------------------------------------------------------------

/// Outcome of one source in one refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SourceStatus {
    Ok,
    Failed { reason: String },
}

impl SourceStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Immutable merged view of all symbols at one point in time.
///
/// A refresh always builds a new `Snapshot`; readers hold it behind an `Arc`
/// and never need a lock to read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub entries: BTreeMap<Symbol, MarketDataEntry>,
    pub generated_at_ms: u64,
    pub source_status: BTreeMap<String, SourceStatus>,
}

impl Snapshot {
    /// Look up one symbol.
    pub fn get(&self, symbol: &str) -> Option<&MarketDataEntry> {
        self.entries.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if at least one source failed in the cycle that
    /// produced this snapshot's status map.
    pub fn is_degraded(&self) -> bool {
        self.source_status.values().any(|s| !s.is_ok())
    }

    /// Names of the sources that failed, in name order.
    pub fn failed_sources(&self) -> Vec<&str> {
        self.source_status
            .iter()
            .filter(|(_, s)| !s.is_ok())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Age in milliseconds relative to `now_ms`.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.generated_at_ms)
    }

    /// Copy of this snapshot carrying a different status map.
    ///
    /// Used when a refresh fails entirely: readers keep the previous entries
    /// and generation time, but can see that the latest attempt failed.
    pub fn with_source_status(&self, source_status: BTreeMap<String, SourceStatus>) -> Self {
        Self { entries: self.entries.clone(), generated_at_ms: self.generated_at_ms, source_status }
    }
}

// ---------------------------------------------------------------------------
// Candle
// ---------------------------------------------------------------------------

/// One OHLCV candlestick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Candle open time.
    pub start_ms: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Traded quantity in the base asset.
    pub volume: f64,
    /// Traded value in the quote asset.
    pub turnover: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec_price(p: f64) -> PartialRecord {
        PartialRecord { price: Some(p), ..Default::default() }
    }

    #[test]
    fn fill_missing_never_overwrites() {
        let mut a = rec_price(60_000.0);
        let b = PartialRecord { price: Some(1.0), market_cap: Some(1.2e12), ..Default::default() };
        a.fill_missing(&b);
        assert_eq!(a.price, Some(60_000.0));
        assert_eq!(a.market_cap, Some(1.2e12));
    }

    #[test]
    fn empty_record_produces_no_entry() {
        assert!(PartialRecord::default().is_empty());
        assert!(MarketDataEntry::from_record("BTCUSDT".into(), PartialRecord::default()).is_none());
        let e = MarketDataEntry::from_record("BTCUSDT".into(), rec_price(1.0)).unwrap();
        assert_eq!(e.price(), Some(1.0));
        assert_eq!(e.market_cap(), None);
    }

    #[test]
    fn entry_serializes_flat_without_absent_fields() {
        let e = MarketDataEntry::from_record("BTCUSDT".into(), rec_price(60_000.0)).unwrap();
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v, serde_json::json!({"symbol": "BTCUSDT", "price": 60000.0}));
    }

    #[test]
    fn source_status_wire_format() {
        let ok = serde_json::to_value(SourceStatus::Ok).unwrap();
        assert_eq!(ok, serde_json::json!({"status": "ok"}));
        let failed =
            serde_json::to_value(SourceStatus::Failed { reason: "timeout".into() }).unwrap();
        assert_eq!(failed, serde_json::json!({"status": "failed", "reason": "timeout"}));
    }

    #[test]
    fn degraded_snapshot_reports_failed_sources() {
        let mut status = BTreeMap::new();
        status.insert("a".to_string(), SourceStatus::Ok);
        status.insert("b".to_string(), SourceStatus::Failed { reason: "x".into() });
        let snap =
            Snapshot { entries: BTreeMap::new(), generated_at_ms: 1_000, source_status: status };
        assert!(snap.is_degraded());
        assert_eq!(snap.failed_sources(), vec!["b"]);
        assert_eq!(snap.age_ms(1_500), 500);

        let restated = snap.with_source_status(BTreeMap::new());
        assert_eq!(restated.generated_at_ms, 1_000);
        assert!(!restated.is_degraded());
    }
}

//! CoinGecko `/api/v3/coins/markets` parser.
//!
//! The endpoint returns a bare JSON array of coins sorted by market cap:
//!
//! ```json
//! [{ "id": "bitcoin", "symbol": "btc", "name": "Bitcoin",
//!    "image": "https://.../bitcoin.png", "market_cap": 1200000000000,
//!    "market_cap_rank": 1, ... }]
//! ```
//!
//! Coins are keyed by base ticker, so each is mapped onto its pair symbol in
//! the universe (`btc` → `BTCUSDT`). Several coins can share a ticker; the
//! first one seen (the larger market cap) wins.

use ahash::AHashSet;
use anyhow::{Result, anyhow};
use coinagg_core::{PartialRecord, SymbolUniverse};

use crate::SourceBatch;
use crate::json_util::{parse_f64_field, parse_str_u32, str_field};

/// Outcome of parsing one page.
#[derive(Debug, Default)]
pub struct PageStats {
    /// Items in the page array.
    pub items: usize,
    /// Items that yielded a non-empty record (in or out of the universe).
    pub parsed: usize,
}

/// Parse one page into `batch`, skipping symbols already present.
///
/// `seen` tracks every base ticker encountered so far across pages, including
/// those outside the universe, so a later duplicate never displaces an earlier
/// coin.
pub fn parse_markets_page(
    v: &serde_json::Value,
    universe: &SymbolUniverse,
    seen: &mut AHashSet<String>,
    batch: &mut SourceBatch,
) -> Result<PageStats> {
    let list = v.as_array().ok_or_else(|| match v.get("error").or_else(|| v.get("status")) {
        Some(err) => anyhow!("API error: {err}"),
        None => anyhow!("expected a JSON array of coins"),
    })?;

    let mut stats = PageStats { items: list.len(), parsed: 0 };
    for item in list {
        let Some(ticker) = str_field(item, "symbol") else {
            continue;
        };
        let record = parse_coin(item);
        if record.is_empty() {
            continue;
        }
        stats.parsed += 1;

        if !seen.insert(ticker.to_ascii_uppercase()) {
            continue;
        }
        if let Some(pair) = universe.pair_for_base(ticker) {
            batch.insert(pair, record);
        }
    }
    Ok(stats)
}

/// Parse a single coin item.
fn parse_coin(item: &serde_json::Value) -> PartialRecord {
    PartialRecord {
        market_cap: parse_f64_field(item, "market_cap"),
        market_cap_rank: parse_str_u32(item.get("market_cap_rank")),
        name: str_field(item, "name").map(str::to_string),
        logo_url: str_field(item, "image").map(str::to_string),
        ..Default::default()
    }
}

//! Bybit v5 REST response parser.
//!
//! Every v5 response shares one envelope:
//!
//! ```json
//! { "retCode": 0, "retMsg": "OK", "result": { "category": "spot", "list": [ ... ] } }
//! ```
//!
//! A non-zero `retCode` is an API-level error even when the HTTP status is 200.

use anyhow::{Result, anyhow};
use coinagg_core::{Candle, PartialRecord, SymbolUniverse, normalize_symbol};

use crate::SourceBatch;
use crate::json_util::{parse_f64_field, parse_str_f64, parse_str_u64, str_field};

/// Validate the envelope and return `result.list`.
pub fn result_list(v: &serde_json::Value) -> Result<&Vec<serde_json::Value>> {
    let ret_code = v
        .get("retCode")
        .and_then(|c| c.as_i64())
        .ok_or_else(|| anyhow!("missing retCode"))?;
    if ret_code != 0 {
        let msg = v.get("retMsg").and_then(|m| m.as_str()).unwrap_or("unknown API error");
        return Err(anyhow!("retCode {ret_code}: {msg}"));
    }
    v.get("result")
        .and_then(|r| r.get("list"))
        .and_then(|l| l.as_array())
        .ok_or_else(|| anyhow!("missing result.list"))
}

// ---------------------------------------------------------------------------
// Tickers
// ---------------------------------------------------------------------------

/// Parse a `/v5/market/tickers` response into a batch restricted to `universe`.
///
/// Items that are malformed or carry no usable field are skipped. The call
/// fails only when the envelope is invalid or nothing at all could be
/// extracted from a non-empty list.
pub fn parse_tickers(v: &serde_json::Value, universe: &SymbolUniverse) -> Result<SourceBatch> {
    let list = result_list(v)?;
    let mut batch = SourceBatch::new();
    let mut parsed = 0usize;

    for item in list {
        let Some(sym) = str_field(item, "symbol") else {
            continue;
        };
        let record = parse_ticker(item);
        if record.is_empty() {
            continue;
        }
        parsed += 1;

        let sym = normalize_symbol(sym);
        if universe.contains(&sym) {
            batch.insert(sym, record);
        }
    }

    if parsed == 0 {
        return Err(anyhow!("no ticker could be parsed from {} item(s)", list.len()));
    }
    Ok(batch)
}

/// Parse a single ticker item.
fn parse_ticker(item: &serde_json::Value) -> PartialRecord {
    PartialRecord {
        price: parse_f64_field(item, "lastPrice"),
        price_change_24h_pct: parse_f64_field(item, "price24hPcnt"),
        volume_24h: parse_f64_field(item, "volume24h"),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Klines
// ---------------------------------------------------------------------------

/// Parse a `/v5/market/kline` response.
///
/// Each row is `[startTime, open, high, low, close, volume, turnover]`, all
/// strings, newest first. Malformed rows are skipped; row order is preserved.
pub fn parse_klines(v: &serde_json::Value) -> Result<Vec<Candle>> {
    let list = result_list(v)?;
    Ok(list.iter().filter_map(parse_kline_row).collect())
}

fn parse_kline_row(row: &serde_json::Value) -> Option<Candle> {
    let a = row.as_array()?;
    Some(Candle {
        start_ms: parse_str_u64(a.first())?,
        open: parse_str_f64(a.get(1))?,
        high: parse_str_f64(a.get(2))?,
        low: parse_str_f64(a.get(3))?,
        close: parse_str_f64(a.get(4))?,
        volume: parse_str_f64(a.get(5))?,
        turnover: parse_str_f64(a.get(6))?,
    })
}

//! Shared JSON parsing helpers used by all source modules.
//!
//! Providers encode numbers inconsistently: Bybit sends every numeric field as
//! a JSON string (`"60000.5"`), CoinGecko sends native numbers and `null`.
//! These helpers accept both and map anything unparseable to `None`, so a
//! single odd field never fails a whole record.

/// Parse a JSON value (string or number) as `f64`.
///
/// Empty strings, `null`, and non-finite results yield `None`.
#[inline]
pub fn parse_str_f64(v: Option<&serde_json::Value>) -> Option<f64> {
    let v = v?;
    let n = if let Some(s) = v.as_str() {
        if s.is_empty() {
            return None;
        }
        fast_float2::parse::<f64, _>(s).ok()?
    } else {
        v.as_f64()?
    };
    n.is_finite().then_some(n)
}

/// Parse a JSON value (string or number) as `u64`.
#[inline]
pub fn parse_str_u64(v: Option<&serde_json::Value>) -> Option<u64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        s.parse().ok()
    } else {
        v.as_u64()
    }
}

/// Parse a JSON value (string or number) as `u32`.
#[inline]
pub fn parse_str_u32(v: Option<&serde_json::Value>) -> Option<u32> {
    parse_str_u64(v).and_then(|n| u32::try_from(n).ok())
}

/// Parse a named field on a JSON object as `f64` (string or number).
#[inline]
pub fn parse_f64_field(v: &serde_json::Value, key: &str) -> Option<f64> {
    parse_str_f64(v.get(key))
}

/// Read a named field as a non-empty string.
#[inline]
pub fn str_field<'a>(v: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    v.get(key)?.as_str().filter(|s| !s.is_empty())
}

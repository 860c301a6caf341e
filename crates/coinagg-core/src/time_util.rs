//! Wall-clock time utilities.
//!
//! Snapshot timestamps are **milliseconds since Unix epoch**, the unit every
//! upstream provider uses. Freshness decisions never use these values; the
//! cache measures age with a monotonic clock instead.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as **milliseconds** since Unix epoch.
///
/// Returns 0 if the system clock is set before the epoch.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or_default()
}

//! # coinagg-md
//!
//! Market data aggregation engine.
//!
//! ## Architecture
//!
//! ```text
//! reader ──► AggregationService::get_snapshot()
//!              └─► SnapshotCache      fresh? return the current Arc<Snapshot>
//!                    └─► (stale) single in-flight refresh task
//!                          └─► RefreshCoordinator::run_cycle()
//!                                ├─► UpstreamSource::fetch() × N  (concurrent, timed out)
//!                                └─► Merger::merge()             (priority field fill)
//! ```
//!
//! ## Modules
//!
//! - [`bybit`] / [`coingecko`] / [`manual`]: upstream source implementations
//! - [`registry`]: creates sources from config
//! - [`merger`]: combines per-source records into a snapshot
//! - [`coordinator`]: one refresh cycle: fan-out, retry, merge
//! - [`cache`]: snapshot cache with single-flight refresh
//! - [`service`]: the façade consumed by transport layers
//! - [`json_util`]: JSON parsing helpers

pub mod bybit;
pub mod cache;
pub mod coingecko;
pub mod coordinator;
pub mod json_util;
pub mod manual;
pub mod merger;
pub mod registry;
pub mod service;

#[cfg(test)]
pub(crate) mod test_util;

use std::collections::BTreeMap;

use async_trait::async_trait;
use coinagg_core::{AggError, PartialRecord, Symbol, SymbolUniverse};

pub use cache::{CacheStatus, RefreshPolicy, SnapshotCache};
pub use coordinator::RefreshCoordinator;
pub use merger::Merger;
pub use service::AggregationService;

/// Records returned by one source call, keyed by normalized symbol.
pub type SourceBatch = BTreeMap<Symbol, PartialRecord>;

/// Trait implemented by all upstream market data sources.
///
/// One call to [`fetch`](UpstreamSource::fetch) issues one logical request
/// (it may paginate internally) for the whole universe and returns what it
/// could extract. Implementations:
///
/// - return a best-effort partial batch if only part of the payload parsed;
/// - return [`AggError::Source`] if nothing at all could be extracted;
/// - never retry; retries are driven by the
///   [`RefreshCoordinator`](crate::coordinator::RefreshCoordinator).
///
/// Deadlines are enforced by the caller: the future is dropped when the
/// per-source timeout fires, so implementations must be cancel-safe (plain
/// HTTP requests are).
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Unique source name, as used in the priority list and status map.
    fn name(&self) -> &str;

    /// Fetch this source's category of fields for every symbol in `universe`.
    async fn fetch(&self, universe: &SymbolUniverse) -> Result<SourceBatch, AggError>;
}

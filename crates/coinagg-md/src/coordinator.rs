//! One refresh cycle: concurrent fan-out to every source, retry, merge.
//!
//! ```text
//! run_cycle(n)
//! ├── fetch_one(source_1) ─┐
//! ├── fetch_one(source_2) ─┼── join_all ──► Merger::merge ──► Snapshot
//! └── fetch_one(source_k) ─┘
//!
//! fetch_one: attempt ─timeout/error─► sleep(backoff) ─► attempt ... (≤ attempts)
//! ```
//!
//! Each attempt is bounded by the per-source timeout, so a cycle settles
//! after at most `attempts × timeout + backoffs` regardless of how slow a
//! provider is. Sources are never retried by their own implementation. A
//! source that panics is recorded as failed like any other error, so it
//! cannot take its siblings' results down with it.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use coinagg_core::{AggError, Snapshot, SymbolUniverse, time_util};
use futures_util::FutureExt;
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::UpstreamSource;
use crate::cache::RefreshPolicy;
use crate::merger::{Merger, SourceOutcome};

/// Runs refresh cycles over a fixed set of sources.
pub struct RefreshCoordinator {
    sources: Vec<Arc<dyn UpstreamSource>>,
    merger: Merger,
    universe: SymbolUniverse,
    source_timeout: Duration,
    attempts: u32,
    retry_backoff: Duration,
}

impl RefreshCoordinator {
    pub fn new(
        sources: Vec<Arc<dyn UpstreamSource>>,
        merger: Merger,
        universe: SymbolUniverse,
        policy: &RefreshPolicy,
    ) -> Self {
        Self {
            sources,
            merger,
            universe,
            source_timeout: policy.source_timeout,
            attempts: policy.source_attempts.max(1),
            retry_backoff: policy.retry_backoff,
        }
    }

    /// Names of the configured sources, in config order.
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Run one cycle and return the merged snapshot.
    ///
    /// Never fails: per-source failures are recorded in the snapshot's status
    /// map. Whether the cycle as a whole counts as failed is the cache's call.
    pub async fn run_cycle(&self, cycle: u64) -> Snapshot {
        info!("[refresh #{cycle}] fetching {} source(s)", self.sources.len());
        let outcomes = self.fetch_all().await;
        let snapshot = self.merger.merge(outcomes, time_util::now_ms());
        info!(
            "[refresh #{cycle}] merged {} symbol(s), failed sources: {:?}",
            snapshot.len(),
            snapshot.failed_sources()
        );
        snapshot
    }

    /// Fetch every source concurrently; settles when the slowest has settled.
    pub async fn fetch_all(&self) -> Vec<SourceOutcome> {
        join_all(self.sources.iter().map(|s| self.fetch_one(s.as_ref()))).await
    }

    async fn fetch_one(&self, source: &dyn UpstreamSource) -> SourceOutcome {
        let name = source.name();
        let mut backoff = self.retry_backoff;
        let mut attempt = 1;

        loop {
            let fetch = AssertUnwindSafe(source.fetch(&self.universe)).catch_unwind();
            let result = match tokio::time::timeout(self.source_timeout, fetch).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(AggError::source_failed(name, "panicked")),
                Err(_) => Err(AggError::SourceTimeout {
                    source_name: name.to_string(),
                    after_ms: self.source_timeout.as_millis() as u64,
                }),
            };

            match result {
                Ok(batch) => {
                    debug!("[{name}] attempt {attempt}: {} record(s)", batch.len());
                    return SourceOutcome::new(name, Ok(batch));
                }
                Err(e) if e.is_source_failure() && attempt < self.attempts => {
                    warn!(
                        "[{name}] attempt {attempt}/{} failed: {e}, retrying in {backoff:?}",
                        self.attempts
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.source_timeout);
                    attempt += 1;
                }
                Err(e) => {
                    warn!("[{name}] failed after {attempt} attempt(s): {e}");
                    return SourceOutcome::new(name, Err(e));
                }
            }
        }
    }
}

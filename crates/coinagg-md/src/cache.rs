//! TTL snapshot cache with single-flight refresh.
//!
//! ```text
//!            get_snapshot()
//!                 │
//!     ┌───────────┴────────────┐
//!   fresh?                 stale / empty
//!     │                        │
//!  return Arc          refresh in flight? ──yes──► attach to its watch channel
//!                              │ no
//!                     spawn cycle n+1, register it, attach
//!                              │
//!                     complete(n+1): install / keep stale / fail
//! ```
//!
//! All bookkeeping lives in one [`CacheState`] behind a `std::sync::Mutex`.
//! The lock is only taken for short, synchronous sections and never across
//! an `.await`. The refresh itself runs in a task owned by the cache, so a
//! reader that stops waiting does not cancel it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use coinagg_core::config::CacheConfig;
use coinagg_core::{AggError, Snapshot};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::coordinator::RefreshCoordinator;
use crate::merger::{all_failed, failure_summary};

/// Timing knobs for refresh cycles.
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    /// Maximum age of a snapshot before a read triggers a refresh.
    pub ttl: Duration,
    /// Deadline for one attempt against one source.
    pub source_timeout: Duration,
    pub source_attempts: u32,
    pub retry_backoff: Duration,
    /// After a totally failed cycle, serve the stale snapshot for this long
    /// before trying again.
    pub failure_cooldown: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            source_timeout: Duration::from_secs(10),
            source_attempts: 1,
            retry_backoff: Duration::from_millis(200),
            failure_cooldown: Duration::from_secs(10),
        }
    }
}

impl RefreshPolicy {
    pub fn from_config(cfg: &CacheConfig) -> Self {
        Self {
            ttl: cfg.ttl(),
            source_timeout: cfg.source_timeout(),
            source_attempts: cfg.source_attempts,
            retry_backoff: cfg.retry_backoff(),
            failure_cooldown: cfg.failure_cooldown(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Empty,
    Fresh,
    Stale,
    Refreshing,
}

type RefreshOutcome = Result<Arc<Snapshot>, AggError>;

struct InFlight {
    cycle: u64,
    rx: watch::Receiver<Option<RefreshOutcome>>,
}

#[derive(Default)]
struct CacheState {
    current: Option<Arc<Snapshot>>,
    /// When `current` was last installed from a successful cycle.
    refreshed_at: Option<Instant>,
    installed_cycle: u64,
    last_cycle: u64,
    in_flight: Option<InFlight>,
    last_failure_at: Option<Instant>,
}

struct CacheInner {
    coordinator: RefreshCoordinator,
    ttl: Duration,
    failure_cooldown: Duration,
    state: Mutex<CacheState>,
}

/// Shared handle to the cache. Cloning is cheap; all clones see one state.
#[derive(Clone)]
pub struct SnapshotCache {
    inner: Arc<CacheInner>,
}

impl SnapshotCache {
    pub fn new(coordinator: RefreshCoordinator, policy: &RefreshPolicy) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                coordinator,
                ttl: policy.ttl,
                failure_cooldown: policy.failure_cooldown,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Return the current snapshot, refreshing first if it is stale or absent.
    ///
    /// May await network I/O: a stale read waits for the refresh cycle, which
    /// is bounded by the per-source timeouts. Callers that need a tighter
    /// bound wrap this call in their own timeout; dropping the future only
    /// detaches this reader.
    ///
    /// Fails only when no snapshot has ever been installed and the cycle
    /// could not produce one (`AllSourcesFailed`), or the refresh task died
    /// before any snapshot existed (`RefreshAborted`).
    pub async fn get_snapshot(&self) -> Result<Arc<Snapshot>, AggError> {
        let mut rx = {
            let mut state = self.inner.lock();
            if let Some(snapshot) = self.inner.serveable(&state) {
                return Ok(snapshot);
            }
            let joined = state.in_flight.as_ref().map(|flight| {
                debug!("[cache] joining refresh #{}", flight.cycle);
                flight.rx.clone()
            });
            match joined {
                Some(rx) => rx,
                None => self.start_refresh(&mut state),
            }
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(done) => done.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(Err(AggError::RefreshAborted))
    }

    /// Current snapshot, if any, without triggering a refresh.
    pub fn peek(&self) -> Option<Arc<Snapshot>> {
        self.inner.lock().current.clone()
    }

    pub fn state(&self) -> CacheStatus {
        let state = self.inner.lock();
        if state.in_flight.is_some() {
            CacheStatus::Refreshing
        } else if state.current.is_none() {
            CacheStatus::Empty
        } else if self.inner.is_fresh(&state) {
            CacheStatus::Fresh
        } else {
            CacheStatus::Stale
        }
    }

    fn start_refresh(&self, state: &mut CacheState) -> watch::Receiver<Option<RefreshOutcome>> {
        let cycle = state.last_cycle.max(state.installed_cycle) + 1;
        state.last_cycle = cycle;

        let (tx, rx) = watch::channel(None);
        state.in_flight = Some(InFlight { cycle, rx: rx.clone() });

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let worker = Arc::clone(&inner);
            let cycle_task = tokio::spawn(async move { worker.coordinator.run_cycle(cycle).await });
            let outcome = match cycle_task.await {
                Ok(snapshot) => inner.complete(cycle, snapshot),
                Err(e) => {
                    error!("[cache] refresh #{cycle} aborted: {e}");
                    inner.abort(cycle)
                }
            };
            tx.send_replace(Some(outcome));
        });

        rx
    }
}

impl CacheInner {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_fresh(&self, state: &CacheState) -> bool {
        state.refreshed_at.is_some_and(|at| at.elapsed() < self.ttl)
    }

    fn in_failure_cooldown(&self, state: &CacheState) -> bool {
        state.last_failure_at.is_some_and(|at| at.elapsed() < self.failure_cooldown)
    }

    /// Snapshot a reader may take without waiting, if any.
    fn serveable(&self, state: &CacheState) -> Option<Arc<Snapshot>> {
        let current = state.current.as_ref()?;
        if self.is_fresh(state) || (state.in_flight.is_none() && self.in_failure_cooldown(state)) {
            return Some(Arc::clone(current));
        }
        None
    }

    /// Apply the result of cycle `cycle` and clear its in-flight slot.
    fn complete(&self, cycle: u64, snapshot: Snapshot) -> RefreshOutcome {
        let mut state = self.lock();
        if state.in_flight.as_ref().is_some_and(|f| f.cycle == cycle) {
            state.in_flight = None;
        }

        if cycle <= state.installed_cycle {
            debug!(
                "[cache] discarding result of refresh #{cycle}, #{} already installed",
                state.installed_cycle
            );
            return state.current.clone().ok_or(AggError::RefreshAborted);
        }

        if all_failed(&snapshot.source_status) {
            state.last_failure_at = Some(Instant::now());
            let summary = failure_summary(&snapshot.source_status);
            let Some(prev) = state.current.clone() else {
                warn!(
                    "[cache] refresh #{cycle} failed with no snapshot to fall back on: {summary}"
                );
                return Err(AggError::AllSourcesFailed(summary));
            };
            warn!(
                "[cache] refresh #{cycle} failed, serving snapshot from {}ms: {summary}",
                prev.generated_at_ms
            );
            let degraded = Arc::new(prev.with_source_status(snapshot.source_status));
            state.current = Some(Arc::clone(&degraded));
            state.installed_cycle = cycle;
            return Ok(degraded);
        }

        let generated_at_ms = match &state.current {
            Some(prev) => snapshot.generated_at_ms.max(prev.generated_at_ms),
            None => snapshot.generated_at_ms,
        };
        let snapshot = Arc::new(Snapshot { generated_at_ms, ..snapshot });
        info!("[cache] installed refresh #{cycle}: {} symbol(s)", snapshot.len());

        state.current = Some(Arc::clone(&snapshot));
        state.refreshed_at = Some(Instant::now());
        state.installed_cycle = cycle;
        state.last_failure_at = None;
        Ok(snapshot)
    }

    /// Clear the slot of a cycle that died; waiters fall back to the current
    /// snapshot when there is one.
    fn abort(&self, cycle: u64) -> RefreshOutcome {
        let mut state = self.lock();
        if state.in_flight.as_ref().is_some_and(|f| f.cycle == cycle) {
            state.in_flight = None;
        }
        state.current.clone().ok_or(AggError::RefreshAborted)
    }
}

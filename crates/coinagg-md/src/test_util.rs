//! Test helpers: record builders and a scripted in-memory source.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use coinagg_core::{AggError, PartialRecord, SymbolUniverse};

use crate::{SourceBatch, UpstreamSource};

pub fn record(
    price: Option<f64>,
    market_cap: Option<f64>,
    volume_24h: Option<f64>,
) -> PartialRecord {
    PartialRecord { price, market_cap, volume_24h, ..Default::default() }
}

pub fn price(p: f64) -> PartialRecord {
    record(Some(p), None, None)
}

pub fn market_cap(c: f64) -> PartialRecord {
    record(None, Some(c), None)
}

pub fn batch<const N: usize>(items: [(&str, PartialRecord); N]) -> SourceBatch {
    items.into_iter().map(|(s, r)| (s.to_string(), r)).collect()
}

/// Source that replays scripted responses, then repeats a default one.
///
/// Every call is counted and delayed by `delay` (virtual time under
/// `start_paused`).
pub struct ScriptedSource {
    name: String,
    delay: Duration,
    calls: AtomicUsize,
    script: Mutex<VecDeque<Result<SourceBatch, AggError>>>,
    default: Mutex<Result<SourceBatch, AggError>>,
}

impl ScriptedSource {
    pub fn ok(name: &str, batch: SourceBatch) -> Self {
        Self {
            name: name.into(),
            delay: Duration::from_millis(10),
            calls: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(Ok(batch)),
        }
    }

    pub fn failing(name: &str) -> Self {
        let src = Self::ok(name, SourceBatch::new());
        src.fail_from_now();
        src
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue one response ahead of the default.
    pub fn then(self, result: Result<SourceBatch, AggError>) -> Self {
        self.script.lock().unwrap().push_back(result);
        self
    }

    pub fn set_default(&self, result: Result<SourceBatch, AggError>) {
        *self.default.lock().unwrap() = result;
    }

    pub fn fail_from_now(&self) {
        self.set_default(Err(AggError::source_failed(&self.name, "scripted failure")));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _universe: &SymbolUniverse) -> Result<SourceBatch, AggError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => self.default.lock().unwrap().clone(),
        }
    }
}

/// Source that answers `ok_calls` times with `batch`, then panics.
pub struct PanickingSource {
    name: String,
    ok_calls: usize,
    batch: SourceBatch,
    calls: AtomicUsize,
}

impl PanickingSource {
    pub fn new(name: &str, ok_calls: usize, batch: SourceBatch) -> Self {
        Self { name: name.into(), ok_calls, batch, calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl UpstreamSource for PanickingSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, _universe: &SymbolUniverse) -> Result<SourceBatch, AggError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.ok_calls {
            panic!("{} is broken", self.name);
        }
        Ok(self.batch.clone())
    }
}

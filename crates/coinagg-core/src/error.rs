//! Typed error definitions for the aggregation engine.
//!
//! [`AggError`] covers every failure the engine can report. Individual source
//! failures (`SourceTimeout`, `Source`) are absorbed by the refresh cycle and
//! recorded in the snapshot's source status; only `AllSourcesFailed` (with no
//! snapshot to fall back on) and the request-level variants ever reach a
//! caller.
//!
//! The enum is `Clone` because one refresh outcome is handed to every reader
//! that joined the in-flight refresh.

use thiserror::Error;

/// Domain-specific errors for the aggregation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggError {
    /// One upstream call exceeded its deadline.
    #[error("source '{source_name}' timed out after {after_ms}ms")]
    SourceTimeout { source_name: String, after_ms: u64 },

    /// One upstream call failed: transport error, bad status, or a payload
    /// from which no data could be extracted.
    #[error("source '{source_name}' failed: {reason}")]
    Source { source_name: String, reason: String },

    /// Every source failed in a refresh cycle and no snapshot exists yet.
    #[error("all sources failed: {0}")]
    AllSourcesFailed(String),

    /// The requested symbol (or kline series) is not available.
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller-supplied parameters were rejected before any upstream call.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// The refresh task ended without publishing a result (panicked or
    /// was aborted).
    #[error("refresh aborted before producing a result")]
    RefreshAborted,
}

impl AggError {
    /// Shorthand for [`AggError::Source`].
    pub fn source_failed(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Source { source_name: source_name.into(), reason: reason.into() }
    }

    /// Returns `true` for the per-source variants that a refresh cycle absorbs.
    pub fn is_source_failure(&self) -> bool {
        matches!(self, Self::SourceTimeout { .. } | Self::Source { .. })
    }
}

//! # coinagg-core
//!
//! Core crate for the coinagg market data aggregator, providing:
//!
//! - **Types** (`types`): per-symbol records, merged entries, snapshots, candles, symbol utils
//! - **Configuration** (`config`): JSON config deserialization and validation
//! - **Error types** (`error`): domain-specific `AggError` via thiserror
//! - **Time utilities** (`time_util`): wall-clock timestamps
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use error::AggError;
pub use types::*;

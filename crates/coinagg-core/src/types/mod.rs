//! Core data types: symbols and the symbol universe, per-source partial
//! records, merged entries, snapshots, and candles.

pub mod market_data;
pub mod symbol;

pub use market_data::*;
pub use symbol::*;

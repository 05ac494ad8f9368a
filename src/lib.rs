//! DEX Trader: client-side order lifecycle for 0x v1 peer-to-peer exchange.
//!
//! This is the root crate that ties the workspace together for integration
//! tests and benchmarks. For actual functionality, use the individual crates:
//!
//! - `zeroex-core`: amounts, orders, hashing, signing, contract encoding,
//!   ledgers and configuration
//! - `settlement-engine`: allowances, fill validation, fill execution,
//!   confirmation waiting and the `TradeEngine` facade
//! - `trade-runner`: command line round trip against a JSON-RPC node

pub use settlement_engine as settlement;
pub use zeroex_core as core;

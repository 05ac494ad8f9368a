//! 0x v1 protocol core.
//!
//! Order records, canonical hashing, signing, contract calldata and ledger
//! access shared by the settlement engine and the trade runner.

pub mod amount;
pub mod config;
pub mod contracts;
pub mod error;
pub mod hashing;
pub mod ledger;
pub mod order;
pub mod registry;
pub mod signing;

pub use error::{Error, Result};

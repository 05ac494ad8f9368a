//! Settlement Engine
//!
//! Allowance management, fill validation, fill execution and confirmation
//! for signed 0x v1 orders.

pub mod allowance;
pub mod engine;
pub mod executor;
pub mod validator;
pub mod waiter;
pub mod wrapper;

#[cfg(test)]
pub(crate) mod testing;

pub use allowance::{AllowanceManager, AllowanceOutcome, AllowanceReport};
pub use engine::TradeEngine;
pub use executor::{CancelResult, ExecutionMetrics, FillExecutor, FillResult};
pub use validator::{FillValidator, OrderState, PrecheckPolicy};
pub use waiter::TransactionWaiter;
pub use wrapper::WrappedAssetConverter;

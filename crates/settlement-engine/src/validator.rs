//! Pre-fill checks.
//!
//! These mirror the exchange's own rules so a doomed fill can be caught before
//! it costs gas. They are advisory: state can change between the check and
//! the fill, and the exchange has the final word.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroex_core::contracts::ContractCall;
use zeroex_core::error::NotFillableReason;
use zeroex_core::ledger::{read_uint, Ledger};
use zeroex_core::order::SignedOrder;
use zeroex_core::{Error, Result};

use crate::allowance::AllowanceManager;

pub use zeroex_core::config::PrecheckPolicy;

/// Fill state of an order as recorded by the exchange, in taker-token base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderState {
    pub filled: U256,
    pub cancelled: U256,
    pub remaining: U256,
}

impl OrderState {
    pub fn new(taker_token_amount: U256, filled: U256, cancelled: U256) -> Self {
        Self {
            filled,
            cancelled,
            remaining: taker_token_amount.saturating_sub(filled.saturating_add(cancelled)),
        }
    }
}

/// Token amounts a fill of a given size would move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillAmounts {
    pub taker_token_amount: U256,
    pub maker_token_amount: U256,
}

/// Checks that a signed order can still be filled.
#[derive(Clone)]
pub struct FillValidator {
    ledger: Arc<dyn Ledger>,
    allowances: AllowanceManager,
    exchange: Address,
}

impl FillValidator {
    pub fn new(ledger: Arc<dyn Ledger>, allowances: AllowanceManager, exchange: Address) -> Self {
        Self {
            ledger,
            allowances,
            exchange,
        }
    }

    /// Read filled and cancelled amounts from the exchange.
    pub async fn order_state(&self, signed: &SignedOrder) -> Result<OrderState> {
        let order_hash = signed.order_hash();
        let ledger = self.ledger.as_ref();
        let filled_call = ContractCall::Filled { order_hash };
        let cancelled_call = ContractCall::Cancelled { order_hash };
        let (filled, cancelled) = tokio::try_join!(
            read_uint(ledger, self.exchange, &filled_call),
            read_uint(ledger, self.exchange, &cancelled_call),
        )?;
        Ok(OrderState::new(
            signed.order().taker_token_amount,
            filled,
            cancelled,
        ))
    }

    /// Taker-token amount still available to fill.
    pub async fn remaining_fillable(&self, signed: &SignedOrder) -> Result<U256> {
        Ok(self.order_state(signed).await?.remaining)
    }

    /// Check fillability against the exchange's current state and the wall clock.
    pub async fn check_fillable(&self, signed: &SignedOrder) -> Result<OrderState> {
        let state = self.order_state(signed).await?;
        check_fillable_at(signed, &state, now_unix())?;
        Ok(state)
    }

    /// Check that `taker` can fill `fill_amount` of `signed`: the order is
    /// fillable, the taker is permitted, and both allowances cover the amounts
    /// the fill would move.
    pub async fn check_fill(
        &self,
        signed: &SignedOrder,
        taker: Address,
        fill_amount: U256,
    ) -> Result<FillAmounts> {
        if fill_amount.is_zero() {
            return Err(Error::InvalidAmount {
                reason: "fill amount must be greater than zero".to_string(),
            });
        }

        let order = signed.order();
        if !order.is_open_to_any_taker() && order.taker != taker {
            return Err(Error::OrderNotFillable {
                order_hash: signed.order_hash(),
                reason: NotFillableReason::TakerNotPermitted { taker },
            });
        }

        let state = self.check_fillable(signed).await?;
        let amounts = fill_amounts(signed, state.remaining, fill_amount);

        self.allowances
            .check_allowance(order.maker_token_address, order.maker, amounts.maker_token_amount)
            .await?;
        self.allowances
            .check_allowance(order.taker_token_address, taker, amounts.taker_token_amount)
            .await?;

        debug!(
            order_hash = %signed.order_hash(),
            taker = %taker,
            taker_amount = %amounts.taker_token_amount,
            maker_amount = %amounts.maker_token_amount,
            "Fill pre-check passed"
        );
        Ok(amounts)
    }
}

impl std::fmt::Debug for FillValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FillValidator")
            .field("exchange", &self.exchange)
            .finish()
    }
}

/// Pure fillability check against an explicit state and clock.
pub fn check_fillable_at(signed: &SignedOrder, state: &OrderState, now: u64) -> Result<()> {
    let order_hash = signed.verify()?;
    let order = signed.order();

    if U256::from(now) >= order.expiration_unix_timestamp_sec {
        return Err(Error::OrderNotFillable {
            order_hash,
            reason: NotFillableReason::Expired {
                expiration: order.expiration_unix_timestamp_sec,
                now,
            },
        });
    }

    if state.remaining.is_zero() {
        let reason = if state.cancelled.is_zero() {
            NotFillableReason::FullyFilled
        } else {
            NotFillableReason::Cancelled
        };
        return Err(Error::OrderNotFillable { order_hash, reason });
    }

    Ok(())
}

/// Amounts a request for `fill_amount` moves, clipped to `remaining` the way
/// the exchange clips it.
pub fn fill_amounts(signed: &SignedOrder, remaining: U256, fill_amount: U256) -> FillAmounts {
    let order = signed.order();
    let taker_token_amount = fill_amount.min(remaining);
    let maker_token_amount =
        taker_token_amount.saturating_mul(order.maker_token_amount) / order.taker_token_amount;
    FillAmounts {
        taker_token_amount,
        maker_token_amount,
    }
}

pub(crate) fn now_unix() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

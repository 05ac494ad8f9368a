//! Token transfer proxy allowances.
//!
//! The exchange moves both parties' tokens through the token transfer proxy,
//! so maker and taker must each have approved the proxy for the token they
//! give before a fill can settle.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use tracing::{debug, info, warn};
use zeroex_core::config::EngineConfig;
use zeroex_core::contracts::{ContractCall, MAX_UINT256};
use zeroex_core::error::Party;
use zeroex_core::ledger::{read_uint, Ledger, TransactionReceipt, TransactionRequest};
use zeroex_core::order::SignedOrder;
use zeroex_core::{Error, Result};

use crate::waiter::TransactionWaiter;

/// Result of ensuring one allowance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowanceOutcome {
    /// Allowance was already at or above the threshold; nothing was sent.
    AlreadySufficient { allowance: U256 },
    /// An unlimited approval was submitted and mined.
    Approved(TransactionReceipt),
}

impl AllowanceOutcome {
    pub fn was_approved(&self) -> bool {
        matches!(self, AllowanceOutcome::Approved(_))
    }
}

/// Per-side outcome of [`AllowanceManager::ensure_allowances`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowanceReport {
    pub maker: AllowanceOutcome,
    pub taker: AllowanceOutcome,
}

/// Reads and raises token transfer proxy allowances.
#[derive(Clone)]
pub struct AllowanceManager {
    ledger: Arc<dyn Ledger>,
    waiter: TransactionWaiter,
    spender: Address,
    threshold: U256,
    gas_limit: Option<u64>,
}

impl AllowanceManager {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        waiter: TransactionWaiter,
        token_transfer_proxy: Address,
        config: &EngineConfig,
    ) -> Self {
        Self {
            ledger,
            waiter,
            spender: token_transfer_proxy,
            threshold: config.allowance_threshold,
            gas_limit: config.gas_limit,
        }
    }

    /// Current allowance of `owner` for the proxy.
    pub async fn allowance(&self, token: Address, owner: Address) -> Result<U256> {
        read_uint(
            self.ledger.as_ref(),
            token,
            &ContractCall::Allowance {
                owner,
                spender: self.spender,
            },
        )
        .await
    }

    /// Make sure the proxy may move any amount of `token` for `owner`.
    pub async fn ensure_unlimited_allowance(
        &self,
        token: Address,
        owner: Address,
    ) -> Result<AllowanceOutcome> {
        let allowance = self.allowance(token, owner).await?;
        if allowance >= self.threshold {
            debug!(token = %token, owner = %owner, "Allowance already sufficient");
            return Ok(AllowanceOutcome::AlreadySufficient { allowance });
        }

        info!(token = %token, owner = %owner, current = %allowance, "Setting unlimited allowance");

        let request = TransactionRequest::call(
            owner,
            token,
            &ContractCall::Approve {
                spender: self.spender,
                amount: MAX_UINT256,
            },
        )
        .with_gas(self.gas_limit);
        let tx_hash = self.ledger.send_transaction(request).await?;
        let receipt = self.waiter.await_mined(tx_hash).await?;

        info!(token = %token, owner = %owner, tx_hash = %tx_hash, "Allowance approved");
        Ok(AllowanceOutcome::Approved(receipt))
    }

    /// Ensure the maker's and taker's allowances for `signed`, concurrently.
    ///
    /// Both sides always run to completion. If either fails the result is
    /// `AllowancesIncomplete`, carrying every side's tagged failure and the
    /// approvals that were mined on the side that succeeded.
    pub async fn ensure_allowances(
        &self,
        signed: &SignedOrder,
        taker: Address,
    ) -> Result<AllowanceReport> {
        let order = signed.order();
        let maker_token = order.maker_token_address;
        let taker_token = order.taker_token_address;

        let (maker_result, taker_result) = tokio::join!(
            self.ensure_unlimited_allowance(maker_token, order.maker),
            self.ensure_unlimited_allowance(taker_token, taker),
        );

        let (maker_result, taker_result) = match (maker_result, taker_result) {
            (Ok(maker), Ok(taker)) => return Ok(AllowanceReport { maker, taker }),
            results => results,
        };

        let sides = [
            (Party::Maker, maker_token, order.maker, maker_result),
            (Party::Taker, taker_token, taker, taker_result),
        ];
        let mut failures = Vec::new();
        let mut approved = Vec::new();
        for (side, token, owner, result) in sides {
            match result {
                Ok(AllowanceOutcome::Approved(receipt)) => approved.push(receipt.transaction_hash),
                Ok(AllowanceOutcome::AlreadySufficient { .. }) => {}
                Err(source) => {
                    warn!(side = %side, token = %token, owner = %owner, error = %source, "Allowance setup failed");
                    failures.push(Error::AllowanceSetup {
                        side,
                        token,
                        owner,
                        source: Box::new(source),
                    });
                }
            }
        }
        Err(Error::AllowancesIncomplete { failures, approved })
    }

    /// Fail with `AllowanceInsufficient` unless `owner` has approved at least
    /// `required` of `token`.
    pub async fn check_allowance(
        &self,
        token: Address,
        owner: Address,
        required: U256,
    ) -> Result<U256> {
        let available = self.allowance(token, owner).await?;
        if available < required {
            return Err(Error::AllowanceInsufficient {
                token,
                owner,
                required,
                available,
            });
        }
        Ok(available)
    }
}

impl std::fmt::Debug for AllowanceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllowanceManager")
            .field("spender", &self.spender)
            .field("threshold", &self.threshold)
            .finish()
    }
}

//! Native ether to wrapped ether conversion.

use std::sync::Arc;

use alloy_primitives::Address;
use rust_decimal::Decimal;
use tracing::info;
use zeroex_core::amount::{to_base_units, ETHER_DECIMALS};
use zeroex_core::contracts::ContractCall;
use zeroex_core::ledger::{Ledger, TransactionReceipt, TransactionRequest};
use zeroex_core::{Error, Result};

use crate::waiter::TransactionWaiter;

/// Wraps native ether through the ether token's `deposit()`.
#[derive(Clone)]
pub struct WrappedAssetConverter {
    ledger: Arc<dyn Ledger>,
    waiter: TransactionWaiter,
    ether_token: Address,
    gas_limit: Option<u64>,
}

impl WrappedAssetConverter {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        waiter: TransactionWaiter,
        ether_token: Address,
        gas_limit: Option<u64>,
    ) -> Self {
        Self {
            ledger,
            waiter,
            ether_token,
            gas_limit,
        }
    }

    /// Deposit `amount` ether from `destination` and credit it the same
    /// amount of wrapped ether.
    pub async fn convert_to_wrapped_asset(
        &self,
        amount: Decimal,
        destination: Address,
    ) -> Result<TransactionReceipt> {
        let value = to_base_units(amount, ETHER_DECIMALS)?;
        if value.is_zero() {
            return Err(Error::InvalidAmount {
                reason: format!("cannot wrap {} ether", amount),
            });
        }

        let request = TransactionRequest::call(destination, self.ether_token, &ContractCall::Deposit)
            .with_value(value)
            .with_gas(self.gas_limit);
        let tx_hash = self.ledger.send_transaction(request).await?;

        info!(destination = %destination, amount = %amount, tx_hash = %tx_hash, "Wrapping ether");
        self.waiter.await_mined(tx_hash).await
    }
}

impl std::fmt::Debug for WrappedAssetConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappedAssetConverter")
            .field("ether_token", &self.ether_token)
            .finish()
    }
}

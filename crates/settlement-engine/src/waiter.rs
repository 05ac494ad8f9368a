//! Transaction confirmation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy_primitives::TxHash;
use tracing::{debug, info, warn};
use zeroex_core::config::EngineConfig;
use zeroex_core::ledger::{Ledger, TransactionReceipt};
use zeroex_core::{Error, Result};

/// Polls the ledger until a transaction is mined.
///
/// There are no retries: a timed-out transaction may still be mined later,
/// and dropping the returned future stops polling without revoking anything.
#[derive(Clone)]
pub struct TransactionWaiter {
    ledger: Arc<dyn Ledger>,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl TransactionWaiter {
    pub fn new(ledger: Arc<dyn Ledger>, poll_interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            ledger,
            poll_interval,
            timeout,
        }
    }

    pub fn from_config(ledger: Arc<dyn Ledger>, config: &EngineConfig) -> Self {
        Self::new(ledger, config.poll_interval(), config.confirmation_timeout())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Wait for `tx_hash` to be mined and succeed.
    pub async fn await_mined(&self, tx_hash: TxHash) -> Result<TransactionReceipt> {
        let start = Instant::now();

        let receipt = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.poll_receipt(tx_hash))
                .await
                .map_err(|_| {
                    warn!(tx_hash = %tx_hash, timeout_ms = timeout.as_millis() as u64, "Transaction not mined in time");
                    Error::TransactionTimeout {
                        tx_hash,
                        waited: timeout,
                    }
                })??,
            None => self.poll_receipt(tx_hash).await?,
        };

        if !receipt.succeeded() {
            warn!(tx_hash = %tx_hash, block = ?receipt.block(), "Transaction reverted");
            return Err(Error::TransactionReverted {
                tx_hash,
                receipt: Box::new(receipt),
            });
        }

        info!(
            tx_hash = %tx_hash,
            block = ?receipt.block(),
            gas_used = %receipt.gas_used,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Transaction mined"
        );

        Ok(receipt)
    }

    async fn poll_receipt(&self, tx_hash: TxHash) -> Result<TransactionReceipt> {
        let mut polls = 0u64;
        loop {
            if let Some(receipt) = self.ledger.transaction_receipt(tx_hash).await? {
                return Ok(receipt);
            }
            polls += 1;
            debug!(tx_hash = %tx_hash, polls, "Transaction pending");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl std::fmt::Debug for TransactionWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionWaiter")
            .field("poll_interval", &self.poll_interval)
            .field("timeout", &self.timeout)
            .finish()
    }
}

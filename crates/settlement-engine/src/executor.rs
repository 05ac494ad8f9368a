//! Fill and cancel submission against the exchange.

use std::sync::Arc;
use std::time::Instant;

use alloy_primitives::{Address, TxHash, B256, U256};
use tracing::{debug, error, info, warn};
use zeroex_core::config::EngineConfig;
use zeroex_core::contracts::{CancelEvent, ContractCall, ExchangeEvent, FillEvent};
use zeroex_core::error::FillRejection;
use zeroex_core::ledger::{Ledger, TransactionReceipt, TransactionRequest};
use zeroex_core::order::SignedOrder;
use zeroex_core::{Error, Result};

use crate::validator::{FillValidator, PrecheckPolicy};
use crate::waiter::TransactionWaiter;

/// Counters for submitted fills.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionMetrics {
    pub fills_submitted: u64,
    pub fills_settled: u64,
    pub fills_rejected: u64,
    /// Fills stopped by the local pre-check before submission.
    pub fills_blocked: u64,
    pub avg_latency_us: u64,
}

/// Outcome of a settled fill.
#[derive(Debug)]
pub struct FillResult {
    pub order_hash: B256,
    pub receipt: TransactionReceipt,
    pub filled_taker_token_amount: U256,
    pub filled_maker_token_amount: U256,
    /// Local pre-check failure recorded under `PrecheckPolicy::AttemptAnyway`.
    pub precheck_failure: Option<Error>,
}

impl FillResult {
    pub fn tx_hash(&self) -> TxHash {
        self.receipt.transaction_hash
    }
}

/// Outcome of a mined cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelResult {
    pub order_hash: B256,
    pub receipt: TransactionReceipt,
    pub cancelled_taker_token_amount: U256,
    pub cancelled_maker_token_amount: U256,
}

/// Submits fills with fail-loud balance checks and waits for settlement.
pub struct FillExecutor {
    ledger: Arc<dyn Ledger>,
    validator: FillValidator,
    waiter: TransactionWaiter,
    exchange: Address,
    precheck: PrecheckPolicy,
    gas_limit: Option<u64>,
    /// Submission counters for observability. No fill or cancel decision
    /// reads them; order state always comes from the exchange.
    metrics: std::sync::RwLock<ExecutionMetrics>,
}

impl FillExecutor {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        validator: FillValidator,
        waiter: TransactionWaiter,
        exchange: Address,
        config: &EngineConfig,
    ) -> Self {
        Self {
            ledger,
            validator,
            waiter,
            exchange,
            precheck: config.precheck,
            gas_limit: config.gas_limit,
            metrics: std::sync::RwLock::new(ExecutionMetrics::default()),
        }
    }

    pub fn precheck_policy(&self) -> PrecheckPolicy {
        self.precheck
    }

    /// Fill up to `fill_amount` taker-token base units of `signed` as `taker`.
    ///
    /// The amount is not clipped locally; the exchange fills
    /// `min(fill_amount, remaining)`.
    pub async fn fill(
        &self,
        signed: &SignedOrder,
        taker: Address,
        fill_amount: U256,
    ) -> Result<FillResult> {
        let start = Instant::now();
        let order_hash = signed.order_hash();

        if fill_amount.is_zero() {
            return Err(Error::InvalidAmount {
                reason: "fill amount must be greater than zero".to_string(),
            });
        }

        let precheck_failure = match self.validator.check_fill(signed, taker, fill_amount).await {
            Ok(_) => None,
            Err(e) if self.precheck == PrecheckPolicy::AttemptAnyway => {
                warn!(
                    order_hash = %order_hash,
                    error = %e,
                    "Fill pre-check failed, submitting anyway"
                );
                Some(e)
            }
            Err(e) => {
                self.record(|m| m.fills_blocked += 1);
                debug!(order_hash = %order_hash, error = %e, "Fill blocked by pre-check");
                return Err(e);
            }
        };

        info!(
            order_hash = %order_hash,
            taker = %taker,
            amount = %fill_amount,
            "Submitting fill"
        );

        let call = ContractCall::FillOrder {
            order: signed.order().clone(),
            fill_taker_token_amount: fill_amount,
            should_throw_on_insufficient_balance_or_allowance: true,
            signature: *signed.signature(),
        };
        let result = self.submit(taker, &call, order_hash, false).await;

        let result = result.and_then(|receipt| {
            let event = find_event(&receipt, self.exchange, order_hash, false)?;
            match event {
                ExchangeEvent::Fill(FillEvent {
                    filled_taker_token_amount,
                    filled_maker_token_amount,
                    ..
                }) => Ok(FillResult {
                    order_hash,
                    filled_taker_token_amount,
                    filled_maker_token_amount,
                    receipt,
                    precheck_failure,
                }),
                _ => Err(Error::abi("fill receipt carries no fill event")),
            }
        });

        let latency_us = start.elapsed().as_micros() as u64;
        self.record(|m| {
            m.fills_submitted += 1;
            match &result {
                Ok(_) => m.fills_settled += 1,
                Err(_) => m.fills_rejected += 1,
            }
            m.avg_latency_us =
                (m.avg_latency_us * (m.fills_submitted - 1) + latency_us) / m.fills_submitted;
        });

        match &result {
            Ok(fill) => info!(
                order_hash = %order_hash,
                tx_hash = %fill.tx_hash(),
                filled_taker = %fill.filled_taker_token_amount,
                filled_maker = %fill.filled_maker_token_amount,
                latency_us,
                "Fill settled"
            ),
            Err(e) => error!(order_hash = %order_hash, error = %e, "Fill failed"),
        }

        result
    }

    /// Cancel up to `cancel_amount` taker-token base units of `signed` as its maker.
    pub async fn cancel(&self, signed: &SignedOrder, cancel_amount: U256) -> Result<CancelResult> {
        let order_hash = signed.order_hash();
        if cancel_amount.is_zero() {
            return Err(Error::InvalidAmount {
                reason: "cancel amount must be greater than zero".to_string(),
            });
        }

        info!(order_hash = %order_hash, amount = %cancel_amount, "Submitting cancellation");

        let call = ContractCall::CancelOrder {
            order: signed.order().clone(),
            cancel_taker_token_amount: cancel_amount,
        };
        let receipt = self.submit(signed.maker(), &call, order_hash, true).await?;

        match find_event(&receipt, self.exchange, order_hash, true)? {
            ExchangeEvent::Cancel(CancelEvent {
                cancelled_taker_token_amount,
                cancelled_maker_token_amount,
                ..
            }) => {
                info!(
                    order_hash = %order_hash,
                    tx_hash = %receipt.transaction_hash,
                    cancelled_taker = %cancelled_taker_token_amount,
                    "Order cancelled"
                );
                Ok(CancelResult {
                    order_hash,
                    receipt,
                    cancelled_taker_token_amount,
                    cancelled_maker_token_amount,
                })
            }
            _ => Err(Error::abi("cancel receipt carries no cancel event")),
        }
    }

    /// Snapshot of the submission counters.
    pub fn metrics(&self) -> ExecutionMetrics {
        self.metrics
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    fn record(&self, update: impl FnOnce(&mut ExecutionMetrics)) {
        if let Ok(mut metrics) = self.metrics.write() {
            update(&mut metrics);
        }
    }

    /// Send an exchange call and wait for it. A node refusing the call as
    /// reverting, or a mined revert, becomes the rejection error for the call
    /// kind. Other node errors pass through unchanged.
    async fn submit(
        &self,
        from: Address,
        call: &ContractCall,
        order_hash: B256,
        cancelling: bool,
    ) -> Result<TransactionReceipt> {
        let rejected = |reason: FillRejection, tx_hash: Option<TxHash>| {
            if cancelling {
                Error::CancelRejected {
                    order_hash,
                    reason,
                    tx_hash,
                }
            } else {
                Error::FillRejected {
                    order_hash,
                    reason,
                    tx_hash,
                }
            }
        };

        let request = TransactionRequest::call(from, self.exchange, call).with_gas(self.gas_limit);
        let tx_hash = match self.ledger.send_transaction(request).await {
            Ok(tx_hash) => tx_hash,
            Err(e) if e.is_revert_refusal() => {
                let message = match e {
                    Error::Rpc { message, .. } => message,
                    other => other.to_string(),
                };
                return Err(rejected(FillRejection::Refused { message }, None));
            }
            Err(e) => return Err(e),
        };

        match self.waiter.await_mined(tx_hash).await {
            Ok(receipt) => Ok(receipt),
            Err(Error::TransactionReverted { tx_hash, .. }) => {
                Err(rejected(FillRejection::Reverted, Some(tx_hash)))
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for FillExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FillExecutor")
            .field("exchange", &self.exchange)
            .field("precheck", &self.precheck)
            .field("metrics", &self.metrics())
            .finish()
    }
}

/// First exchange event for `order_hash` in `receipt`. A `LogError` becomes
/// the matching rejection.
fn find_event(
    receipt: &TransactionReceipt,
    exchange: Address,
    order_hash: B256,
    cancelling: bool,
) -> Result<ExchangeEvent> {
    for log in &receipt.logs {
        let Some(event) = ExchangeEvent::from_log(log, exchange)? else {
            continue;
        };
        let event_hash = match &event {
            ExchangeEvent::Fill(fill) => fill.order_hash,
            ExchangeEvent::Cancel(cancel) => cancel.order_hash,
            ExchangeEvent::Error { order_hash, .. } => *order_hash,
        };
        if event_hash != order_hash {
            continue;
        }

        if let ExchangeEvent::Error { error_id, .. } = event {
            let reason = FillRejection::from_error_id(error_id).unwrap_or(FillRejection::Reverted);
            let tx_hash = Some(receipt.transaction_hash);
            return Err(if cancelling {
                Error::CancelRejected {
                    order_hash,
                    reason,
                    tx_hash,
                }
            } else {
                Error::FillRejected {
                    order_hash,
                    reason,
                    tx_hash,
                }
            });
        }
        return Ok(event);
    }

    Err(Error::abi(format!(
        "receipt {} has no exchange event for order {}",
        receipt.transaction_hash, order_hash
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allowance::AllowanceManager;
    use crate::testing::{dev_chain, ether, DevChain, MockNode};
    use zeroex_core::error::NotFillableReason;
    use zeroex_core::order::OrderBuilder;

    fn executor(chain: &DevChain, precheck: PrecheckPolicy) -> FillExecutor {
        let config = EngineConfig {
            precheck,
            ..chain.config()
        };
        let waiter = chain.waiter();
        let allowances = AllowanceManager::new(
            chain.ledger.clone(),
            waiter.clone(),
            chain.protocol.token_transfer_proxy,
            &config,
        );
        let validator = FillValidator::new(chain.ledger.clone(), allowances, chain.protocol.exchange);
        FillExecutor::new(
            chain.ledger.clone(),
            validator,
            waiter,
            chain.protocol.exchange,
            &config,
        )
    }

    #[tokio::test]
    async fn test_partial_fill_accounting() {
        let chain = dev_chain().await;
        chain.approve_both().await;
        let executor = executor(&chain, PrecheckPolicy::Enforce);
        let signed = chain.signed_order(ether(2), ether(3)).await;

        let first = executor.fill(&signed, chain.taker, ether(1)).await.unwrap();
        assert_eq!(first.filled_taker_token_amount, ether(1));
        assert!(first.precheck_failure.is_none());

        let second = executor.fill(&signed, chain.taker, ether(5)).await.unwrap();
        assert_eq!(second.filled_taker_token_amount, ether(2));

        let before = chain.memory.transaction_count().await;
        let third = executor.fill(&signed, chain.taker, ether(1)).await;
        assert!(matches!(
            third,
            Err(Error::OrderNotFillable {
                reason: NotFillableReason::FullyFilled,
                ..
            })
        ));
        assert_eq!(chain.memory.transaction_count().await, before);

        let metrics = executor.metrics();
        assert_eq!(metrics.fills_submitted, 2);
        assert_eq!(metrics.fills_settled, 2);
        assert_eq!(metrics.fills_blocked, 1);
    }

    #[tokio::test]
    async fn test_zero_amount_is_rejected_locally() {
        let chain = dev_chain().await;
        let executor = executor(&chain, PrecheckPolicy::AttemptAnyway);
        let signed = chain.signed_order(ether(2), ether(3)).await;

        let result = executor.fill(&signed, chain.taker, U256::ZERO).await;
        assert!(matches!(result, Err(Error::InvalidAmount { .. })));
        assert_eq!(chain.memory.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn test_attempt_anyway_surfaces_exchange_rejection() {
        let chain = dev_chain().await;
        chain.approve_both().await;
        let executor = executor(&chain, PrecheckPolicy::AttemptAnyway);
        let signed = chain.signed_order(ether(2), ether(3)).await;

        executor.fill(&signed, chain.taker, ether(3)).await.unwrap();
        let err = executor
            .fill(&signed, chain.taker, ether(1))
            .await
            .unwrap_err();
        match &err {
            Error::FillRejected {
                reason: FillRejection::FullyFilledOrCancelled,
                tx_hash: Some(_),
                ..
            } => {}
            other => panic!("unexpected error {:?}", other),
        }
        assert!(err.submitted_transaction().is_some());
    }

    #[tokio::test]
    async fn test_missing_allowance_reverts_when_attempted() {
        let chain = dev_chain().await;
        chain.approve_unlimited(chain.zrx(), chain.maker).await;
        let executor = executor(&chain, PrecheckPolicy::AttemptAnyway);
        let signed = chain.signed_order(ether(2), ether(3)).await;

        let err = executor
            .fill(&signed, chain.taker, ether(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::FillRejected {
                reason: FillRejection::Reverted,
                tx_hash: Some(_),
                ..
            }
        ));
        assert_eq!(executor.metrics().fills_rejected, 1);
    }

    #[tokio::test]
    async fn test_refused_submission_has_no_tx_hash() {
        let chain = dev_chain().await;
        chain.memory.set_refuse_reverting(true).await;
        let executor = executor(&chain, PrecheckPolicy::AttemptAnyway);
        let signed = chain.signed_order(ether(2), ether(3)).await;

        let err = executor
            .fill(&signed, chain.taker, ether(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::FillRejected {
                reason: FillRejection::Refused { .. },
                tx_hash: None,
                ..
            }
        ));
        assert_eq!(err.submitted_transaction(), None);
    }

    fn executor_on(chain: &DevChain, node: MockNode) -> FillExecutor {
        let ledger: Arc<dyn Ledger> = Arc::new(node);
        let config = EngineConfig {
            precheck: PrecheckPolicy::AttemptAnyway,
            ..chain.config()
        };
        let waiter = TransactionWaiter::from_config(ledger.clone(), &config);
        let allowances = AllowanceManager::new(
            ledger.clone(),
            waiter.clone(),
            chain.protocol.token_transfer_proxy,
            &config,
        );
        let validator = FillValidator::new(ledger.clone(), allowances, chain.protocol.exchange);
        FillExecutor::new(ledger, validator, waiter, chain.protocol.exchange, &config)
    }

    fn unreachable_node(send_error: Error) -> MockNode {
        let mut node = MockNode::new();
        node.expect_call().returning(|_, _| {
            Err(Error::Rpc {
                message: "connection refused".to_string(),
                code: None,
            })
        });
        node.expect_send_transaction()
            .times(1)
            .return_once(move |_| Err(send_error));
        node
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_a_rejection() {
        let chain = dev_chain().await;
        let signed = chain.signed_order(ether(2), ether(3)).await;
        let node = unreachable_node(Error::Rpc {
            message: "eth_sendTransaction request failed: 502 Bad Gateway".to_string(),
            code: None,
        });
        let executor = executor_on(&chain, node);

        let err = executor
            .fill(&signed, chain.taker, ether(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Rpc { code: None, .. }));
        assert_eq!(err.submitted_transaction(), None);
    }

    #[tokio::test]
    async fn test_duplicate_submission_is_not_a_rejection() {
        let chain = dev_chain().await;
        let signed = chain.signed_order(ether(2), ether(3)).await;
        let node = unreachable_node(Error::Rpc {
            message: "already known".to_string(),
            code: Some(-32000),
        });
        let executor = executor_on(&chain, node);

        let err = executor.cancel(&signed, ether(1)).await.unwrap_err();
        assert!(matches!(err, Error::Rpc { ref message, .. } if message == "already known"));
    }

    #[tokio::test]
    async fn test_reverting_estimate_is_a_refusal() {
        let chain = dev_chain().await;
        let signed = chain.signed_order(ether(2), ether(3)).await;
        let node = unreachable_node(Error::Rpc {
            message: "execution reverted".to_string(),
            code: Some(3),
        });
        let executor = executor_on(&chain, node);

        let err = executor
            .fill(&signed, chain.taker, ether(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::FillRejected {
                reason: FillRejection::Refused { .. },
                tx_hash: None,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_precheck_failure_is_recorded_on_success() {
        let chain = dev_chain().await;
        chain.approve_both().await;
        let executor = executor(&chain, PrecheckPolicy::AttemptAnyway);

        // local clock is past expiry, the chain's clock is not
        let now = crate::validator::now_unix();
        chain.memory.set_timestamp(now - 100).await;
        let order = OrderBuilder::new(chain.protocol.exchange)
            .maker(chain.maker)
            .maker_asset(chain.zrx(), ether(2))
            .taker_asset(chain.weth(), ether(3))
            .expires_at(now - 10)
            .build()
            .unwrap();
        let signed = chain.sign(order).await;

        let fill = executor.fill(&signed, chain.taker, ether(3)).await.unwrap();
        assert_eq!(fill.filled_maker_token_amount, ether(2));
        assert!(matches!(
            fill.precheck_failure,
            Some(Error::OrderNotFillable {
                reason: NotFillableReason::Expired { .. },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_cancel_then_fill_is_blocked() {
        let chain = dev_chain().await;
        chain.approve_both().await;
        let executor = executor(&chain, PrecheckPolicy::Enforce);
        let signed = chain.signed_order(ether(2), ether(3)).await;

        executor.fill(&signed, chain.taker, ether(1)).await.unwrap();
        let cancelled = executor.cancel(&signed, ether(3)).await.unwrap();
        assert_eq!(cancelled.cancelled_taker_token_amount, ether(2));

        let err = executor.fill(&signed, chain.taker, ether(1)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::OrderNotFillable {
                reason: NotFillableReason::Cancelled,
                ..
            }
        ));

        let err = executor.cancel(&signed, ether(1)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::CancelRejected {
                reason: FillRejection::FullyFilledOrCancelled,
                tx_hash: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn test_receipt_without_exchange_event_is_malformed() {
        let receipt = TransactionReceipt {
            transaction_hash: B256::repeat_byte(0x0a),
            block_number: None,
            gas_used: U256::ZERO,
            status: None,
            logs: vec![],
        };
        let err = find_event(&receipt, Address::repeat_byte(0xe1), B256::repeat_byte(0x0b), false)
            .unwrap_err();
        assert!(matches!(err, Error::Abi { .. }));
        assert!(err.to_string().contains(&receipt.transaction_hash.to_string()));
    }
}

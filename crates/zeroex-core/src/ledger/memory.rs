//! In-process development chain.
//!
//! Reproduces the contracts the engine talks to: ERC-20 tokens with
//! unlimited-allowance semantics (an allowance of `U256::MAX` is never
//! decremented), the wrapped ether token's `deposit()`, and the v1 exchange's
//! `fillOrder` / `cancelOrder` rules including expiry, rounding and signature
//! checks.
//!
//! State changes apply when a transaction is submitted; its receipt surfaces
//! according to the configured [`MiningMode`].

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{keccak256, Address, Bytes, TxHash, B256, U256, U64};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Ledger, Log, TransactionReceipt, TransactionRequest};
use crate::contracts::{CancelEvent, ContractCall, ExchangeEvent, FillEvent};
use crate::error::FillRejection;
use crate::order::OrderRecord;
use crate::registry::ProtocolAddresses;
use crate::signing::{verify_signature, EcSignature};
use crate::{Error, Result};

const TRANSFER_GAS: u64 = 46_000;
const EXCHANGE_GAS: u64 = 120_000;

/// When receipts of submitted transactions become visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MiningMode {
    /// Receipt is available immediately.
    #[default]
    Instant,
    /// Receipt is available after this many receipt queries returned pending.
    AfterPolls(u32),
    /// Transactions stay pending forever.
    Never,
}

#[derive(Debug, Clone, Default)]
struct WorldState {
    native: HashMap<Address, U256>,
    /// (token, owner)
    balances: HashMap<(Address, Address), U256>,
    /// (token, owner, spender)
    allowances: HashMap<(Address, Address, Address), U256>,
    filled: HashMap<B256, U256>,
    cancelled: HashMap<B256, U256>,
}

#[derive(Debug)]
struct PendingReceipt {
    receipt: TransactionReceipt,
    /// `None` never mines.
    polls_remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct ChainState {
    world: WorldState,
    timestamp: Option<u64>,
    block_number: u64,
    mining: MiningMode,
    refuse_reverting: bool,
    receipts: HashMap<TxHash, PendingReceipt>,
    sent: Vec<TransactionRequest>,
}

impl ChainState {
    fn now(&self) -> u64 {
        self.timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64)
    }
}

/// Outcome of executing one call: emitted logs, or a revert reason.
type Execution = std::result::Result<Vec<Log>, String>;

/// In-memory [`Ledger`] for development and tests.
#[derive(Clone)]
pub struct MemoryLedger {
    protocol: ProtocolAddresses,
    accounts: Vec<Address>,
    state: Arc<RwLock<ChainState>>,
}

impl MemoryLedger {
    pub fn new(protocol: ProtocolAddresses, accounts: Vec<Address>) -> Self {
        Self {
            protocol,
            accounts,
            state: Arc::new(RwLock::new(ChainState::default())),
        }
    }

    pub fn protocol(&self) -> &ProtocolAddresses {
        &self.protocol
    }

    /// Pin the block timestamp; the wall clock is used until this is called.
    pub async fn set_timestamp(&self, timestamp: u64) {
        self.state.write().await.timestamp = Some(timestamp);
    }

    pub async fn set_mining(&self, mode: MiningMode) {
        self.state.write().await.mining = mode;
    }

    /// Refuse transactions that would revert at submission, like nodes that
    /// simulate before accepting.
    pub async fn set_refuse_reverting(&self, refuse: bool) {
        self.state.write().await.refuse_reverting = refuse;
    }

    pub async fn fund_native(&self, owner: Address, amount: U256) {
        let mut state = self.state.write().await;
        let balance = state.world.native.entry(owner).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub async fn mint(&self, token: Address, owner: Address, amount: U256) {
        let mut state = self.state.write().await;
        let balance = state.world.balances.entry((token, owner)).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub async fn native_balance(&self, owner: Address) -> U256 {
        self.state
            .read()
            .await
            .world
            .native
            .get(&owner)
            .copied()
            .unwrap_or_default()
    }

    pub async fn balance_of(&self, token: Address, owner: Address) -> U256 {
        self.state.read().await.world.balance(token, owner)
    }

    pub async fn allowance_of(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.state.read().await.world.allowance(token, owner, spender)
    }

    /// Transactions accepted so far, in submission order.
    pub async fn transactions(&self) -> Vec<TransactionRequest> {
        self.state.read().await.sent.clone()
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.sent.len()
    }

    fn execute(&self, world: &mut WorldState, now: u64, request: &TransactionRequest) -> Execution {
        let call = ContractCall::decode(request.to, &request.data).map_err(|e| e.to_string())?;

        if !request.value.is_zero() && !matches!(call, ContractCall::Deposit) {
            return Err("call is not payable".to_string());
        }

        match call {
            ContractCall::Approve { spender, amount } => {
                self.require_token(request.to)?;
                world
                    .allowances
                    .insert((request.to, request.from, spender), amount);
                Ok(Vec::new())
            }
            ContractCall::Deposit => {
                if request.to != self.protocol.ether_token {
                    return Err("deposit sent to a contract without one".to_string());
                }
                let native = world.native.entry(request.from).or_default();
                *native = native
                    .checked_sub(request.value)
                    .ok_or("insufficient native balance")?;
                let balance = world
                    .balances
                    .entry((self.protocol.ether_token, request.from))
                    .or_default();
                *balance = balance.saturating_add(request.value);
                Ok(Vec::new())
            }
            ContractCall::FillOrder {
                order,
                fill_taker_token_amount,
                should_throw_on_insufficient_balance_or_allowance,
                signature,
            } => {
                self.require_exchange(request.to)?;
                self.fill_order(
                    world,
                    now,
                    request.from,
                    &order,
                    fill_taker_token_amount,
                    should_throw_on_insufficient_balance_or_allowance,
                    &signature,
                )
            }
            ContractCall::CancelOrder {
                order,
                cancel_taker_token_amount,
            } => {
                self.require_exchange(request.to)?;
                self.cancel_order(world, now, request.from, &order, cancel_taker_token_amount)
            }
            ContractCall::Allowance { .. }
            | ContractCall::BalanceOf { .. }
            | ContractCall::Filled { .. }
            | ContractCall::Cancelled { .. } => Ok(Vec::new()),
        }
    }

    fn require_token(&self, to: Address) -> std::result::Result<(), String> {
        if to == self.protocol.exchange || to == self.protocol.token_transfer_proxy {
            return Err(format!("{} is not a token", to));
        }
        Ok(())
    }

    fn require_exchange(&self, to: Address) -> std::result::Result<(), String> {
        if to != self.protocol.exchange {
            return Err(format!("{} is not the exchange", to));
        }
        Ok(())
    }

    fn error_log(&self, reason: FillRejection, order_hash: B256) -> Execution {
        let error_id = reason.error_id().ok_or("rejection has no exchange error id")?;
        Ok(vec![ExchangeEvent::Error {
            error_id,
            order_hash,
        }
        .to_log(self.protocol.exchange)])
    }

    #[allow(clippy::too_many_arguments)]
    fn fill_order(
        &self,
        world: &mut WorldState,
        now: u64,
        sender: Address,
        order: &OrderRecord,
        fill_taker_token_amount: U256,
        should_throw: bool,
        signature: &EcSignature,
    ) -> Execution {
        let order_hash = order.hash();

        if !order.taker.is_zero() && order.taker != sender {
            return Err("sender is not the order taker".to_string());
        }
        if order.maker_token_amount.is_zero()
            || order.taker_token_amount.is_zero()
            || fill_taker_token_amount.is_zero()
        {
            return Err("zero amount".to_string());
        }
        if verify_signature(order_hash, signature, order.maker).is_err() {
            return Err("invalid signature".to_string());
        }

        if U256::from(now) >= order.expiration_unix_timestamp_sec {
            return self.error_log(FillRejection::Expired, order_hash);
        }

        let remaining = order
            .taker_token_amount
            .saturating_sub(world.unavailable(order_hash));
        let filled_taker = fill_taker_token_amount.min(remaining);
        if filled_taker.is_zero() {
            return self.error_log(FillRejection::FullyFilledOrCancelled, order_hash);
        }
        if is_rounding_error(filled_taker, order.taker_token_amount, order.maker_token_amount) {
            return self.error_log(FillRejection::RoundingErrorTooLarge, order_hash);
        }

        let filled_maker =
            partial_amount(filled_taker, order.taker_token_amount, order.maker_token_amount);
        let charge_fees = !order.fee_recipient.is_zero();
        let paid_maker_fee = if charge_fees {
            partial_amount(filled_taker, order.taker_token_amount, order.maker_fee)
        } else {
            U256::ZERO
        };
        let paid_taker_fee = if charge_fees {
            partial_amount(filled_taker, order.taker_token_amount, order.taker_fee)
        } else {
            U256::ZERO
        };

        let proxy = self.protocol.token_transfer_proxy;
        let zrx = self.protocol.zrx_token;
        let transfers = [
            (order.maker_token_address, order.maker, sender, filled_maker),
            (order.taker_token_address, sender, order.maker, filled_taker),
            (zrx, order.maker, order.fee_recipient, paid_maker_fee),
            (zrx, sender, order.fee_recipient, paid_taker_fee),
        ];

        if !should_throw {
            let mut probe = world.clone();
            let transferable = transfers
                .iter()
                .all(|&(token, from, to, value)| probe.transfer_from(token, from, to, proxy, value).is_ok());
            if !transferable {
                return self.error_log(FillRejection::InsufficientBalanceOrAllowance, order_hash);
            }
        }

        let filled = world.filled.entry(order_hash).or_default();
        *filled = filled.saturating_add(filled_taker);
        for (token, from, to, value) in transfers {
            world.transfer_from(token, from, to, proxy, value)?;
        }

        Ok(vec![ExchangeEvent::Fill(FillEvent {
            maker: order.maker,
            taker: sender,
            fee_recipient: order.fee_recipient,
            maker_token: order.maker_token_address,
            taker_token: order.taker_token_address,
            filled_maker_token_amount: filled_maker,
            filled_taker_token_amount: filled_taker,
            paid_maker_fee,
            paid_taker_fee,
            order_hash,
        })
        .to_log(self.protocol.exchange)])
    }

    fn cancel_order(
        &self,
        world: &mut WorldState,
        now: u64,
        sender: Address,
        order: &OrderRecord,
        cancel_taker_token_amount: U256,
    ) -> Execution {
        let order_hash = order.hash();

        if order.maker != sender {
            return Err("only the maker can cancel".to_string());
        }
        if order.maker_token_amount.is_zero()
            || order.taker_token_amount.is_zero()
            || cancel_taker_token_amount.is_zero()
        {
            return Err("zero amount".to_string());
        }

        if U256::from(now) >= order.expiration_unix_timestamp_sec {
            return self.error_log(FillRejection::Expired, order_hash);
        }

        let remaining = order
            .taker_token_amount
            .saturating_sub(world.unavailable(order_hash));
        let cancelled_taker = cancel_taker_token_amount.min(remaining);
        if cancelled_taker.is_zero() {
            return self.error_log(FillRejection::FullyFilledOrCancelled, order_hash);
        }

        let cancelled = world.cancelled.entry(order_hash).or_default();
        *cancelled = cancelled.saturating_add(cancelled_taker);

        Ok(vec![ExchangeEvent::Cancel(CancelEvent {
            maker: order.maker,
            fee_recipient: order.fee_recipient,
            maker_token: order.maker_token_address,
            taker_token: order.taker_token_address,
            cancelled_maker_token_amount: partial_amount(
                cancelled_taker,
                order.taker_token_amount,
                order.maker_token_amount,
            ),
            cancelled_taker_token_amount: cancelled_taker,
            order_hash,
        })
        .to_log(self.protocol.exchange)])
    }
}

impl WorldState {
    fn balance(&self, token: Address, owner: Address) -> U256 {
        self.balances.get(&(token, owner)).copied().unwrap_or_default()
    }

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default()
    }

    fn unavailable(&self, order_hash: B256) -> U256 {
        let filled = self.filled.get(&order_hash).copied().unwrap_or_default();
        let cancelled = self.cancelled.get(&order_hash).copied().unwrap_or_default();
        filled.saturating_add(cancelled)
    }

    /// `transferFrom` executed by `spender`.
    fn transfer_from(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        spender: Address,
        value: U256,
    ) -> std::result::Result<(), String> {
        if value.is_zero() {
            return Ok(());
        }
        let balance = self.balance(token, from);
        let allowance = self.allowance(token, from, spender);
        if balance < value {
            return Err(format!("{} holds {} of {}, needs {}", from, balance, token, value));
        }
        if allowance < value {
            return Err(format!("allowance of {} for {} is {}, needs {}", from, token, allowance, value));
        }

        if allowance != U256::MAX {
            self.allowances
                .insert((token, from, spender), allowance - value);
        }
        self.balances.insert((token, from), balance - value);
        let credited = self.balances.entry((token, to)).or_default();
        *credited = credited.saturating_add(value);
        Ok(())
    }
}

/// `floor(numerator * target / denominator)`.
fn partial_amount(numerator: U256, denominator: U256, target: U256) -> U256 {
    numerator.saturating_mul(target) / denominator
}

/// True when truncating `numerator * target / denominator` loses more than 0.1%.
fn is_rounding_error(numerator: U256, denominator: U256, target: U256) -> bool {
    let remainder = target.mul_mod(numerator, denominator);
    if remainder.is_zero() {
        return false;
    }
    let product = numerator.saturating_mul(target);
    remainder.saturating_mul(U256::from(1_000_000u64)) / product > U256::from(1000u64)
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn accounts(&self) -> Result<Vec<Address>> {
        Ok(self.accounts.clone())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let state = self.state.read().await;
        let world = &state.world;
        let value = match ContractCall::decode(to, &data)? {
            ContractCall::BalanceOf { owner } => world.balance(to, owner),
            ContractCall::Allowance { owner, spender } => world.allowance(to, owner, spender),
            ContractCall::Filled { order_hash } => {
                world.filled.get(&order_hash).copied().unwrap_or_default()
            }
            ContractCall::Cancelled { order_hash } => {
                world.cancelled.get(&order_hash).copied().unwrap_or_default()
            }
            other => {
                return Err(Error::abi(format!("{:?} is not a view call", other)));
            }
        };
        Ok(Bytes::from(value.to_be_bytes::<32>().to_vec()))
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash> {
        if !self.accounts.contains(&request.from) {
            return Err(Error::Rpc {
                message: format!("unknown account {}", request.from),
                code: Some(-32000),
            });
        }

        let mut state = self.state.write().await;
        let now = state.now();
        let mut world = state.world.clone();
        let execution = self.execute(&mut world, now, &request);

        if let Err(reason) = &execution {
            if state.refuse_reverting {
                return Err(Error::Rpc {
                    message: format!("execution reverted: {}", reason),
                    code: Some(-32000),
                });
            }
        }

        let nonce = state.sent.len() as u64;
        let mut preimage = Vec::with_capacity(28);
        preimage.extend_from_slice(request.from.as_slice());
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let tx_hash = keccak256(preimage);

        state.block_number += 1;
        let (status, logs) = match execution {
            Ok(logs) => {
                state.world = world;
                (1u64, logs)
            }
            Err(reason) => {
                debug!(tx_hash = %tx_hash, reason = %reason, "Transaction reverted");
                (0u64, Vec::new())
            }
        };
        let gas_used = if request.to == self.protocol.exchange {
            EXCHANGE_GAS
        } else {
            TRANSFER_GAS
        };

        let receipt = TransactionReceipt {
            transaction_hash: tx_hash,
            block_number: Some(U64::from(state.block_number)),
            gas_used: U256::from(gas_used),
            status: Some(U64::from(status)),
            logs,
        };
        let polls_remaining = match state.mining {
            MiningMode::Instant => Some(0),
            MiningMode::AfterPolls(polls) => Some(polls),
            MiningMode::Never => None,
        };
        state.receipts.insert(
            tx_hash,
            PendingReceipt {
                receipt,
                polls_remaining,
            },
        );
        state.sent.push(request);

        Ok(tx_hash)
    }

    async fn transaction_receipt(&self, tx_hash: TxHash) -> Result<Option<TransactionReceipt>> {
        let mut state = self.state.write().await;
        let Some(pending) = state.receipts.get_mut(&tx_hash) else {
            return Ok(None);
        };
        match pending.polls_remaining.as_mut() {
            Some(0) => Ok(Some(pending.receipt.clone())),
            Some(polls) => {
                *polls -= 1;
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for MemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLedger")
            .field("protocol", &self.protocol)
            .field("accounts", &self.accounts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::MAX_UINT256;
    use crate::ledger::read_uint;
    use crate::order::{OrderBuilder, SignedOrder};
    use crate::signing::{LocalKeyring, SigningBackend};

    const MAKER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TAKER_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
    const NOW: u64 = 1_700_000_000;

    struct Fixture {
        ledger: MemoryLedger,
        keyring: LocalKeyring,
        maker: Address,
        taker: Address,
        maker_token: Address,
        taker_token: Address,
    }

    fn protocol() -> ProtocolAddresses {
        ProtocolAddresses {
            exchange: Address::repeat_byte(0xe1),
            token_transfer_proxy: Address::repeat_byte(0xe2),
            ether_token: Address::repeat_byte(0xe3),
            zrx_token: Address::repeat_byte(0xe4),
        }
    }

    async fn fixture() -> Fixture {
        let mut keyring = LocalKeyring::default();
        let maker = keyring.add_private_key(MAKER_KEY).unwrap();
        let taker = keyring.add_private_key(TAKER_KEY).unwrap();
        let ledger = MemoryLedger::new(protocol(), vec![maker, taker]);
        ledger.set_timestamp(NOW).await;

        let maker_token = Address::repeat_byte(0x0a);
        let taker_token = Address::repeat_byte(0x0b);
        ledger.mint(maker_token, maker, U256::from(1_000u64)).await;
        ledger.mint(taker_token, taker, U256::from(1_000u64)).await;

        Fixture {
            ledger,
            keyring,
            maker,
            taker,
            maker_token,
            taker_token,
        }
    }

    async fn approve(f: &Fixture, token: Address, owner: Address) {
        let request = TransactionRequest::call(
            owner,
            token,
            &ContractCall::Approve {
                spender: protocol().token_transfer_proxy,
                amount: MAX_UINT256,
            },
        );
        f.ledger.send_transaction(request).await.unwrap();
    }

    async fn signed_order(f: &Fixture) -> SignedOrder {
        let order = OrderBuilder::new(protocol().exchange)
            .maker(f.maker)
            .maker_asset(f.maker_token, U256::from(200u64))
            .taker_asset(f.taker_token, U256::from(300u64))
            .expires_at(NOW + 60)
            .salt(U256::from(7u8))
            .build()
            .unwrap();
        let signature = f.keyring.sign_payload(f.maker, order.hash()).await.unwrap();
        SignedOrder::new(order, signature).unwrap()
    }

    async fn fill(f: &Fixture, signed: &SignedOrder, amount: u64) -> TransactionReceipt {
        let call = ContractCall::FillOrder {
            order: signed.order().clone(),
            fill_taker_token_amount: U256::from(amount),
            should_throw_on_insufficient_balance_or_allowance: true,
            signature: *signed.signature(),
        };
        let tx_hash = f
            .ledger
            .send_transaction(TransactionRequest::call(f.taker, protocol().exchange, &call))
            .await
            .unwrap();
        f.ledger.transaction_receipt(tx_hash).await.unwrap().unwrap()
    }

    fn events(receipt: &TransactionReceipt) -> Vec<ExchangeEvent> {
        receipt
            .logs
            .iter()
            .filter_map(|log| ExchangeEvent::from_log(log, protocol().exchange).unwrap())
            .collect()
    }

    #[test]
    fn test_rounding_error_rule() {
        assert!(is_rounding_error(U256::from(20u8), U256::from(30u8), U256::from(20u8)));
        assert!(!is_rounding_error(U256::from(300u64), U256::from(300u64), U256::from(200u64)));
        assert!(is_rounding_error(U256::from(1u8), U256::from(3u8), U256::from(2u8)));
        assert!(!is_rounding_error(U256::from(1000u64), U256::from(3000u64), U256::from(2000u64)));
    }

    #[tokio::test]
    async fn test_partial_fills_move_tokens() {
        let f = fixture().await;
        approve(&f, f.maker_token, f.maker).await;
        approve(&f, f.taker_token, f.taker).await;
        let signed = signed_order(&f).await;

        let receipt = fill(&f, &signed, 150).await;
        assert!(receipt.succeeded());
        match events(&receipt).as_slice() {
            [ExchangeEvent::Fill(event)] => {
                assert_eq!(event.filled_taker_token_amount, U256::from(150u64));
                assert_eq!(event.filled_maker_token_amount, U256::from(100u64));
            }
            other => panic!("unexpected events {:?}", other),
        }

        assert_eq!(f.ledger.balance_of(f.maker_token, f.taker).await, U256::from(100u64));
        assert_eq!(f.ledger.balance_of(f.taker_token, f.maker).await, U256::from(150u64));
        // unlimited allowance is never decremented
        assert_eq!(
            f.ledger
                .allowance_of(f.maker_token, f.maker, protocol().token_transfer_proxy)
                .await,
            U256::MAX
        );

        let filled = read_uint(
            &f.ledger,
            protocol().exchange,
            &ContractCall::Filled {
                order_hash: signed.order_hash(),
            },
        )
        .await
        .unwrap();
        assert_eq!(filled, U256::from(150u64));

        // over-sized request is clipped to the remainder
        let receipt = fill(&f, &signed, 1_000).await;
        match events(&receipt).as_slice() {
            [ExchangeEvent::Fill(event)] => {
                assert_eq!(event.filled_taker_token_amount, U256::from(150u64))
            }
            other => panic!("unexpected events {:?}", other),
        }

        let receipt = fill(&f, &signed, 1).await;
        assert!(receipt.succeeded());
        assert_eq!(
            events(&receipt),
            vec![ExchangeEvent::Error {
                error_id: 1,
                order_hash: signed.order_hash()
            }]
        );
    }

    #[tokio::test]
    async fn test_missing_allowance_reverts() {
        let f = fixture().await;
        approve(&f, f.maker_token, f.maker).await;
        let signed = signed_order(&f).await;

        let receipt = fill(&f, &signed, 30).await;
        assert!(!receipt.succeeded());
        assert_eq!(f.ledger.balance_of(f.maker_token, f.maker).await, U256::from(1_000u64));
    }

    #[tokio::test]
    async fn test_expired_order_logs_error() {
        let f = fixture().await;
        approve(&f, f.maker_token, f.maker).await;
        approve(&f, f.taker_token, f.taker).await;
        let signed = signed_order(&f).await;

        f.ledger.set_timestamp(NOW + 60).await;
        let receipt = fill(&f, &signed, 30).await;
        assert!(receipt.succeeded());
        assert!(matches!(
            events(&receipt).as_slice(),
            [ExchangeEvent::Error { error_id: 0, .. }]
        ));
    }

    #[tokio::test]
    async fn test_tampered_order_reverts() {
        let f = fixture().await;
        approve(&f, f.maker_token, f.maker).await;
        approve(&f, f.taker_token, f.taker).await;
        let signed = signed_order(&f).await;

        let mut order = signed.order().clone();
        order.maker_token_amount = U256::from(999u64);
        let call = ContractCall::FillOrder {
            order,
            fill_taker_token_amount: U256::from(30u64),
            should_throw_on_insufficient_balance_or_allowance: true,
            signature: *signed.signature(),
        };
        let tx_hash = f
            .ledger
            .send_transaction(TransactionRequest::call(f.taker, protocol().exchange, &call))
            .await
            .unwrap();
        let receipt = f.ledger.transaction_receipt(tx_hash).await.unwrap().unwrap();
        assert!(!receipt.succeeded());
    }

    #[tokio::test]
    async fn test_cancel_then_fill() {
        let f = fixture().await;
        approve(&f, f.maker_token, f.maker).await;
        approve(&f, f.taker_token, f.taker).await;
        let signed = signed_order(&f).await;

        let call = ContractCall::CancelOrder {
            order: signed.order().clone(),
            cancel_taker_token_amount: U256::from(300u64),
        };
        let tx_hash = f
            .ledger
            .send_transaction(TransactionRequest::call(f.maker, protocol().exchange, &call))
            .await
            .unwrap();
        let receipt = f.ledger.transaction_receipt(tx_hash).await.unwrap().unwrap();
        assert!(matches!(events(&receipt).as_slice(), [ExchangeEvent::Cancel(_)]));

        let receipt = fill(&f, &signed, 30).await;
        assert!(matches!(
            events(&receipt).as_slice(),
            [ExchangeEvent::Error { error_id: 1, .. }]
        ));
    }

    #[tokio::test]
    async fn test_deposit_wraps_native_balance() {
        let f = fixture().await;
        f.ledger.fund_native(f.taker, U256::from(50u64)).await;

        let request = TransactionRequest::call(f.taker, protocol().ether_token, &ContractCall::Deposit)
            .with_value(U256::from(20u64));
        let tx_hash = f.ledger.send_transaction(request).await.unwrap();
        assert!(f.ledger.transaction_receipt(tx_hash).await.unwrap().unwrap().succeeded());

        assert_eq!(f.ledger.native_balance(f.taker).await, U256::from(30u64));
        assert_eq!(
            f.ledger.balance_of(protocol().ether_token, f.taker).await,
            U256::from(20u64)
        );
    }

    #[tokio::test]
    async fn test_mining_modes() {
        let f = fixture().await;
        f.ledger.set_mining(MiningMode::AfterPolls(2)).await;
        let request = TransactionRequest::call(
            f.maker,
            f.maker_token,
            &ContractCall::Approve {
                spender: protocol().token_transfer_proxy,
                amount: U256::from(1u8),
            },
        );
        let tx_hash = f.ledger.send_transaction(request.clone()).await.unwrap();
        assert!(f.ledger.transaction_receipt(tx_hash).await.unwrap().is_none());
        assert!(f.ledger.transaction_receipt(tx_hash).await.unwrap().is_none());
        assert!(f.ledger.transaction_receipt(tx_hash).await.unwrap().is_some());

        f.ledger.set_mining(MiningMode::Never).await;
        let tx_hash = f.ledger.send_transaction(request).await.unwrap();
        for _ in 0..5 {
            assert!(f.ledger.transaction_receipt(tx_hash).await.unwrap().is_none());
        }
        assert_eq!(f.ledger.transaction_count().await, 2);
    }

    #[tokio::test]
    async fn test_refuse_reverting_and_unknown_sender() {
        let f = fixture().await;
        f.ledger.set_refuse_reverting(true).await;
        let signed = signed_order(&f).await;

        let call = ContractCall::FillOrder {
            order: signed.order().clone(),
            fill_taker_token_amount: U256::from(30u64),
            should_throw_on_insufficient_balance_or_allowance: true,
            signature: *signed.signature(),
        };
        let result = f
            .ledger
            .send_transaction(TransactionRequest::call(f.taker, protocol().exchange, &call))
            .await;
        assert!(matches!(result, Err(Error::Rpc { .. })));
        assert_eq!(f.ledger.transaction_count().await, 0);

        let stranger = TransactionRequest::call(Address::repeat_byte(0x55), f.maker_token, &call);
        assert!(f.ledger.send_transaction(stranger).await.is_err());
    }
}

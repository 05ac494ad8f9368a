//! Ledger provider abstraction.
//!
//! Everything the engine needs from a chain node: account listing, read-only
//! calls, transaction submission and receipt lookup. [`JsonRpcLedger`] talks to
//! a node over HTTP; [`MemoryLedger`] is an in-process development chain.

pub mod memory;
pub mod rpc;

use alloy_primitives::{Address, Bytes, TxHash, B256, U256, U64};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::contracts::{decode_uint, ContractCall};
use crate::Result;

pub use memory::{MemoryLedger, MiningMode};
pub use rpc::JsonRpcLedger;

/// A transaction to submit from one of the ledger's accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<U64>,
}

impl TransactionRequest {
    /// Contract call with no value attached.
    pub fn call(from: Address, to: Address, call: &ContractCall) -> Self {
        Self {
            from,
            to,
            value: U256::ZERO,
            data: call.encode(),
            gas: None,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn with_gas(mut self, gas: Option<u64>) -> Self {
        self.gas = gas.map(U64::from);
        self
    }
}

/// Event log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
}

/// Receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: TxHash,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub gas_used: U256,
    /// `1` success, `0` revert. Absent on pre-Byzantium chains.
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub logs: Vec<Log>,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        self.status.map_or(true, |status| status == U64::from(1))
    }

    pub fn block(&self) -> Option<u64> {
        self.block_number.map(|n| n.to::<u64>())
    }
}

/// Chain node the engine reads from and submits to.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Accounts the node (or the local keyring behind it) can send from.
    async fn accounts(&self) -> Result<Vec<Address>>;

    /// Execute a read-only call against the latest state.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;

    /// Submit a transaction and return its hash without waiting for it.
    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash>;

    /// Receipt of a transaction, `None` while it is pending.
    async fn transaction_receipt(&self, tx_hash: TxHash) -> Result<Option<TransactionReceipt>>;
}

/// Run a view call that returns a single `uint256`.
pub async fn read_uint(ledger: &dyn Ledger, to: Address, call: &ContractCall) -> Result<U256> {
    let output = ledger.call(to, call.encode()).await?;
    decode_uint(&output)
}

//! JSON-RPC ledger client.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSignerSync;
use alloy_primitives::{Address, Bytes, TxHash, TxKind, B256, U256, U64};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Ledger, TransactionReceipt, TransactionRequest};
use crate::signing::{EcSignature, LocalKeyring, SigningBackend};
use crate::{Error, Result};

/// EIP-1193 "user rejected request".
const USER_REJECTED_CODE: i64 = 4001;

/// Ledger backed by a node's JSON-RPC endpoint.
///
/// Transactions from node-managed accounts go through `eth_sendTransaction`.
/// When a local key is registered for the sender the transaction is signed
/// here as a legacy transaction and sent with `eth_sendRawTransaction`.
pub struct JsonRpcLedger {
    rpc_url: String,
    http_client: reqwest::Client,
    keyring: LocalKeyring,
    chain_id: Option<u64>,
    next_id: AtomicU64,
}

impl JsonRpcLedger {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            http_client: reqwest::Client::new(),
            keyring: LocalKeyring::default(),
            chain_id: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// Sign transactions and payloads for the keyring's addresses locally.
    pub fn with_keyring(mut self, keyring: LocalKeyring) -> Self {
        self.keyring = keyring;
        self
    }

    /// Chain id for locally signed transactions; queried from the node when unset.
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    pub async fn block_number(&self) -> Result<u64> {
        let block: U64 = self.rpc_call("eth_blockNumber", serde_json::json!([])).await?;
        Ok(block.to::<u64>())
    }

    pub async fn chain_id(&self) -> Result<u64> {
        if let Some(chain_id) = self.chain_id {
            return Ok(chain_id);
        }
        let chain_id: U64 = self.rpc_call("eth_chainId", serde_json::json!([])).await?;
        Ok(chain_id.to::<u64>())
    }

    async fn rpc_call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Rpc {
                message: format!("{} request failed: {}", method, response.status()),
                code: None,
            });
        }

        let body: JsonRpcResponse = response.json().await?;
        if let Some(error) = body.error {
            debug!(method, code = error.code, message = %error.message, "RPC error");
            return Err(Error::Rpc {
                message: error.message,
                code: Some(error.code),
            });
        }

        Ok(serde_json::from_value(
            body.result.unwrap_or(serde_json::Value::Null),
        )?)
    }

    async fn send_signed_locally(&self, request: TransactionRequest) -> Result<TxHash> {
        let Some(key) = self.keyring.signer(&request.from) else {
            return Err(Error::SigningUnavailable {
                signer: request.from,
                message: "address is not held by the local keyring".to_string(),
            });
        };

        let from = format!("{:#x}", request.from);
        let nonce: U64 = self
            .rpc_call(
                "eth_getTransactionCount",
                serde_json::json!([from, "pending"]),
            )
            .await?;
        let gas_price: U256 = self.rpc_call("eth_gasPrice", serde_json::json!([])).await?;
        let gas_limit = match request.gas {
            Some(gas) => gas,
            None => self.rpc_call("eth_estimateGas", serde_json::json!([request])).await?,
        };

        let mut tx = TxLegacy {
            chain_id: Some(self.chain_id().await?),
            nonce: nonce.to::<u64>(),
            gas_price: gas_price.saturating_to::<u128>(),
            gas_limit: gas_limit.to::<u64>(),
            to: TxKind::Call(request.to),
            value: request.value,
            input: request.data,
        };

        let signature = key
            .sign_transaction_sync(&mut tx)
            .map_err(|e| Error::SigningUnavailable {
                signer: request.from,
                message: e.to_string(),
            })?;
        let envelope = TxEnvelope::from(tx.into_signed(signature));
        let raw = Bytes::from(envelope.encoded_2718());

        self.rpc_call("eth_sendRawTransaction", serde_json::json!([raw]))
            .await
    }
}

#[async_trait]
impl Ledger for JsonRpcLedger {
    async fn accounts(&self) -> Result<Vec<Address>> {
        let mut accounts: Vec<Address> = self.rpc_call("eth_accounts", serde_json::json!([])).await?;
        for address in self.keyring.addresses() {
            if !accounts.contains(&address) {
                accounts.push(address);
            }
        }
        Ok(accounts)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        self.rpc_call(
            "eth_call",
            serde_json::json!([{ "to": to, "data": data }, "latest"]),
        )
        .await
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash> {
        let from = request.from;
        let to = request.to;

        let tx_hash = if self.keyring.signer(&from).is_some() {
            self.send_signed_locally(request).await?
        } else {
            self.rpc_call("eth_sendTransaction", serde_json::json!([request]))
                .await?
        };

        info!(tx_hash = %tx_hash, from = %from, to = %to, "Transaction submitted");
        Ok(tx_hash)
    }

    async fn transaction_receipt(&self, tx_hash: TxHash) -> Result<Option<TransactionReceipt>> {
        self.rpc_call("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
            .await
    }
}

#[async_trait]
impl SigningBackend for JsonRpcLedger {
    async fn sign_payload(&self, signer: Address, payload: B256) -> Result<EcSignature> {
        if self.keyring.signer(&signer).is_some() {
            return self.keyring.sign_payload(signer, payload).await;
        }

        let result: Result<String> = self
            .rpc_call("eth_sign", serde_json::json!([signer, payload]))
            .await;

        match result {
            Ok(signature) => EcSignature::from_hex(&signature),
            Err(Error::Rpc { message, code }) => {
                warn!(signer = %signer, code = ?code, message = %message, "eth_sign failed");
                Err(classify_sign_error(signer, message, code))
            }
            Err(e) => Err(e),
        }
    }
}

fn classify_sign_error(signer: Address, message: String, code: Option<i64>) -> Error {
    let lower = message.to_lowercase();
    if code == Some(USER_REJECTED_CODE) || lower.contains("denied") || lower.contains("rejected") {
        Error::SigningRejected { signer, message }
    } else {
        Error::SigningUnavailable { signer, message }
    }
}

impl std::fmt::Debug for JsonRpcLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcLedger")
            .field("rpc_url", &self.rpc_url)
            .field("keyring", &self.keyring)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'a str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

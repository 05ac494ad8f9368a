//! Development-chain fixture shared by the unit tests.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use zeroex_core::config::EngineConfig;
use zeroex_core::contracts::{ContractCall, MAX_UINT256};
use zeroex_core::ledger::{Ledger, MemoryLedger, TransactionReceipt, TransactionRequest};
use zeroex_core::Result;
use zeroex_core::order::{OrderBuilder, OrderRecord, SignedOrder};
use zeroex_core::registry::{ProtocolAddresses, TokenRegistry};
use zeroex_core::signing::{LocalKeyring, SigningBackend};

use crate::waiter::TransactionWaiter;

pub const MAKER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const TAKER_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

mockall::mock! {
    pub Node {}

    #[async_trait]
    impl Ledger for Node {
        async fn accounts(&self) -> Result<Vec<Address>>;
        async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;
        async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash>;
        async fn transaction_receipt(&self, tx_hash: TxHash) -> Result<Option<TransactionReceipt>>;
    }
}

pub struct DevChain {
    pub memory: MemoryLedger,
    pub ledger: Arc<dyn Ledger>,
    pub keyring: Arc<LocalKeyring>,
    pub protocol: ProtocolAddresses,
    pub registry: Arc<TokenRegistry>,
    pub maker: Address,
    pub taker: Address,
}

pub fn ether(amount: u64) -> U256 {
    U256::from(amount) * U256::from(10u64).pow(U256::from(18u8))
}

pub async fn dev_chain() -> DevChain {
    let protocol = ProtocolAddresses {
        exchange: Address::repeat_byte(0xe1),
        token_transfer_proxy: Address::repeat_byte(0xe2),
        ether_token: Address::repeat_byte(0xe3),
        zrx_token: Address::repeat_byte(0xe4),
    };
    let mut keyring = LocalKeyring::default();
    let maker = keyring.add_private_key(MAKER_KEY).unwrap();
    let taker = keyring.add_private_key(TAKER_KEY).unwrap();

    let memory = MemoryLedger::new(protocol, vec![maker, taker]);
    memory.mint(protocol.zrx_token, maker, ether(1_000)).await;
    memory.mint(protocol.ether_token, taker, ether(1_000)).await;
    memory.fund_native(taker, ether(10)).await;

    DevChain {
        ledger: Arc::new(memory.clone()),
        memory,
        keyring: Arc::new(keyring),
        protocol,
        registry: Arc::new(TokenRegistry::new(&protocol, &[]).unwrap()),
        maker,
        taker,
    }
}

impl DevChain {
    pub fn zrx(&self) -> Address {
        self.protocol.zrx_token
    }

    pub fn weth(&self) -> Address {
        self.protocol.ether_token
    }

    pub fn config(&self) -> EngineConfig {
        EngineConfig {
            poll_interval_ms: 5,
            confirmation_timeout_secs: Some(5),
            ..EngineConfig::default()
        }
    }

    pub fn waiter(&self) -> TransactionWaiter {
        TransactionWaiter::from_config(self.ledger.clone(), &self.config())
    }

    /// Maker sells ZRX for WETH.
    pub async fn signed_order(&self, maker_amount: U256, taker_amount: U256) -> SignedOrder {
        let order = OrderBuilder::new(self.protocol.exchange)
            .maker(self.maker)
            .maker_asset(self.zrx(), maker_amount)
            .taker_asset(self.weth(), taker_amount)
            .expires_in(3600)
            .build()
            .unwrap();
        self.sign(order).await
    }

    pub async fn sign(&self, order: OrderRecord) -> SignedOrder {
        let signature = self
            .keyring
            .sign_payload(order.maker, order.hash())
            .await
            .unwrap();
        SignedOrder::new(order, signature).unwrap()
    }

    pub async fn approve_unlimited(&self, token: Address, owner: Address) {
        let request = TransactionRequest::call(
            owner,
            token,
            &ContractCall::Approve {
                spender: self.protocol.token_transfer_proxy,
                amount: MAX_UINT256,
            },
        );
        self.ledger.send_transaction(request).await.unwrap();
    }

    pub async fn approve_both(&self) {
        self.approve_unlimited(self.zrx(), self.maker).await;
        self.approve_unlimited(self.weth(), self.taker).await;
    }
}

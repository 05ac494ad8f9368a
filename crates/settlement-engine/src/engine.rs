//! Order lifecycle facade.
//!
//! Wires the signer, allowance manager, validator, executor and wrapper over
//! one injected ledger and registry. Holds no mutable state of its own.

use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use rust_decimal::Decimal;
use tracing::info;
use zeroex_core::amount::{from_base_units, to_base_units};
use zeroex_core::config::{Config, EngineConfig};
use zeroex_core::ledger::{Ledger, TransactionReceipt};
use zeroex_core::order::{generate_salt, OrderBuilder, OrderRecord, SignedOrder};
use zeroex_core::registry::{ProtocolAddresses, TokenRegistry};
use zeroex_core::signing::{OrderSigner, SigningBackend};
use zeroex_core::Result;

use crate::allowance::{AllowanceManager, AllowanceReport};
use crate::executor::{CancelResult, ExecutionMetrics, FillExecutor, FillResult};
use crate::validator::{FillValidator, OrderState};
use crate::waiter::TransactionWaiter;
use crate::wrapper::WrappedAssetConverter;

/// Client-side order lifecycle engine.
pub struct TradeEngine {
    ledger: Arc<dyn Ledger>,
    registry: Arc<TokenRegistry>,
    protocol: ProtocolAddresses,
    config: EngineConfig,
    signer: OrderSigner,
    allowances: AllowanceManager,
    validator: FillValidator,
    executor: FillExecutor,
    wrapper: WrappedAssetConverter,
}

impl TradeEngine {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        signing: Arc<dyn SigningBackend>,
        registry: Arc<TokenRegistry>,
        protocol: ProtocolAddresses,
        config: EngineConfig,
    ) -> Self {
        let waiter = TransactionWaiter::from_config(ledger.clone(), &config);
        let allowances = AllowanceManager::new(
            ledger.clone(),
            waiter.clone(),
            protocol.token_transfer_proxy,
            &config,
        );
        let validator = FillValidator::new(ledger.clone(), allowances.clone(), protocol.exchange);
        let executor = FillExecutor::new(
            ledger.clone(),
            validator.clone(),
            waiter.clone(),
            protocol.exchange,
            &config,
        );
        let wrapper =
            WrappedAssetConverter::new(ledger.clone(), waiter, protocol.ether_token, config.gas_limit);

        Self {
            signer: OrderSigner::new(signing, config.add_personal_message_prefix),
            ledger,
            registry,
            protocol,
            config,
            allowances,
            validator,
            executor,
            wrapper,
        }
    }

    /// Build an engine from loaded configuration.
    pub fn from_config(
        config: &Config,
        ledger: Arc<dyn Ledger>,
        signing: Arc<dyn SigningBackend>,
    ) -> Result<Self> {
        config.protocol.validate()?;
        let registry = Arc::new(TokenRegistry::from_config(config)?);
        Ok(Self::new(
            ledger,
            signing,
            registry,
            config.protocol,
            config.engine.clone(),
        ))
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    pub fn protocol(&self) -> &ProtocolAddresses {
        &self.protocol
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> ExecutionMetrics {
        self.executor.metrics()
    }

    /// Accounts available on the ledger.
    pub async fn available_addresses(&self) -> Result<Vec<Address>> {
        self.ledger.accounts().await
    }

    /// Create an unsigned order selling `maker_amount` of `maker_symbol` for
    /// `taker_amount` of `taker_symbol`. `taker: None` lets anyone fill it.
    pub fn create_order(
        &self,
        maker: Address,
        taker: Option<Address>,
        maker_symbol: &str,
        taker_symbol: &str,
        maker_amount: Decimal,
        taker_amount: Decimal,
    ) -> Result<(B256, OrderRecord)> {
        let maker_token = self.registry.resolve(maker_symbol)?;
        let taker_token = self.registry.resolve(taker_symbol)?;

        let order = OrderBuilder::new(self.protocol.exchange)
            .maker(maker)
            .taker(taker.unwrap_or(Address::ZERO))
            .fee_recipient(Address::ZERO)
            .maker_asset(
                maker_token.address,
                to_base_units(maker_amount, maker_token.decimals)?,
            )
            .taker_asset(
                taker_token.address,
                to_base_units(taker_amount, taker_token.decimals)?,
            )
            .fees(U256::ZERO, U256::ZERO)
            .salt(generate_salt())
            .expires_in(self.config.order_ttl_secs)
            .build()?;

        let order_hash = order.hash();
        info!(
            order_hash = %order_hash,
            maker = %maker,
            maker_token = %maker_token.symbol,
            taker_token = %taker_token.symbol,
            maker_amount = %maker_amount,
            taker_amount = %taker_amount,
            "Created order"
        );

        Ok((order_hash, order))
    }

    pub async fn sign_order(
        &self,
        order_hash: B256,
        maker: Address,
        order: OrderRecord,
    ) -> Result<SignedOrder> {
        self.signer.sign_order(order_hash, maker, order).await
    }

    pub async fn ensure_allowances(
        &self,
        signed: &SignedOrder,
        taker: Address,
    ) -> Result<AllowanceReport> {
        self.allowances.ensure_allowances(signed, taker).await
    }

    /// Fill `amount` of the taker token, in whole-token units.
    pub async fn fill_order(
        &self,
        signed: &SignedOrder,
        taker: Address,
        amount: Decimal,
    ) -> Result<FillResult> {
        let decimals = self
            .registry
            .decimals_of(signed.order().taker_token_address)?;
        let fill_amount = to_base_units(amount, decimals)?;
        self.executor.fill(signed, taker, fill_amount).await
    }

    pub async fn fill_order_base_units(
        &self,
        signed: &SignedOrder,
        taker: Address,
        fill_amount: U256,
    ) -> Result<FillResult> {
        self.executor.fill(signed, taker, fill_amount).await
    }

    pub async fn order_state(&self, signed: &SignedOrder) -> Result<OrderState> {
        self.validator.order_state(signed).await
    }

    /// Remaining taker-token amount in base units.
    pub async fn remaining_fillable(&self, signed: &SignedOrder) -> Result<U256> {
        self.validator.remaining_fillable(signed).await
    }

    /// Remaining taker-token amount in whole-token units.
    pub async fn remaining_fillable_decimal(&self, signed: &SignedOrder) -> Result<Decimal> {
        let decimals = self
            .registry
            .decimals_of(signed.order().taker_token_address)?;
        from_base_units(self.remaining_fillable(signed).await?, decimals)
    }

    /// Cancel `cancel_amount` taker-token base units of the maker's order.
    pub async fn cancel_order(
        &self,
        signed: &SignedOrder,
        cancel_amount: U256,
    ) -> Result<CancelResult> {
        self.executor.cancel(signed, cancel_amount).await
    }

    pub async fn convert_to_wrapped_asset(
        &self,
        amount: Decimal,
        destination: Address,
    ) -> Result<TransactionReceipt> {
        self.wrapper.convert_to_wrapped_asset(amount, destination).await
    }
}

impl std::fmt::Debug for TradeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeEngine")
            .field("protocol", &self.protocol)
            .field("config", &self.config)
            .field("tokens", &self.registry.len())
            .finish()
    }
}

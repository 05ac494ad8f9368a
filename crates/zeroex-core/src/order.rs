//! Order records for the 0x v1 exchange.
//!
//! An [`OrderRecord`] is the maker's trade intent. Once hashed and signed it
//! becomes a [`SignedOrder`], whose fields are frozen: the only ways to
//! obtain one are signing (see [`crate::signing::OrderSigner`]) or validated
//! deserialization, and both verify the signature against the record.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::hashing::order_hash;
use crate::signing::{verify_signature, EcSignature};
use crate::{Error, Result};

/// Raw order data as hashed by the exchange contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    /// Maker address (signs the order).
    pub maker: Address,
    /// Taker address (zero for any taker).
    pub taker: Address,
    /// Fee recipient (zero for no fee).
    pub fee_recipient: Address,
    pub maker_token_address: Address,
    pub taker_token_address: Address,
    /// Exchange deployment this order is valid for.
    pub exchange_contract_address: Address,
    /// Random salt for uniqueness.
    #[serde(with = "decimal_u256")]
    pub salt: U256,
    #[serde(with = "decimal_u256")]
    pub maker_fee: U256,
    #[serde(with = "decimal_u256")]
    pub taker_fee: U256,
    /// Maker amount in base units.
    #[serde(with = "decimal_u256")]
    pub maker_token_amount: U256,
    /// Taker amount in base units.
    #[serde(with = "decimal_u256")]
    pub taker_token_amount: U256,
    /// Expiration timestamp (unix seconds); invalid at or after this time.
    #[serde(with = "decimal_u256")]
    pub expiration_unix_timestamp_sec: U256,
}

impl OrderRecord {
    /// Check the record invariants.
    pub fn validate(&self) -> Result<()> {
        if self.maker == Address::ZERO {
            return Err(Error::invalid_order("maker must not be the zero address"));
        }
        if self.exchange_contract_address == Address::ZERO {
            return Err(Error::invalid_order(
                "exchange contract address must not be zero",
            ));
        }
        if self.maker_token_amount.is_zero() {
            return Err(Error::invalid_order("maker token amount must be positive"));
        }
        if self.taker_token_amount.is_zero() {
            return Err(Error::invalid_order("taker token amount must be positive"));
        }
        Ok(())
    }

    /// Compute the canonical order hash.
    pub fn hash(&self) -> B256 {
        order_hash(self)
    }

    /// True when any taker may fill this order.
    pub fn is_open_to_any_taker(&self) -> bool {
        self.taker == Address::ZERO
    }

    /// Expiration as unix seconds, saturating at `u64::MAX`.
    pub fn expiration_secs(&self) -> u64 {
        self.expiration_unix_timestamp_sec.saturating_to::<u64>()
    }
}

/// Generate a uniformly random 256-bit salt.
pub fn generate_salt() -> U256 {
    U256::from_be_bytes(rand::random::<[u8; 32]>())
}

/// Order builder for creating orders with a fluent API.
#[derive(Debug, Clone)]
pub struct OrderBuilder {
    exchange: Address,
    maker: Option<Address>,
    taker: Address,
    fee_recipient: Address,
    maker_token: Option<Address>,
    taker_token: Option<Address>,
    maker_amount: Option<U256>,
    taker_amount: Option<U256>,
    maker_fee: U256,
    taker_fee: U256,
    expiration_secs: Option<u64>,
    salt: Option<U256>,
}

impl OrderBuilder {
    /// Create a new order builder bound to an exchange deployment.
    pub fn new(exchange: Address) -> Self {
        Self {
            exchange,
            maker: None,
            taker: Address::ZERO,
            fee_recipient: Address::ZERO,
            maker_token: None,
            taker_token: None,
            maker_amount: None,
            taker_amount: None,
            maker_fee: U256::ZERO,
            taker_fee: U256::ZERO,
            expiration_secs: None,
            salt: None,
        }
    }

    /// Set the maker, who signs the order and gives the maker token.
    pub fn maker(mut self, maker: Address) -> Self {
        self.maker = Some(maker);
        self
    }

    /// Restrict the order to one taker. Unset means any taker.
    pub fn taker(mut self, taker: Address) -> Self {
        self.taker = taker;
        self
    }

    /// Set the relayer that receives fees. Zero means no fees are paid.
    pub fn fee_recipient(mut self, fee_recipient: Address) -> Self {
        self.fee_recipient = fee_recipient;
        self
    }

    /// Token and base-unit amount the maker gives.
    pub fn maker_asset(mut self, token: Address, amount: U256) -> Self {
        self.maker_token = Some(token);
        self.maker_amount = Some(amount);
        self
    }

    /// Token and base-unit amount the maker receives.
    pub fn taker_asset(mut self, token: Address, amount: U256) -> Self {
        self.taker_token = Some(token);
        self.taker_amount = Some(amount);
        self
    }

    /// Set the ZRX fees, in base units, paid by maker and taker.
    pub fn fees(mut self, maker_fee: U256, taker_fee: U256) -> Self {
        self.maker_fee = maker_fee;
        self.taker_fee = taker_fee;
        self
    }

    /// Set expiration in seconds from now.
    pub fn expires_in(mut self, seconds: u64) -> Self {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.expiration_secs = Some(now.saturating_add(seconds));
        self
    }

    /// Set absolute expiration timestamp.
    pub fn expires_at(mut self, timestamp: u64) -> Self {
        self.expiration_secs = Some(timestamp);
        self
    }

    /// Use a fixed salt instead of a random one.
    pub fn salt(mut self, salt: U256) -> Self {
        self.salt = Some(salt);
        self
    }

    /// Build and validate the order record.
    pub fn build(self) -> Result<OrderRecord> {
        let missing = |field: &str| Error::invalid_order(format!("{} is required", field));

        let order = OrderRecord {
            maker: self.maker.ok_or_else(|| missing("maker"))?,
            taker: self.taker,
            fee_recipient: self.fee_recipient,
            maker_token_address: self.maker_token.ok_or_else(|| missing("maker token"))?,
            taker_token_address: self.taker_token.ok_or_else(|| missing("taker token"))?,
            exchange_contract_address: self.exchange,
            salt: self.salt.unwrap_or_else(generate_salt),
            maker_fee: self.maker_fee,
            taker_fee: self.taker_fee,
            maker_token_amount: self.maker_amount.ok_or_else(|| missing("maker amount"))?,
            taker_token_amount: self.taker_amount.ok_or_else(|| missing("taker amount"))?,
            expiration_unix_timestamp_sec: U256::from(
                self.expiration_secs.ok_or_else(|| missing("expiration"))?,
            ),
        };
        order.validate()?;
        Ok(order)
    }
}

/// An order together with the maker's signature over its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SignedOrderRecord", into = "SignedOrderRecord")]
pub struct SignedOrder {
    order: OrderRecord,
    ec_signature: EcSignature,
    order_hash: B256,
}

/// Plain wire shape of a signed order, as exchanged with counterparties.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrderRecord {
    #[serde(flatten)]
    pub order: OrderRecord,
    pub ec_signature: EcSignature,
}

impl SignedOrder {
    /// Pair a record with its signature, checking invariants and that the
    /// signature recovers the maker.
    pub fn new(order: OrderRecord, ec_signature: EcSignature) -> Result<Self> {
        order.validate()?;
        let order_hash = order.hash();
        verify_signature(order_hash, &ec_signature, order.maker)?;
        Ok(Self {
            order,
            ec_signature,
            order_hash,
        })
    }

    /// Parse and validate a signed order from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self> {
        let record: SignedOrderRecord = serde_json::from_str(json)?;
        Self::try_from(record)
    }

    /// Serialize to the JSON wire form handed to a taker.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&SignedOrderRecord::from(self.clone()))?)
    }

    /// The signed order record.
    pub fn order(&self) -> &OrderRecord {
        &self.order
    }

    /// The maker's signature over the order hash.
    pub fn signature(&self) -> &EcSignature {
        &self.ec_signature
    }

    /// Order hash computed when the order was verified.
    pub fn order_hash(&self) -> B256 {
        self.order_hash
    }

    /// Address that signed the order.
    pub fn maker(&self) -> Address {
        self.order.maker
    }

    /// Re-check that the signature still matches the record.
    pub fn verify(&self) -> Result<B256> {
        let hash = self.order.hash();
        if hash != self.order_hash {
            return Err(Error::SignatureMismatch {
                order_hash: hash,
                maker: self.order.maker,
            });
        }
        verify_signature(hash, &self.ec_signature, self.order.maker)?;
        Ok(hash)
    }

    /// Unfreeze the record, e.g. to derive a new order from it.
    pub fn into_parts(self) -> (OrderRecord, EcSignature) {
        (self.order, self.ec_signature)
    }
}

impl TryFrom<SignedOrderRecord> for SignedOrder {
    type Error = Error;

    fn try_from(record: SignedOrderRecord) -> Result<Self> {
        SignedOrder::new(record.order, record.ec_signature)
    }
}

impl From<SignedOrder> for SignedOrderRecord {
    fn from(signed: SignedOrder) -> Self {
        Self {
            order: signed.order,
            ec_signature: signed.ec_signature,
        }
    }
}

/// Serde adapter for 256-bit integers encoded as base-10 strings.
pub mod decimal_u256 {
    use alloy_primitives::U256;
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        struct DecimalVisitor;

        impl Visitor<'_> for DecimalVisitor {
            type Value = U256;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a non-negative integer as a base-10 string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<U256, E> {
                U256::from_str_radix(v.trim(), 10)
                    .map_err(|e| E::custom(format!("invalid integer {:?}: {}", v, e)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<U256, E> {
                Ok(U256::from(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<U256, E> {
                u64::try_from(v)
                    .map(U256::from)
                    .map_err(|_| E::custom(format!("negative integer {}", v)))
            }
        }

        deserializer.deserialize_any(DecimalVisitor)
    }
}

//! Signing module for exchange orders.
//!
//! # Architecture
//!
//! ```text
//! OrderRecord ── order_hash ──► digest
//!                                 │
//!                                 ▼
//!                  OrderSigner (prefix policy)
//!                                 │
//!                                 ▼
//!               SigningBackend (LocalKeyring / node eth_sign)
//!                                 │
//!                                 ▼
//!                  EcSignature ──► SignedOrder (verified)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use zeroex_core::signing::{LocalKeyring, OrderSigner};
//!
//! let keyring = LocalKeyring::from_private_keys(["0x..."])?;
//! let signer = OrderSigner::new(Arc::new(keyring), false);
//! let signed = signer.sign_order(order.hash(), order.maker, order).await?;
//! ```

pub mod backend;
pub mod signature;
pub mod signer;

pub use backend::{LocalKeyring, SignMode, SigningBackend};
pub use signature::{personal_message_hash, verify_signature, EcSignature};
pub use signer::OrderSigner;

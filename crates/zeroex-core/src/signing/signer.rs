//! Order signing.
//!
//! Decides whether the personal-message prefix is applied before the digest
//! reaches the signing backend, and assembles the verified [`SignedOrder`].

use std::sync::Arc;

use alloy_primitives::{Address, B256};
use tracing::{debug, info};

use super::backend::SigningBackend;
use super::signature::{personal_message_hash, EcSignature};
use crate::order::{OrderRecord, SignedOrder};
use crate::{Error, Result};

/// Order signer.
#[derive(Clone)]
pub struct OrderSigner {
    backend: Arc<dyn SigningBackend>,
    add_personal_message_prefix: bool,
}

impl OrderSigner {
    /// Create a signer over `backend`.
    ///
    /// With `add_personal_message_prefix` set, the engine hashes the prefixed
    /// digest itself and the backend must sign it raw. Unset, the backend is
    /// expected to apply the prefix (node `eth_sign`).
    pub fn new(backend: Arc<dyn SigningBackend>, add_personal_message_prefix: bool) -> Self {
        Self {
            backend,
            add_personal_message_prefix,
        }
    }

    pub fn adds_personal_message_prefix(&self) -> bool {
        self.add_personal_message_prefix
    }

    /// Sign an order digest on behalf of `signer`.
    pub async fn sign(&self, digest: B256, signer: Address) -> Result<EcSignature> {
        let payload = if self.add_personal_message_prefix {
            personal_message_hash(digest)
        } else {
            digest
        };

        debug!(
            digest = %digest,
            signer = %signer,
            prefixed = self.add_personal_message_prefix,
            "Requesting signature"
        );

        self.backend.sign_payload(signer, payload).await
    }

    /// Sign an order and return the signed order ready for a counterparty.
    pub async fn sign_order(
        &self,
        digest: B256,
        maker: Address,
        order: OrderRecord,
    ) -> Result<SignedOrder> {
        order.validate()?;

        if digest != order.hash() {
            return Err(Error::InvalidOrder {
                message: format!("digest {} does not match the order record", digest),
            });
        }
        if maker != order.maker {
            return Err(Error::InvalidOrder {
                message: format!("signer {} is not the order maker {}", maker, order.maker),
            });
        }

        let signature = self.sign(digest, maker).await?;
        let signed = SignedOrder::new(order, signature)?;

        info!(order_hash = %digest, maker = %maker, v = signature.v, "Signed order");

        Ok(signed)
    }
}

impl std::fmt::Debug for OrderSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderSigner")
            .field(
                "add_personal_message_prefix",
                &self.add_personal_message_prefix,
            )
            .finish()
    }
}

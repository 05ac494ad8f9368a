//! ECDSA order signatures.
//!
//! The exchange verifies a maker signature with
//! `ecrecover(keccak256("\x19Ethereum Signed Message:\n32" ++ orderHash), v, r, s)`,
//! so signatures are always checked against the personal-message hash of the
//! order hash.

use alloy_primitives::{eip191_hash_message, Address, Signature, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Signature in the `{v, r, s}` form carried by signed orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EcSignature {
    /// Recovery id, 27 or 28.
    pub v: u8,
    pub r: B256,
    pub s: B256,
}

impl EcSignature {
    /// Parse a 65-byte `r ++ s ++ v` signature. A `v` of 0/1 is normalized to 27/28.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 65 {
            return Err(Error::abi(format!(
                "signature must be 65 bytes, got {}",
                bytes.len()
            )));
        }
        let v = match bytes[64] {
            0 | 1 => bytes[64] + 27,
            27 | 28 => bytes[64],
            other => return Err(Error::abi(format!("invalid recovery id {}", other))),
        };
        Ok(Self {
            v,
            r: B256::from_slice(&bytes[..32]),
            s: B256::from_slice(&bytes[32..64]),
        })
    }

    /// Parse a `0x`-prefixed hex signature as returned by `eth_sign`.
    pub fn from_hex(value: &str) -> Result<Self> {
        let bytes = hex::decode(value.trim_start_matches("0x"))
            .map_err(|e| Error::abi(format!("invalid signature hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(self.r.as_slice());
        out[32..64].copy_from_slice(self.s.as_slice());
        out[64] = self.v;
        out
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    /// Recover the address that signed `prehash`. Only `v` of 27 or 28 is
    /// accepted, as the exchange's `ecrecover` does.
    pub fn recover(&self, prehash: B256) -> Result<Address> {
        let y_parity = match self.v {
            27 => false,
            28 => true,
            other => return Err(Error::abi(format!("invalid recovery id {}", other))),
        };
        let signature = Signature::new(
            U256::from_be_bytes(self.r.0),
            U256::from_be_bytes(self.s.0),
            y_parity,
        );
        signature
            .recover_address_from_prehash(&prehash)
            .map_err(|e| Error::abi(format!("signature recovery failed: {}", e)))
    }
}

impl From<Signature> for EcSignature {
    fn from(signature: Signature) -> Self {
        Self {
            v: 27 + u8::from(signature.v()),
            r: B256::from(signature.r().to_be_bytes::<32>()),
            s: B256::from(signature.s().to_be_bytes::<32>()),
        }
    }
}

/// Personal-message hash of an order hash, as the exchange recomputes it.
pub fn personal_message_hash(order_hash: B256) -> B256 {
    eip191_hash_message(order_hash)
}

/// Check that `signature` over `order_hash` was produced by `maker`.
pub fn verify_signature(order_hash: B256, signature: &EcSignature, maker: Address) -> Result<()> {
    let mismatch = || Error::SignatureMismatch { order_hash, maker };
    let recovered = signature
        .recover(personal_message_hash(order_hash))
        .map_err(|_| mismatch())?;
    if recovered != maker {
        return Err(mismatch());
    }
    Ok(())
}

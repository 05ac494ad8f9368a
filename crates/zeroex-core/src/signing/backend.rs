//! Signing collaborators.
//!
//! A [`SigningBackend`] holds (or proxies) private keys. Backends follow
//! `eth_sign` semantics unless stated otherwise: they are handed a 32-byte
//! payload and are expected to sign its personal-message hash.

use std::collections::HashMap;
use std::str::FromStr;

use alloy_primitives::{Address, B256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use tracing::debug;

use super::signature::EcSignature;
use crate::{Error, Result};

/// Produces signatures for addresses it controls.
#[async_trait]
pub trait SigningBackend: Send + Sync {
    /// Sign `payload` on behalf of `signer`.
    ///
    /// Fails with `SigningUnavailable` when the address is not controlled by
    /// this backend and with `SigningRejected` when the key holder declines.
    async fn sign_payload(&self, signer: Address, payload: B256) -> Result<EcSignature>;
}

/// How a [`LocalKeyring`] treats the payload it is asked to sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignMode {
    /// Apply the personal-message prefix, like a node's `eth_sign`.
    #[default]
    EthSign,
    /// Sign the payload hash as given.
    Raw,
}

/// In-process private keys.
#[derive(Clone, Default)]
pub struct LocalKeyring {
    keys: HashMap<Address, PrivateKeySigner>,
    mode: SignMode,
}

impl LocalKeyring {
    pub fn new(mode: SignMode) -> Self {
        Self {
            keys: HashMap::new(),
            mode,
        }
    }

    /// Build an `eth_sign` keyring from hex private keys (optionally `0x`-prefixed).
    pub fn from_private_keys<'a>(keys: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut keyring = Self::new(SignMode::EthSign);
        for key in keys {
            keyring.add_private_key(key)?;
        }
        Ok(keyring)
    }

    pub fn with_mode(mut self, mode: SignMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add a hex private key and return its address.
    pub fn add_private_key(&mut self, key: &str) -> Result<Address> {
        let key_clean = key.trim().trim_start_matches("0x");
        let signer = PrivateKeySigner::from_str(key_clean).map_err(|_| Error::Config {
            message: "Invalid private key format - expected 64 hex characters".to_string(),
        })?;
        let address = signer.address();
        self.keys.insert(address, signer);
        Ok(address)
    }

    pub fn addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<_> = self.keys.keys().copied().collect();
        addresses.sort();
        addresses
    }

    /// Key for `address`, if held locally.
    pub fn signer(&self, address: &Address) -> Option<&PrivateKeySigner> {
        self.keys.get(address)
    }

    pub fn mode(&self) -> SignMode {
        self.mode
    }
}

#[async_trait]
impl SigningBackend for LocalKeyring {
    async fn sign_payload(&self, signer: Address, payload: B256) -> Result<EcSignature> {
        let key = self.keys.get(&signer).ok_or_else(|| Error::SigningUnavailable {
            signer,
            message: "address is not held by the local keyring".to_string(),
        })?;

        debug!(signer = %signer, mode = ?self.mode, "Signing payload locally");

        let signature = match self.mode {
            SignMode::EthSign => key.sign_message(payload.as_slice()).await,
            SignMode::Raw => key.sign_hash(&payload).await,
        }
        .map_err(|e| Error::SigningUnavailable {
            signer,
            message: e.to_string(),
        })?;

        Ok(signature.into())
    }
}

impl std::fmt::Debug for LocalKeyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose private keys in debug output
        f.debug_struct("LocalKeyring")
            .field("addresses", &self.addresses())
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::verify_signature;

    // Well-known development keys (DO NOT USE IN PRODUCTION)
    const TEST_PRIVATE_KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const SECOND_PRIVATE_KEY: &str =
        "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
    const SECOND_ADDRESS: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

    #[test]
    fn test_from_private_keys() {
        let keyring = LocalKeyring::from_private_keys([TEST_PRIVATE_KEY, SECOND_PRIVATE_KEY]).unwrap();
        let addresses = keyring.addresses();
        assert_eq!(addresses.len(), 2);
        assert!(addresses.contains(&TEST_ADDRESS.parse().unwrap()));
        assert!(addresses.contains(&SECOND_ADDRESS.parse().unwrap()));
    }

    #[test]
    fn test_invalid_private_key() {
        assert!(LocalKeyring::from_private_keys(["0x1234"]).is_err());
    }

    #[tokio::test]
    async fn test_unknown_address_is_unavailable() {
        let keyring = LocalKeyring::from_private_keys([TEST_PRIVATE_KEY]).unwrap();
        let result = keyring
            .sign_payload(SECOND_ADDRESS.parse().unwrap(), B256::ZERO)
            .await;
        assert!(matches!(result, Err(Error::SigningUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_eth_sign_mode_matches_exchange_verification() {
        let keyring = LocalKeyring::from_private_keys([TEST_PRIVATE_KEY]).unwrap();
        let maker: Address = TEST_ADDRESS.parse().unwrap();
        let hash = B256::repeat_byte(0x33);

        let signature = keyring.sign_payload(maker, hash).await.unwrap();
        assert!(verify_signature(hash, &signature, maker).is_ok());
    }

    #[tokio::test]
    async fn test_raw_mode_does_not_prefix() {
        let keyring = LocalKeyring::from_private_keys([TEST_PRIVATE_KEY])
            .unwrap()
            .with_mode(SignMode::Raw);
        let maker: Address = TEST_ADDRESS.parse().unwrap();
        let hash = B256::repeat_byte(0x33);

        let signature = keyring.sign_payload(maker, hash).await.unwrap();
        assert_eq!(signature.recover(hash).unwrap(), maker);
        assert!(verify_signature(hash, &signature, maker).is_err());
    }

    #[test]
    fn test_debug_does_not_expose_key() {
        let keyring = LocalKeyring::from_private_keys([TEST_PRIVATE_KEY]).unwrap();
        let debug_str = format!("{:?}", keyring);
        assert!(debug_str.contains("LocalKeyring"));
        assert!(!debug_str.contains(TEST_PRIVATE_KEY.trim_start_matches("0x")));
    }
}

//! Protocol contract addresses and the token registry.
//!
//! Both are built once from [`Config`](crate::config::Config) at startup and
//! shared read-only.

use std::collections::HashMap;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::amount::{ETHER_DECIMALS, MAX_DECIMALS};
use crate::{Error, Result};

pub const WETH_SYMBOL: &str = "WETH";
pub const ZRX_SYMBOL: &str = "ZRX";

/// Deployed protocol contracts for one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolAddresses {
    pub exchange: Address,
    pub token_transfer_proxy: Address,
    /// Wrapped ether token.
    pub ether_token: Address,
    /// Protocol fee token.
    pub zrx_token: Address,
}

impl ProtocolAddresses {
    pub fn validate(&self) -> Result<()> {
        for (name, address) in [
            ("exchange", self.exchange),
            ("token transfer proxy", self.token_transfer_proxy),
            ("ether token", self.ether_token),
            ("ZRX token", self.zrx_token),
        ] {
            if address.is_zero() {
                return Err(Error::Config {
                    message: format!("{} address must not be zero", name),
                });
            }
        }
        Ok(())
    }
}

/// A tradeable token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
}

/// Symbol and address lookup for tradeable tokens.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    by_symbol: HashMap<String, TokenInfo>,
    by_address: HashMap<Address, String>,
}

impl TokenRegistry {
    /// Build a registry from configured tokens. The protocol's wrapped ether
    /// and ZRX tokens are added with 18 decimals unless listed explicitly.
    pub fn new(protocol: &ProtocolAddresses, tokens: &[TokenInfo]) -> Result<Self> {
        let mut registry = Self::default();
        for token in tokens {
            registry.register(token.clone())?;
        }

        for (symbol, address) in [
            (WETH_SYMBOL, protocol.ether_token),
            (ZRX_SYMBOL, protocol.zrx_token),
        ] {
            if !registry.by_symbol.contains_key(symbol) && !registry.by_address.contains_key(&address) {
                registry.register(TokenInfo {
                    symbol: symbol.to_string(),
                    address,
                    decimals: ETHER_DECIMALS,
                })?;
            }
        }

        Ok(registry)
    }

    pub fn from_config(config: &crate::config::Config) -> Result<Self> {
        Self::new(&config.protocol, &config.tokens)
    }

    /// Add a token. Symbols are case-insensitive and must be unique, as must
    /// addresses.
    pub fn register(&mut self, token: TokenInfo) -> Result<()> {
        let symbol = token.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(Error::Config {
                message: "token symbol must not be empty".to_string(),
            });
        }
        if token.address.is_zero() {
            return Err(Error::Config {
                message: format!("token {} has a zero address", symbol),
            });
        }
        if token.decimals > MAX_DECIMALS {
            return Err(Error::Config {
                message: format!(
                    "token {} has {} decimals, at most {} supported",
                    symbol, token.decimals, MAX_DECIMALS
                ),
            });
        }
        if self.by_symbol.contains_key(&symbol) {
            return Err(Error::Config {
                message: format!("duplicate token symbol {}", symbol),
            });
        }
        if let Some(existing) = self.by_address.get(&token.address) {
            return Err(Error::Config {
                message: format!("token {} reuses the address of {}", symbol, existing),
            });
        }

        self.by_address.insert(token.address, symbol.clone());
        self.by_symbol.insert(
            symbol.clone(),
            TokenInfo {
                symbol,
                address: token.address,
                decimals: token.decimals,
            },
        );
        Ok(())
    }

    pub fn resolve(&self, symbol: &str) -> Result<&TokenInfo> {
        self.by_symbol
            .get(&symbol.trim().to_uppercase())
            .ok_or_else(|| Error::UnknownToken(symbol.to_string()))
    }

    pub fn by_address(&self, address: Address) -> Result<&TokenInfo> {
        self.by_address
            .get(&address)
            .and_then(|symbol| self.by_symbol.get(symbol))
            .ok_or_else(|| Error::UnknownToken(address.to_string()))
    }

    pub fn decimals_of(&self, address: Address) -> Result<u8> {
        self.by_address(address).map(|token| token.decimals)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &TokenInfo> {
        self.by_symbol.values()
    }

    pub fn len(&self) -> usize {
        self.by_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }
}

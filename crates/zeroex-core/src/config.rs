//! Configuration management for the order lifecycle engine.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::registry::{ProtocolAddresses, TokenInfo};
use crate::{Error, Result};

pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";
/// Network id of the local development chain.
pub const DEFAULT_NETWORK_ID: u64 = 50;
pub const DEFAULT_ORDER_TTL_SECS: u64 = 3600;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub protocol: ProtocolAddresses,
    #[serde(default)]
    pub tokens: Vec<TokenInfo>,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_network_id")]
    pub network_id: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            network_id: DEFAULT_NETWORK_ID,
        }
    }
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.to_string()
}

fn default_network_id() -> u64 {
    DEFAULT_NETWORK_ID
}

/// What the executor does when the local fillability pre-check fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecheckPolicy {
    /// Return the local failure and submit nothing.
    #[default]
    Enforce,
    /// Record the local failure and submit anyway; the exchange decides.
    #[serde(alias = "attempt")]
    AttemptAnyway,
}

impl FromStr for PrecheckPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "enforce" => Ok(PrecheckPolicy::Enforce),
            "attempt" | "attempt_anyway" => Ok(PrecheckPolicy::AttemptAnyway),
            other => Err(Error::Config {
                message: format!("unknown precheck policy '{}'", other),
            }),
        }
    }
}

/// Engine behaviour knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub order_ttl_secs: u64,
    pub add_personal_message_prefix: bool,
    pub poll_interval_ms: u64,
    /// `None` waits for a receipt indefinitely.
    pub confirmation_timeout_secs: Option<u64>,
    /// Allowances at or above this are treated as unlimited.
    #[serde(with = "crate::order::decimal_u256")]
    pub allowance_threshold: U256,
    pub precheck: PrecheckPolicy,
    /// Fixed gas limit for submitted transactions; the node estimates when unset.
    pub gas_limit: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            order_ttl_secs: DEFAULT_ORDER_TTL_SECS,
            add_personal_message_prefix: false,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            confirmation_timeout_secs: Some(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
            allowance_threshold: U256::MAX / U256::from(2u8),
            precheck: PrecheckPolicy::Enforce,
            gas_limit: None,
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn confirmation_timeout(&self) -> Option<Duration> {
        self.confirmation_timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Configuration with default network and engine settings.
    pub fn new(protocol: ProtocolAddresses) -> Self {
        Self {
            network: NetworkConfig::default(),
            protocol,
            tokens: Vec::new(),
            engine: EngineConfig::default(),
        }
    }

    /// Load configuration from environment variables.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = EngineConfig::default();
        let config = Self {
            network: NetworkConfig {
                rpc_url: env::var("DEX_RPC_URL").unwrap_or_else(|_| default_rpc_url()),
                network_id: env_parse("DEX_NETWORK_ID")?.unwrap_or(DEFAULT_NETWORK_ID),
            },
            protocol: ProtocolAddresses {
                exchange: env_address("DEX_EXCHANGE_ADDRESS")?,
                token_transfer_proxy: env_address("DEX_TOKEN_TRANSFER_PROXY_ADDRESS")?,
                ether_token: env_address("DEX_WETH_ADDRESS")?,
                zrx_token: env_address("DEX_ZRX_ADDRESS")?,
            },
            tokens: match env::var("DEX_TOKENS") {
                Ok(list) => parse_token_list(&list)?,
                Err(_) => Vec::new(),
            },
            engine: EngineConfig {
                order_ttl_secs: env_parse("DEX_ORDER_TTL_SECS")?.unwrap_or(defaults.order_ttl_secs),
                add_personal_message_prefix: env_parse("DEX_PERSONAL_MESSAGE_PREFIX")?
                    .unwrap_or(defaults.add_personal_message_prefix),
                poll_interval_ms: env_parse("DEX_POLL_INTERVAL_MS")?
                    .unwrap_or(defaults.poll_interval_ms),
                confirmation_timeout_secs: match env_parse::<u64>("DEX_CONFIRMATION_TIMEOUT_SECS")? {
                    Some(0) => None,
                    Some(secs) => Some(secs),
                    None => defaults.confirmation_timeout_secs,
                },
                allowance_threshold: defaults.allowance_threshold,
                precheck: env_parse("DEX_PRECHECK")?.unwrap_or(defaults.precheck),
                gas_limit: env_parse("DEX_GAS_LIMIT")?,
            },
        };

        config.protocol.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, with `DEX__SECTION__KEY` environment
    /// overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        let config: Self = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("DEX")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.protocol.validate()?;
        Ok(config)
    }
}

fn env_address(name: &str) -> Result<Address> {
    let value = env::var(name).map_err(|_| Error::Config {
        message: format!("{} environment variable not set", name),
    })?;
    value.trim().parse().map_err(|_| Error::Config {
        message: format!("{} is not a valid address: {}", name, value),
    })
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map(Some).map_err(|_| Error::Config {
            message: format!("{} has an invalid value: {}", name, value),
        }),
        Err(_) => Ok(None),
    }
}

/// Parse `SYMBOL:0xaddress:decimals` entries separated by commas.
pub fn parse_token_list(list: &str) -> Result<Vec<TokenInfo>> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let [symbol, address, decimals] = parts.as_slice() else {
                return Err(Error::Config {
                    message: format!("token entry '{}' must be SYMBOL:ADDRESS:DECIMALS", entry),
                });
            };
            Ok(TokenInfo {
                symbol: symbol.to_string(),
                address: address.parse().map_err(|_| Error::Config {
                    message: format!("token {} has an invalid address {}", symbol, address),
                })?,
                decimals: decimals.parse().map_err(|_| Error::Config {
                    message: format!("token {} has invalid decimals {}", symbol, decimals),
                })?,
            })
        })
        .collect()
}

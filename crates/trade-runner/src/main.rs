//! Trade Runner
//!
//! Runs one maker/taker round trip against a JSON-RPC node: wrap ether for the
//! taker, create and sign a ZRX/WETH order, set allowances, fill it and report
//! what is left.

use std::sync::Arc;

use alloy_primitives::Address;
use anyhow::{bail, Context, Result};
use clap::Parser;
use rust_decimal::Decimal;
use settlement_engine::TradeEngine;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroex_core::config::Config;
use zeroex_core::ledger::JsonRpcLedger;
use zeroex_core::registry::{WETH_SYMBOL, ZRX_SYMBOL};
use zeroex_core::signing::{LocalKeyring, SignMode};

#[derive(Parser)]
#[command(name = "trade-runner")]
#[command(about = "Create, sign and fill a 0x order against a node", long_about = None)]
struct Cli {
    /// Configuration file; environment variables are used when omitted
    #[arg(long)]
    config: Option<String>,

    /// Override the configured JSON-RPC endpoint
    #[arg(long)]
    rpc_url: Option<String>,

    /// Hex private keys to sign with locally (repeatable). Without keys the
    /// node's unlocked accounts sign.
    #[arg(long = "private-key")]
    private_keys: Vec<String>,

    /// Maker account (defaults to the first available account)
    #[arg(long)]
    maker: Option<Address>,

    /// Taker account (defaults to the second available account)
    #[arg(long)]
    taker: Option<Address>,

    /// ZRX the maker sells
    #[arg(long, default_value = "0.2")]
    maker_amount: Decimal,

    /// WETH the maker asks for
    #[arg(long, default_value = "0.3")]
    taker_amount: Decimal,

    /// WETH the taker fills
    #[arg(long, default_value = "0.2")]
    fill_amount: Decimal,

    /// Ether to wrap for the taker before filling
    #[arg(long, default_value = "0.3")]
    wrap_amount: Decimal,

    /// Reserve the order for the taker instead of leaving it open
    #[arg(long, default_value_t = false)]
    reserve: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "trade_runner=info,settlement_engine=info,zeroex_core=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path).with_context(|| format!("loading {}", path))?,
        None => Config::from_env().context("loading configuration from environment")?,
    };
    if let Some(url) = &cli.rpc_url {
        config.network.rpc_url = url.clone();
    }

    info!(rpc_url = %config.network.rpc_url, network_id = config.network.network_id, "Starting Trade Runner");

    let mut keyring = LocalKeyring::new(SignMode::EthSign);
    let mut accounts = Vec::with_capacity(cli.private_keys.len());
    for key in &cli.private_keys {
        accounts.push(keyring.add_private_key(key)?);
    }
    let ledger = Arc::new(
        JsonRpcLedger::new(config.network.rpc_url.clone())
            .with_keyring(keyring)
            .with_chain_id(config.network.network_id),
    );
    let engine = TradeEngine::from_config(&config, ledger.clone(), ledger)?;

    // Local keys first, in the order given, then the node's accounts.
    for address in engine.available_addresses().await? {
        if !accounts.contains(&address) {
            accounts.push(address);
        }
    }
    let maker = match cli.maker.or_else(|| accounts.first().copied()) {
        Some(maker) => maker,
        None => bail!("No maker account available. Pass --maker or --private-key."),
    };
    let taker = match cli.taker.or_else(|| accounts.get(1).copied()) {
        Some(taker) => taker,
        None => bail!("No taker account available. Pass --taker or a second --private-key."),
    };
    info!(maker = %maker, taker = %taker, "Using accounts");

    if cli.wrap_amount > Decimal::ZERO {
        let receipt = engine.convert_to_wrapped_asset(cli.wrap_amount, taker).await?;
        info!(tx_hash = %receipt.transaction_hash, amount = %cli.wrap_amount, "Wrapped ether for taker");
    }

    let reserved_taker = cli.reserve.then_some(taker);
    let (order_hash, order) = engine.create_order(
        maker,
        reserved_taker,
        ZRX_SYMBOL,
        WETH_SYMBOL,
        cli.maker_amount,
        cli.taker_amount,
    )?;
    let signed = engine.sign_order(order_hash, maker, order).await?;
    println!("{}", signed.to_json()?);

    let report = engine.ensure_allowances(&signed, taker).await?;
    info!(
        maker_approved = report.maker.was_approved(),
        taker_approved = report.taker.was_approved(),
        "Allowances in place"
    );

    let result = engine.fill_order(&signed, taker, cli.fill_amount).await?;
    if let Some(failure) = &result.precheck_failure {
        warn!(error = %failure, "Fill settled despite a failed pre-check");
    }

    println!("{}", serde_json::to_string_pretty(&result.receipt)?);

    let remaining = engine.remaining_fillable_decimal(&signed).await?;
    info!(
        order_hash = %order_hash,
        tx_hash = %result.tx_hash(),
        filled_taker = %result.filled_taker_token_amount,
        filled_maker = %result.filled_maker_token_amount,
        remaining = %remaining,
        "Fill complete"
    );
    println!("Remaining fillable: {} {}", remaining, WETH_SYMBOL);

    Ok(())
}

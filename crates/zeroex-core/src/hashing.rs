//! Canonical order hashing.
//!
//! The exchange contract computes
//! `keccak256(exchange, maker, taker, makerToken, takerToken, feeRecipient,
//! makerTokenAmount, takerTokenAmount, makerFee, takerFee, expiration, salt)`
//! over the tightly packed encoding: addresses as 20 raw bytes, integers as
//! 32-byte big-endian words. Every field is always present.

use alloy_primitives::{keccak256, B256};
use alloy_sol_types::SolValue;

use crate::order::OrderRecord;

/// Length of the packed order encoding (6 addresses + 6 words).
pub const ENCODED_ORDER_LEN: usize = 6 * 20 + 6 * 32;

/// Tightly packed encoding of an order, in contract field order.
pub fn encode_order(order: &OrderRecord) -> Vec<u8> {
    (
        order.exchange_contract_address,
        order.maker,
        order.taker,
        order.maker_token_address,
        order.taker_token_address,
        order.fee_recipient,
        order.maker_token_amount,
        order.taker_token_amount,
        order.maker_fee,
        order.taker_fee,
        order.expiration_unix_timestamp_sec,
        order.salt,
    )
        .abi_encode_packed()
}

/// Compute the order hash.
pub fn order_hash(order: &OrderRecord) -> B256 {
    keccak256(encode_order(order))
}

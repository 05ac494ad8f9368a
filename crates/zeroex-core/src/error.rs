//! Error types for the order lifecycle engine.
//!
//! Local validation failures (`InvalidAmount`, `UnknownToken`,
//! `OrderNotFillable`, ...) are returned before anything reaches the ledger.
//! Submission-time failures carry the transaction hash so callers can tell
//! "nothing was sent" apart from "something was sent and failed".

use std::fmt;
use std::time::Duration;

use alloy_primitives::{Address, TxHash, B256, U256};
use thiserror::Error;

use crate::ledger::TransactionReceipt;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    #[error("Unknown token: {0}")]
    UnknownToken(String),

    #[error("Invalid order: {message}")]
    InvalidOrder { message: String },

    #[error("Signature does not recover maker {maker} for order {order_hash}")]
    SignatureMismatch { order_hash: B256, maker: Address },

    #[error("Signing unavailable for {signer}: {message}")]
    SigningUnavailable { signer: Address, message: String },

    #[error("Signing rejected by {signer}: {message}")]
    SigningRejected { signer: Address, message: String },

    #[error("Allowance of {owner} for token {token} is {available}, need {required}")]
    AllowanceInsufficient {
        token: Address,
        owner: Address,
        required: U256,
        available: U256,
    },

    #[error("{side} allowance setup failed for token {token} owned by {owner}: {source}")]
    AllowanceSetup {
        side: Party,
        token: Address,
        owner: Address,
        #[source]
        source: Box<Error>,
    },

    /// One or both sides of a maker/taker allowance setup failed. `failures`
    /// holds an `AllowanceSetup` per failed side; `approved` holds the
    /// approvals mined on the side that went through.
    #[error("Allowance setup incomplete: {}", join_errors(.failures))]
    AllowancesIncomplete {
        failures: Vec<Error>,
        approved: Vec<TxHash>,
    },

    #[error("Order {order_hash} is not fillable: {reason}")]
    OrderNotFillable {
        order_hash: B256,
        reason: NotFillableReason,
    },

    #[error("Fill of order {order_hash} rejected: {reason}")]
    FillRejected {
        order_hash: B256,
        reason: FillRejection,
        tx_hash: Option<TxHash>,
    },

    #[error("Cancellation of order {order_hash} rejected: {reason}")]
    CancelRejected {
        order_hash: B256,
        reason: FillRejection,
        tx_hash: Option<TxHash>,
    },

    #[error("Transaction {tx_hash} not mined after {waited:?}")]
    TransactionTimeout { tx_hash: TxHash, waited: Duration },

    #[error("Transaction {tx_hash} reverted")]
    TransactionReverted {
        tx_hash: TxHash,
        receipt: Box<TransactionReceipt>,
    },

    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("RPC error: {message}")]
    Rpc { message: String, code: Option<i64> },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ABI error: {message}")]
    Abi { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid_amount(reason: impl Into<String>) -> Self {
        Error::InvalidAmount {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_order(message: impl Into<String>) -> Self {
        Error::InvalidOrder {
            message: message.into(),
        }
    }

    /// Malformed calldata, log or signature bytes.
    pub fn abi(message: impl Into<String>) -> Self {
        Error::Abi {
            message: message.into(),
        }
    }

    /// Hash of a transaction that reached the ledger before this error was
    /// observed. Such a transaction may have consumed gas and cannot be
    /// revoked; `None` means nothing was submitted.
    pub fn submitted_transaction(&self) -> Option<TxHash> {
        match self {
            Error::FillRejected { tx_hash, .. } | Error::CancelRejected { tx_hash, .. } => *tx_hash,
            Error::TransactionTimeout { tx_hash, .. } => Some(*tx_hash),
            Error::TransactionReverted { tx_hash, .. } => Some(*tx_hash),
            Error::AllowanceSetup { source, .. } => source.submitted_transaction(),
            Error::AllowancesIncomplete { failures, approved } => approved
                .first()
                .copied()
                .or_else(|| failures.iter().find_map(Error::submitted_transaction)),
            _ => None,
        }
    }

    /// True when the node refused a transaction because it would revert.
    /// Transport failures and other node errors (nonce, "already known",
    /// HTTP status) are not refusals.
    pub fn is_revert_refusal(&self) -> bool {
        match self {
            Error::Rpc { message, code } => {
                *code == Some(3) || message.to_ascii_lowercase().contains("revert")
            }
            _ => false,
        }
    }

    /// True for failures raised by local checks, before any ledger submission.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Error::InvalidAmount { .. }
                | Error::UnknownToken(_)
                | Error::InvalidOrder { .. }
                | Error::SignatureMismatch { .. }
                | Error::AllowanceInsufficient { .. }
                | Error::OrderNotFillable { .. }
        )
    }
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Counterparty an allowance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Maker,
    Taker,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Maker => write!(f, "maker"),
            Party::Taker => write!(f, "taker"),
        }
    }
}

/// Why the local pre-check considers an order unfillable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFillableReason {
    Expired { expiration: U256, now: u64 },
    FullyFilled,
    Cancelled,
    TakerNotPermitted { taker: Address },
}

impl fmt::Display for NotFillableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFillableReason::Expired { expiration, now } => {
                write!(f, "expired at {} (now {})", expiration, now)
            }
            NotFillableReason::FullyFilled => write!(f, "fully filled"),
            NotFillableReason::Cancelled => write!(f, "cancelled"),
            NotFillableReason::TakerNotPermitted { taker } => {
                write!(f, "taker {} is not permitted", taker)
            }
        }
    }
}

/// Why the exchange refused a fill or cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillRejection {
    Expired,
    FullyFilledOrCancelled,
    RoundingErrorTooLarge,
    InsufficientBalanceOrAllowance,
    /// Transaction was mined but reverted.
    Reverted,
    /// The node refused the transaction before mining it.
    Refused { message: String },
}

impl FillRejection {
    /// Map an exchange `LogError` error id to a rejection reason.
    pub fn from_error_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(FillRejection::Expired),
            1 => Some(FillRejection::FullyFilledOrCancelled),
            2 => Some(FillRejection::RoundingErrorTooLarge),
            3 => Some(FillRejection::InsufficientBalanceOrAllowance),
            _ => None,
        }
    }

    pub fn error_id(&self) -> Option<u8> {
        match self {
            FillRejection::Expired => Some(0),
            FillRejection::FullyFilledOrCancelled => Some(1),
            FillRejection::RoundingErrorTooLarge => Some(2),
            FillRejection::InsufficientBalanceOrAllowance => Some(3),
            _ => None,
        }
    }
}

impl fmt::Display for FillRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillRejection::Expired => write!(f, "order expired"),
            FillRejection::FullyFilledOrCancelled => write!(f, "order fully filled or cancelled"),
            FillRejection::RoundingErrorTooLarge => write!(f, "rounding error too large"),
            FillRejection::InsufficientBalanceOrAllowance => {
                write!(f, "insufficient balance or allowance")
            }
            FillRejection::Reverted => write!(f, "transaction reverted"),
            FillRejection::Refused { message } => write!(f, "refused by node: {}", message),
        }
    }
}

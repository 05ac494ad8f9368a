//! Calldata and event codec for the token, ether token, and exchange contracts.
//!
//! All arguments used by the protocol are static ABI types, so calldata is a
//! 4-byte selector followed by 32-byte words:
//!
//! - ERC-20 `approve(address,uint256)`, `allowance(address,address)`,
//!   `balanceOf(address)`
//! - ether token `deposit()` (payable)
//! - exchange `fillOrder(address[5],uint256[6],uint256,bool,uint8,bytes32,bytes32)`,
//!   `cancelOrder(address[5],uint256[6],uint256)`, `filled(bytes32)`,
//!   `cancelled(bytes32)`

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};

use crate::ledger::Log;
use crate::order::OrderRecord;
use crate::signing::EcSignature;
use crate::{Error, Result};

pub const APPROVE_SIGNATURE: &str = "approve(address,uint256)";
pub const ALLOWANCE_SIGNATURE: &str = "allowance(address,address)";
pub const BALANCE_OF_SIGNATURE: &str = "balanceOf(address)";
pub const DEPOSIT_SIGNATURE: &str = "deposit()";
pub const FILL_ORDER_SIGNATURE: &str =
    "fillOrder(address[5],uint256[6],uint256,bool,uint8,bytes32,bytes32)";
pub const CANCEL_ORDER_SIGNATURE: &str = "cancelOrder(address[5],uint256[6],uint256)";
pub const FILLED_SIGNATURE: &str = "filled(bytes32)";
pub const CANCELLED_SIGNATURE: &str = "cancelled(bytes32)";

pub const LOG_FILL_SIGNATURE: &str =
    "LogFill(address,address,address,address,address,uint256,uint256,uint256,uint256,bytes32,bytes32)";
pub const LOG_CANCEL_SIGNATURE: &str =
    "LogCancel(address,address,address,address,uint256,uint256,bytes32,bytes32)";
pub const LOG_ERROR_SIGNATURE: &str = "LogError(uint8,bytes32)";

/// Max uint256 for unlimited approval.
pub const MAX_UINT256: U256 = U256::MAX;

/// Function selector: first four bytes of the signature's keccak hash.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Event topic: keccak hash of the event signature.
pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

/// Indexed `tokens` topic of fill and cancel events.
pub fn token_pair_topic(maker_token: Address, taker_token: Address) -> B256 {
    let mut packed = Vec::with_capacity(40);
    packed.extend_from_slice(maker_token.as_slice());
    packed.extend_from_slice(taker_token.as_slice());
    keccak256(packed)
}

fn address_word(address: Address) -> [u8; 32] {
    B256::left_padding_from(address.as_slice()).0
}

fn uint_word(value: U256) -> [u8; 32] {
    value.to_be_bytes::<32>()
}

fn bool_word(value: bool) -> [u8; 32] {
    uint_word(U256::from(u8::from(value)))
}

/// Sequential reader over 32-byte ABI words.
struct WordReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> WordReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn word(&mut self) -> Result<&'a [u8]> {
        let end = self.offset + 32;
        let word = self
            .data
            .get(self.offset..end)
            .ok_or_else(|| Error::abi(format!("calldata truncated at byte {}", self.offset)))?;
        self.offset = end;
        Ok(word)
    }

    fn uint(&mut self) -> Result<U256> {
        Ok(U256::from_be_slice(self.word()?))
    }

    fn bytes32(&mut self) -> Result<B256> {
        Ok(B256::from_slice(self.word()?))
    }

    fn address(&mut self) -> Result<Address> {
        let word = self.word()?;
        if word[..12].iter().any(|b| *b != 0) {
            return Err(Error::abi("address word has dirty high bytes"));
        }
        Ok(Address::from_slice(&word[12..]))
    }

    fn boolean(&mut self) -> Result<bool> {
        match self.uint()? {
            v if v.is_zero() => Ok(false),
            v if v == U256::from(1u8) => Ok(true),
            v => Err(Error::abi(format!("invalid bool word {}", v))),
        }
    }

    fn small(&mut self) -> Result<u8> {
        let value = self.uint()?;
        if value > U256::from(u8::MAX) {
            return Err(Error::abi(format!("value {} does not fit uint8", value)));
        }
        Ok(value.to::<u8>())
    }
}

/// Decode a single `uint256` return value.
pub fn decode_uint(data: &[u8]) -> Result<U256> {
    WordReader::new(data).uint()
}

/// A call against one of the protocol contracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    Approve {
        spender: Address,
        amount: U256,
    },
    Allowance {
        owner: Address,
        spender: Address,
    },
    BalanceOf {
        owner: Address,
    },
    Deposit,
    FillOrder {
        order: OrderRecord,
        fill_taker_token_amount: U256,
        should_throw_on_insufficient_balance_or_allowance: bool,
        signature: EcSignature,
    },
    CancelOrder {
        order: OrderRecord,
        cancel_taker_token_amount: U256,
    },
    Filled {
        order_hash: B256,
    },
    Cancelled {
        order_hash: B256,
    },
}

impl ContractCall {
    fn signature(&self) -> &'static str {
        match self {
            ContractCall::Approve { .. } => APPROVE_SIGNATURE,
            ContractCall::Allowance { .. } => ALLOWANCE_SIGNATURE,
            ContractCall::BalanceOf { .. } => BALANCE_OF_SIGNATURE,
            ContractCall::Deposit => DEPOSIT_SIGNATURE,
            ContractCall::FillOrder { .. } => FILL_ORDER_SIGNATURE,
            ContractCall::CancelOrder { .. } => CANCEL_ORDER_SIGNATURE,
            ContractCall::Filled { .. } => FILLED_SIGNATURE,
            ContractCall::Cancelled { .. } => CANCELLED_SIGNATURE,
        }
    }

    /// Encode selector and arguments.
    pub fn encode(&self) -> Bytes {
        let mut words: Vec<[u8; 32]> = Vec::new();
        match self {
            ContractCall::Approve { spender, amount } => {
                words.push(address_word(*spender));
                words.push(uint_word(*amount));
            }
            ContractCall::Allowance { owner, spender } => {
                words.push(address_word(*owner));
                words.push(address_word(*spender));
            }
            ContractCall::BalanceOf { owner } => words.push(address_word(*owner)),
            ContractCall::Deposit => {}
            ContractCall::FillOrder {
                order,
                fill_taker_token_amount,
                should_throw_on_insufficient_balance_or_allowance,
                signature,
            } => {
                push_order(&mut words, order);
                words.push(uint_word(*fill_taker_token_amount));
                words.push(bool_word(*should_throw_on_insufficient_balance_or_allowance));
                words.push(uint_word(U256::from(signature.v)));
                words.push(signature.r.0);
                words.push(signature.s.0);
            }
            ContractCall::CancelOrder {
                order,
                cancel_taker_token_amount,
            } => {
                push_order(&mut words, order);
                words.push(uint_word(*cancel_taker_token_amount));
            }
            ContractCall::Filled { order_hash } | ContractCall::Cancelled { order_hash } => {
                words.push(order_hash.0);
            }
        }

        let mut data = Vec::with_capacity(4 + words.len() * 32);
        data.extend_from_slice(&selector(self.signature()));
        for word in &words {
            data.extend_from_slice(word);
        }
        Bytes::from(data)
    }

    /// Decode calldata sent to `target`. Order calls take their exchange
    /// address from the call target.
    pub fn decode(target: Address, data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::abi("calldata shorter than a selector"));
        }
        let (head, args) = data.split_at(4);
        let mut reader = WordReader::new(args);

        let call = if head == selector(APPROVE_SIGNATURE) {
            ContractCall::Approve {
                spender: reader.address()?,
                amount: reader.uint()?,
            }
        } else if head == selector(ALLOWANCE_SIGNATURE) {
            ContractCall::Allowance {
                owner: reader.address()?,
                spender: reader.address()?,
            }
        } else if head == selector(BALANCE_OF_SIGNATURE) {
            ContractCall::BalanceOf {
                owner: reader.address()?,
            }
        } else if head == selector(DEPOSIT_SIGNATURE) {
            ContractCall::Deposit
        } else if head == selector(FILL_ORDER_SIGNATURE) {
            let order = read_order(&mut reader, target)?;
            ContractCall::FillOrder {
                order,
                fill_taker_token_amount: reader.uint()?,
                should_throw_on_insufficient_balance_or_allowance: reader.boolean()?,
                signature: EcSignature {
                    v: reader.small()?,
                    r: reader.bytes32()?,
                    s: reader.bytes32()?,
                },
            }
        } else if head == selector(CANCEL_ORDER_SIGNATURE) {
            let order = read_order(&mut reader, target)?;
            ContractCall::CancelOrder {
                order,
                cancel_taker_token_amount: reader.uint()?,
            }
        } else if head == selector(FILLED_SIGNATURE) {
            ContractCall::Filled {
                order_hash: reader.bytes32()?,
            }
        } else if head == selector(CANCELLED_SIGNATURE) {
            ContractCall::Cancelled {
                order_hash: reader.bytes32()?,
            }
        } else {
            return Err(Error::abi(format!("unknown selector 0x{}", hex::encode(head))));
        };

        Ok(call)
    }
}

/// `address[5] orderAddresses, uint256[6] orderValues`.
fn push_order(words: &mut Vec<[u8; 32]>, order: &OrderRecord) {
    for address in [
        order.maker,
        order.taker,
        order.maker_token_address,
        order.taker_token_address,
        order.fee_recipient,
    ] {
        words.push(address_word(address));
    }
    for value in [
        order.maker_token_amount,
        order.taker_token_amount,
        order.maker_fee,
        order.taker_fee,
        order.expiration_unix_timestamp_sec,
        order.salt,
    ] {
        words.push(uint_word(value));
    }
}

fn read_order(reader: &mut WordReader<'_>, exchange: Address) -> Result<OrderRecord> {
    Ok(OrderRecord {
        maker: reader.address()?,
        taker: reader.address()?,
        maker_token_address: reader.address()?,
        taker_token_address: reader.address()?,
        fee_recipient: reader.address()?,
        exchange_contract_address: exchange,
        maker_token_amount: reader.uint()?,
        taker_token_amount: reader.uint()?,
        maker_fee: reader.uint()?,
        taker_fee: reader.uint()?,
        expiration_unix_timestamp_sec: reader.uint()?,
        salt: reader.uint()?,
    })
}

/// Decoded `LogFill` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillEvent {
    pub maker: Address,
    pub taker: Address,
    pub fee_recipient: Address,
    pub maker_token: Address,
    pub taker_token: Address,
    pub filled_maker_token_amount: U256,
    pub filled_taker_token_amount: U256,
    pub paid_maker_fee: U256,
    pub paid_taker_fee: U256,
    pub order_hash: B256,
}

/// Decoded `LogCancel` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelEvent {
    pub maker: Address,
    pub fee_recipient: Address,
    pub maker_token: Address,
    pub taker_token: Address,
    pub cancelled_maker_token_amount: U256,
    pub cancelled_taker_token_amount: U256,
    pub order_hash: B256,
}

/// Events emitted by the exchange contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEvent {
    Fill(FillEvent),
    Cancel(CancelEvent),
    Error { error_id: u8, order_hash: B256 },
}

impl ExchangeEvent {
    /// Encode as a log emitted by `exchange`.
    pub fn to_log(&self, exchange: Address) -> Log {
        let (topics, words): (Vec<B256>, Vec<[u8; 32]>) = match self {
            ExchangeEvent::Fill(e) => (
                vec![
                    event_topic(LOG_FILL_SIGNATURE),
                    B256::from(address_word(e.maker)),
                    B256::from(address_word(e.fee_recipient)),
                    token_pair_topic(e.maker_token, e.taker_token),
                ],
                vec![
                    address_word(e.taker),
                    address_word(e.maker_token),
                    address_word(e.taker_token),
                    uint_word(e.filled_maker_token_amount),
                    uint_word(e.filled_taker_token_amount),
                    uint_word(e.paid_maker_fee),
                    uint_word(e.paid_taker_fee),
                    e.order_hash.0,
                ],
            ),
            ExchangeEvent::Cancel(e) => (
                vec![
                    event_topic(LOG_CANCEL_SIGNATURE),
                    B256::from(address_word(e.maker)),
                    B256::from(address_word(e.fee_recipient)),
                    token_pair_topic(e.maker_token, e.taker_token),
                ],
                vec![
                    address_word(e.maker_token),
                    address_word(e.taker_token),
                    uint_word(e.cancelled_maker_token_amount),
                    uint_word(e.cancelled_taker_token_amount),
                    e.order_hash.0,
                ],
            ),
            ExchangeEvent::Error {
                error_id,
                order_hash,
            } => (
                vec![
                    event_topic(LOG_ERROR_SIGNATURE),
                    B256::from(uint_word(U256::from(*error_id))),
                    *order_hash,
                ],
                Vec::new(),
            ),
        };

        Log {
            address: exchange,
            topics,
            data: Bytes::from(words.concat()),
        }
    }

    /// Decode an exchange log. Logs from other contracts or with unknown
    /// topics yield `None`.
    pub fn from_log(log: &Log, exchange: Address) -> Result<Option<Self>> {
        if log.address != exchange {
            return Ok(None);
        }
        let Some(topic0) = log.topics.first() else {
            return Ok(None);
        };
        let topic_address = |i: usize| -> Result<Address> {
            let topic = log
                .topics
                .get(i)
                .ok_or_else(|| Error::abi(format!("log topic {} missing", i)))?;
            Ok(Address::from_slice(&topic[12..]))
        };
        let mut reader = WordReader::new(&log.data);

        let event = if *topic0 == event_topic(LOG_FILL_SIGNATURE) {
            let maker = topic_address(1)?;
            let fee_recipient = topic_address(2)?;
            ExchangeEvent::Fill(FillEvent {
                maker,
                fee_recipient,
                taker: reader.address()?,
                maker_token: reader.address()?,
                taker_token: reader.address()?,
                filled_maker_token_amount: reader.uint()?,
                filled_taker_token_amount: reader.uint()?,
                paid_maker_fee: reader.uint()?,
                paid_taker_fee: reader.uint()?,
                order_hash: reader.bytes32()?,
            })
        } else if *topic0 == event_topic(LOG_CANCEL_SIGNATURE) {
            let maker = topic_address(1)?;
            let fee_recipient = topic_address(2)?;
            ExchangeEvent::Cancel(CancelEvent {
                maker,
                fee_recipient,
                maker_token: reader.address()?,
                taker_token: reader.address()?,
                cancelled_maker_token_amount: reader.uint()?,
                cancelled_taker_token_amount: reader.uint()?,
                order_hash: reader.bytes32()?,
            })
        } else if *topic0 == event_topic(LOG_ERROR_SIGNATURE) {
            let id_topic = log
                .topics
                .get(1)
                .ok_or_else(|| Error::abi("LogError without error id"))?;
            let hash_topic = log
                .topics
                .get(2)
                .ok_or_else(|| Error::abi("LogError without order hash"))?;
            ExchangeEvent::Error {
                error_id: id_topic[31],
                order_hash: *hash_topic,
            }
        } else {
            return Ok(None);
        };

        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order(exchange: Address) -> OrderRecord {
        OrderRecord {
            maker: Address::repeat_byte(0x01),
            taker: Address::ZERO,
            fee_recipient: Address::ZERO,
            maker_token_address: Address::repeat_byte(0x0a),
            taker_token_address: Address::repeat_byte(0x0b),
            exchange_contract_address: exchange,
            salt: U256::from(42u8),
            maker_fee: U256::ZERO,
            taker_fee: U256::ZERO,
            maker_token_amount: U256::from(200u64),
            taker_token_amount: U256::from(300u64),
            expiration_unix_timestamp_sec: U256::from(1_700_000_000u64),
        }
    }

    #[test]
    fn test_selectors_match_published_values() {
        assert_eq!(selector(APPROVE_SIGNATURE), [0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(selector(ALLOWANCE_SIGNATURE), [0xdd, 0x62, 0xed, 0x3e]);
        assert_eq!(selector(BALANCE_OF_SIGNATURE), [0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(selector(DEPOSIT_SIGNATURE), [0xd0, 0xe3, 0x0d, 0xb0]);
        assert_eq!(selector(FILL_ORDER_SIGNATURE), [0xbc, 0x61, 0x39, 0x4a]);
        assert_eq!(selector(CANCEL_ORDER_SIGNATURE), [0x39, 0x4c, 0x21, 0xe7]);
        assert_eq!(selector(FILLED_SIGNATURE), [0x28, 0x8c, 0xdc, 0x91]);
        assert_eq!(selector(CANCELLED_SIGNATURE), [0x2a, 0xc1, 0x26, 0x22]);
    }

    #[test]
    fn test_event_topics() {
        assert_eq!(
            event_topic(LOG_FILL_SIGNATURE),
            "0x0d0b9391970d9a25552f37d436d2aae2925e2bfe1b2a923754bada030c498cb3"
                .parse::<B256>()
                .unwrap()
        );
        assert_eq!(
            event_topic(LOG_ERROR_SIGNATURE),
            "0x36d86c59e00bd73dc19ba3adfe068e4b64ac7e92be35546adeddf1b956a87e90"
                .parse::<B256>()
                .unwrap()
        );
    }

    #[test]
    fn test_approve_calldata_layout() {
        let spender = Address::repeat_byte(0x22);
        let data = ContractCall::Approve {
            spender,
            amount: MAX_UINT256,
        }
        .encode();

        assert_eq!(data.len(), 68);
        assert_eq!(&data[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(&data[4..16], &[0u8; 12]);
        assert_eq!(&data[16..36], spender.as_slice());
        assert_eq!(&data[36..], &[0xffu8; 32]);
    }

    #[test]
    fn test_fill_order_calldata_decodes() {
        let exchange = Address::repeat_byte(0xee);
        let call = ContractCall::FillOrder {
            order: sample_order(exchange),
            fill_taker_token_amount: U256::from(100u64),
            should_throw_on_insufficient_balance_or_allowance: true,
            signature: EcSignature {
                v: 28,
                r: B256::repeat_byte(0x0c),
                s: B256::repeat_byte(0x0d),
            },
        };

        let data = call.encode();
        // selector + 5 addresses + 6 values + amount, flag, v, r, s
        assert_eq!(data.len(), 4 + 16 * 32);
        assert_eq!(ContractCall::decode(exchange, &data).unwrap(), call);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(ContractCall::decode(Address::ZERO, &[0x01, 0x02]).is_err());
        assert!(ContractCall::decode(Address::ZERO, &[0xde, 0xad, 0xbe, 0xef]).is_err());

        let truncated = ContractCall::BalanceOf {
            owner: Address::repeat_byte(0x01),
        }
        .encode();
        assert!(ContractCall::decode(Address::ZERO, &truncated[..20]).is_err());
    }

    #[test]
    fn test_exchange_events_decode() {
        let exchange = Address::repeat_byte(0xee);
        let fill = ExchangeEvent::Fill(FillEvent {
            maker: Address::repeat_byte(0x01),
            taker: Address::repeat_byte(0x02),
            fee_recipient: Address::ZERO,
            maker_token: Address::repeat_byte(0x0a),
            taker_token: Address::repeat_byte(0x0b),
            filled_maker_token_amount: U256::from(2u8),
            filled_taker_token_amount: U256::from(3u8),
            paid_maker_fee: U256::ZERO,
            paid_taker_fee: U256::ZERO,
            order_hash: B256::repeat_byte(0x99),
        });
        let error = ExchangeEvent::Error {
            error_id: 1,
            order_hash: B256::repeat_byte(0x98),
        };

        for event in [fill, error] {
            let log = event.to_log(exchange);
            assert_eq!(ExchangeEvent::from_log(&log, exchange).unwrap(), Some(event));
            assert_eq!(
                ExchangeEvent::from_log(&log, Address::repeat_byte(0x01)).unwrap(),
                None
            );
        }
    }
}

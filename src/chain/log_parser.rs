use crate::models::{
    CategoryLog, ChainEvent, ETH_ADDRESS, ETH_DECIMALS, ReserveFee, TradeLog, scale_amount,
};
use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

const WORD: usize = 32;

/// A log entry as returned by `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: String,
    pub transaction_hash: B256,
    pub transaction_index: String,
    pub log_index: String,
    #[serde(default)]
    pub removed: bool,
}

/// Topic hashes of the events the fetcher understands.
#[derive(Debug, Clone)]
pub struct EventTopics {
    pub execute_trade: B256,
    pub fee_to_wallet: B256,
    pub burn_fee: B256,
    pub user_category: B256,
}

impl EventTopics {
    pub fn new() -> Self {
        Self {
            execute_trade: keccak256("ExecuteTrade(address,address,address,uint256,uint256)"),
            fee_to_wallet: keccak256("AssignFeeToWallet(address,address,uint256)"),
            burn_fee: keccak256("AssignBurnFees(address,uint256)"),
            user_category: keccak256("UserCategorySet(address,uint256)"),
        }
    }

    pub fn all(&self) -> [B256; 4] {
        [
            self.execute_trade,
            self.fee_to_wallet,
            self.burn_fee,
            self.user_category,
        ]
    }
}

impl Default for EventTopics {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a JSON-RPC hex quantity such as `"0x1b4"`.
pub fn parse_quantity(raw: &str) -> Result<u64> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| anyhow!("quantity {} is not 0x-prefixed", raw))?;
    u64::from_str_radix(digits, 16).with_context(|| format!("invalid quantity {}", raw))
}

fn word(data: &[u8], index: usize) -> Option<&[u8]> {
    data.get(index * WORD..(index + 1) * WORD)
}

fn word_u256(data: &[u8], index: usize) -> Option<U256> {
    word(data, index).map(U256::from_be_slice)
}

fn word_address(data: &[u8], index: usize) -> Option<Address> {
    word(data, index).map(|w| Address::from_slice(&w[12..]))
}

fn topic_address(topic: &B256) -> Address {
    Address::from_slice(&topic[12..])
}

/// USD value of whichever side of the trade is ETH.
fn fiat_amount(src: &Address, dest: &Address, src_amount: U256, dest_amount: U256, rate: f64) -> f64 {
    if *src == ETH_ADDRESS {
        scale_amount(src_amount, ETH_DECIMALS) * rate
    } else if *dest == ETH_ADDRESS {
        scale_amount(dest_amount, ETH_DECIMALS) * rate
    } else {
        0.0
    }
}

struct TradePart {
    log_index: u64,
    user: Address,
    src: Address,
    dest: Address,
    src_amount: U256,
    dest_amount: U256,
}

/// Fee logs of one transaction not yet claimed by a trade log.
struct PendingFees {
    tx_hash: B256,
    fees: Vec<ReserveFee>,
}

impl PendingFees {
    fn new(tx_hash: B256) -> Self {
        Self {
            tx_hash,
            fees: Vec::new(),
        }
    }

    /// Entry for `reserve`, created on first sight. Repeated fee logs for
    /// one reserve add up.
    fn reserve(&mut self, reserve: Address) -> &mut ReserveFee {
        let index = match self.fees.iter().position(|f| f.reserve_address == reserve) {
            Some(index) => index,
            None => {
                self.fees.push(ReserveFee {
                    reserve_address: reserve,
                    wallet_address: Address::ZERO,
                    burn_fee: None,
                    wallet_fee: None,
                });
                self.fees.len() - 1
            }
        };
        &mut self.fees[index]
    }

    fn add_wallet_fee(&mut self, reserve: Address, wallet: Address, fee: U256) {
        let entry = self.reserve(reserve);
        entry.wallet_address = wallet;
        entry.wallet_fee = Some(entry.wallet_fee.unwrap_or(U256::ZERO).saturating_add(fee));
    }

    fn add_burn_fee(&mut self, reserve: Address, fee: U256) {
        let entry = self.reserve(reserve);
        entry.burn_fee = Some(entry.burn_fee.unwrap_or(U256::ZERO).saturating_add(fee));
    }
}

/// Builds a trade from its log and the fees collected before it. The first
/// reserve fills the trade's own fee fields, later ones go to `extra_fees`.
fn build_trade(
    trade: TradePart,
    fees: Vec<ReserveFee>,
    tx_hash: B256,
    position: (u64, u64),
    timestamp: u64,
    usd_rate: f64,
) -> TradeLog {
    let (block_number, transaction_index) = position;
    let mut fees = fees.into_iter();
    let primary = fees.next();
    TradeLog {
        block_number,
        transaction_index,
        tx_hash,
        log_index: trade.log_index,
        timestamp,
        src_address: trade.src,
        dest_address: trade.dest,
        src_amount: trade.src_amount,
        dest_amount: trade.dest_amount,
        reserve_address: primary.as_ref().map_or(Address::ZERO, |f| f.reserve_address),
        wallet_address: primary.as_ref().map_or(Address::ZERO, |f| f.wallet_address),
        user_address: trade.user,
        burn_fee: primary.as_ref().and_then(|f| f.burn_fee),
        wallet_fee: primary.as_ref().and_then(|f| f.wallet_fee),
        fiat_amount: fiat_amount(
            &trade.src,
            &trade.dest,
            trade.src_amount,
            trade.dest_amount,
            usd_rate,
        ),
        extra_fees: fees.collect(),
    }
}

/// Turns raw logs into chain events.
///
/// Every trade log becomes one [`TradeLog`] carrying the fee logs seen
/// since the previous trade of the same transaction. Fee logs that no trade
/// claims yield nothing. Removed and malformed logs are dropped.
/// `block_times` maps block number to block time in milliseconds and must
/// cover every block holding a trade.
pub fn assemble_events(
    logs: &[RawLog],
    block_times: &HashMap<u64, u64>,
    topics: &EventTopics,
    usd_rate: f64,
) -> Result<Vec<ChainEvent>> {
    let mut events = Vec::new();
    let mut pending: Option<PendingFees> = None;

    for log in logs {
        if log.removed {
            debug!(tx = %log.transaction_hash, "skipping removed log");
            continue;
        }

        let position = parse_quantity(&log.block_number).and_then(|block| {
            Ok((
                block,
                parse_quantity(&log.transaction_index)?,
                parse_quantity(&log.log_index)?,
            ))
        });
        let (block_number, transaction_index, log_index) = match position {
            Ok(p) => p,
            Err(e) => {
                warn!(tx = %log.transaction_hash, error = %e, "dropping log with malformed position");
                continue;
            }
        };

        let Some(topic) = log.topics.first() else {
            continue;
        };

        if pending.as_ref().is_none_or(|p| p.tx_hash != log.transaction_hash) {
            if let Some(stale) = pending.as_ref().filter(|p| !p.fees.is_empty()) {
                debug!(tx = %stale.tx_hash, "dropping fee logs without a trade");
            }
            pending = Some(PendingFees::new(log.transaction_hash));
        }
        let Some(tx) = pending.as_mut() else {
            continue;
        };

        let data = log.data.as_ref();
        if *topic == topics.fee_to_wallet {
            match (word_address(data, 0), word_address(data, 1), word_u256(data, 2)) {
                (Some(reserve), Some(wallet), Some(fee)) => tx.add_wallet_fee(reserve, wallet, fee),
                _ => warn!(tx = %log.transaction_hash, "dropping malformed wallet fee log"),
            }
        } else if *topic == topics.burn_fee {
            match (word_address(data, 0), word_u256(data, 1)) {
                (Some(reserve), Some(fee)) => tx.add_burn_fee(reserve, fee),
                _ => warn!(tx = %log.transaction_hash, "dropping malformed burn fee log"),
            }
        } else if *topic == topics.execute_trade {
            let parsed = (
                log.topics.get(1).map(topic_address),
                word_address(data, 0),
                word_address(data, 1),
                word_u256(data, 2),
                word_u256(data, 3),
            );
            match parsed {
                (Some(user), Some(src), Some(dest), Some(src_amount), Some(dest_amount)) => {
                    let timestamp = *block_times
                        .get(&block_number)
                        .ok_or_else(|| anyhow!("missing timestamp for block {}", block_number))?;
                    let part = TradePart {
                        log_index,
                        user,
                        src,
                        dest,
                        src_amount,
                        dest_amount,
                    };
                    events.push(ChainEvent::Trade(build_trade(
                        part,
                        std::mem::take(&mut tx.fees),
                        log.transaction_hash,
                        (block_number, transaction_index),
                        timestamp,
                        usd_rate,
                    )));
                }
                _ => warn!(tx = %log.transaction_hash, "dropping malformed trade log"),
            }
        } else if *topic == topics.user_category {
            match (word_address(data, 0), word_u256(data, 1)) {
                (Some(address), Some(category)) => events.push(ChainEvent::Category(CategoryLog {
                    block_number,
                    transaction_index,
                    tx_hash: log.transaction_hash,
                    log_index,
                    address,
                    category,
                })),
                _ => warn!(tx = %log.transaction_hash, "dropping malformed category log"),
            }
        } else {
            debug!(topic = %topic, "ignoring unknown log topic");
        }
    }

    events.sort_by_key(|e| e.position());
    Ok(events)
}

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

// ==========================================
// CHAIN EVENTS (produced by the log source)
// ==========================================

/// One token exchange routed through the reserve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLog {
    pub block_number: u64,
    pub transaction_index: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    /// Block time in milliseconds.
    pub timestamp: u64,
    pub src_address: Address,
    pub dest_address: Address,
    pub src_amount: U256,
    pub dest_amount: U256,
    pub reserve_address: Address,
    pub wallet_address: Address,
    pub user_address: Address,
    pub burn_fee: Option<U256>,
    pub wallet_fee: Option<U256>,
    /// USD value of the ETH leg, priced with the cycle's rate.
    pub fiat_amount: f64,
    /// Fees assigned to any further reserves the trade routed through.
    #[serde(default)]
    pub extra_fees: Vec<ReserveFee>,
}

/// Fees one reserve was assigned inside a trade's transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveFee {
    pub reserve_address: Address,
    pub wallet_address: Address,
    pub burn_fee: Option<U256>,
    pub wallet_fee: Option<U256>,
}

/// A whitelist category reassignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryLog {
    pub block_number: u64,
    pub transaction_index: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    pub address: Address,
    pub category: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Trade,
    Category,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Trade => "trade",
            EventKind::Category => "category",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainEvent {
    Trade(TradeLog),
    Category(CategoryLog),
}

impl ChainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChainEvent::Trade(_) => EventKind::Trade,
            ChainEvent::Category(_) => EventKind::Category,
        }
    }

    pub fn block_number(&self) -> u64 {
        match self {
            ChainEvent::Trade(l) => l.block_number,
            ChainEvent::Category(l) => l.block_number,
        }
    }

    pub fn transaction_index(&self) -> u64 {
        match self {
            ChainEvent::Trade(l) => l.transaction_index,
            ChainEvent::Category(l) => l.transaction_index,
        }
    }

    /// Ordering key inside a batch.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number(), self.transaction_index())
    }
}

/// Lower-cased `0x` hex form used for every stat key and stored address.
pub fn addr_to_string(address: &Address) -> String {
    address.to_string().to_lowercase()
}

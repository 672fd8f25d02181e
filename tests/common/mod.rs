#![allow(dead_code)]

pub mod mocks;

use alloy_primitives::{Address, B256, U256};
use reserve_stats::models::{CategoryLog, ChainEvent, ETH_ADDRESS, TokenRegistry, TradeLog};
use std::str::FromStr;

pub const KNC: &str = "0xdd974d5c2e2928dea5f71b9825b8b646686bd200";
pub const RESERVE: &str = "0x63825c174ab367968ec60f061753d3bbd36a0d8f";
pub const WALLET: &str = "0x0000000000000000000000000000000000000abc";
pub const USER: &str = "0x8fa07f46353a2b17e92645592a94a0fc1ceb783f";

/// 2018-03-17T13:45:30Z
pub const TRADE_TIME: u64 = 1_521_294_330_000;

pub fn addr(s: &str) -> Address {
    Address::from_str(s).unwrap()
}

pub fn units(n: u64, decimals: u8) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(decimals))
}

pub fn registry() -> TokenRegistry {
    TokenRegistry::new()
        .with_token("ETH", ETH_ADDRESS, 18)
        .with_token("KNC", addr(KNC), 18)
}

/// ETH -> KNC trade of 1 ETH worth 500 USD.
pub fn trade(block: u64, tx_index: u64) -> ChainEvent {
    ChainEvent::Trade(TradeLog {
        block_number: block,
        transaction_index: tx_index,
        tx_hash: B256::from(U256::from(block * 1_000 + tx_index)),
        log_index: 0,
        timestamp: TRADE_TIME,
        src_address: ETH_ADDRESS,
        dest_address: addr(KNC),
        src_amount: units(1, 18),
        dest_amount: units(250, 18),
        reserve_address: addr(RESERVE),
        wallet_address: addr(WALLET),
        user_address: addr(USER),
        burn_fee: Some(units(2, 15)),
        wallet_fee: Some(units(1, 15)),
        fiat_amount: 500.0,
        extra_fees: Vec::new(),
    })
}

pub fn category(block: u64, tx_index: u64) -> ChainEvent {
    ChainEvent::Category(CategoryLog {
        block_number: block,
        transaction_index: tx_index,
        tx_hash: B256::from(U256::from(block * 1_000 + tx_index)),
        log_index: 1,
        address: addr(USER),
        category: U256::from(2u64),
    })
}

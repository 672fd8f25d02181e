pub mod log_parser;
pub mod rpc_client;

pub use log_parser::{EventTopics, RawLog, assemble_events};
pub use rpc_client::RpcBlockchain;

use crate::models::ChainEvent;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Blockchain: Send + Sync {
    async fn current_block(&self) -> Result<u64>;

    /// Every event from `from_block` up to the chain head, sorted by
    /// `(block_number, transaction_index)`. Trade events are priced with
    /// `usd_rate`.
    async fn get_logs(&self, from_block: u64, timepoint: u64, usd_rate: f64)
    -> Result<Vec<ChainEvent>>;
}

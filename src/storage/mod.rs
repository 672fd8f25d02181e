//! Persistence contract used by the fetcher and the rate cache.

pub mod postgres;
pub mod ram;

pub use postgres::PgStorage;
pub use ram::RamStorage;

use crate::models::{CategoryLog, Frequency, Metric, RateSample, TradeLog, TradeStats};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Last block whose logs are fully stored; `0` before the first cycle.
    async fn last_block(&self) -> Result<u64>;

    async fn update_log_block(&self, block: u64, timepoint: u64) -> Result<()>;

    /// Must tolerate the same log being stored twice.
    async fn store_trade_log(&self, trade: &TradeLog, timepoint: u64) -> Result<()>;

    async fn store_category_log(&self, log: &CategoryLog) -> Result<()>;

    /// Adds `stats` into the bucket of `timestamp` at `freq`; never overwrites.
    async fn set_trade_stats(
        &self,
        metric: Metric,
        freq: Frequency,
        timestamp: u64,
        stats: &TradeStats,
    ) -> Result<()>;

    /// Month log keyed by month start; empty when none was stored.
    async fn get_rate_log(&self, month: u64) -> Result<Vec<RateSample>>;

    async fn store_rate_log(&self, samples: &[RateSample], month: u64) -> Result<()>;
}

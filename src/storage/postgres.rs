use super::Storage;
use crate::db::get_db_pool;
use crate::models::{CategoryLog, Frequency, Metric, RateSample, TradeLog, TradeStats, queries};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        Ok(Self::new(get_db_pool(database_url).await?))
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn last_block(&self) -> Result<u64> {
        queries::get_last_block(&self.pool).await
    }

    async fn update_log_block(&self, block: u64, timepoint: u64) -> Result<()> {
        queries::upsert_last_block(&self.pool, block, timepoint).await
    }

    async fn store_trade_log(&self, trade: &TradeLog, timepoint: u64) -> Result<()> {
        queries::insert_trade_log(&self.pool, trade, timepoint).await
    }

    async fn store_category_log(&self, log: &CategoryLog) -> Result<()> {
        queries::insert_category_log(&self.pool, log).await
    }

    async fn set_trade_stats(
        &self,
        metric: Metric,
        freq: Frequency,
        timestamp: u64,
        stats: &TradeStats,
    ) -> Result<()> {
        queries::accumulate_trade_stats(&self.pool, metric.as_str(), freq, timestamp, stats).await
    }

    async fn get_rate_log(&self, month: u64) -> Result<Vec<RateSample>> {
        queries::get_rate_log(&self.pool, month).await
    }

    async fn store_rate_log(&self, samples: &[RateSample], month: u64) -> Result<()> {
        queries::upsert_rate_log(&self.pool, samples, month).await
    }
}

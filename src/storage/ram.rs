use super::Storage;
use crate::models::{CategoryLog, Frequency, Metric, RateSample, TradeLog, TradeStats};
use alloy_primitives::B256;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct RamData {
    last_block: u64,
    last_block_updated_at: u64,
    trade_logs: HashMap<(B256, u64), TradeLog>,
    category_logs: HashMap<(B256, u64), CategoryLog>,
    stats: HashMap<(Metric, Frequency, u64), TradeStats>,
    rate_logs: HashMap<u64, Vec<RateSample>>,
}

/// In-process storage with the same replay semantics as Postgres.
#[derive(Default)]
pub struct RamStorage {
    data: RwLock<RamData>,
}

impl RamStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_last_block(block: u64) -> Self {
        let storage = Self::new();
        storage.data.write().await.last_block = block;
        storage
    }

    /// Accumulated stats for the bucket that contains `timestamp`.
    pub async fn trade_stats(
        &self,
        metric: Metric,
        freq: Frequency,
        timestamp: u64,
    ) -> Option<TradeStats> {
        self.data
            .read()
            .await
            .stats
            .get(&(metric, freq, freq.bucket(timestamp)))
            .cloned()
    }

    /// Stored trade logs in chain order.
    pub async fn trade_logs(&self) -> Vec<TradeLog> {
        let mut logs: Vec<TradeLog> = self.data.read().await.trade_logs.values().cloned().collect();
        logs.sort_by_key(|l| (l.block_number, l.transaction_index, l.log_index));
        logs
    }

    pub async fn category_logs(&self) -> Vec<CategoryLog> {
        let mut logs: Vec<CategoryLog> =
            self.data.read().await.category_logs.values().cloned().collect();
        logs.sort_by_key(|l| (l.block_number, l.transaction_index, l.log_index));
        logs
    }

    pub async fn cursor_updated_at(&self) -> u64 {
        self.data.read().await.last_block_updated_at
    }
}

#[async_trait]
impl Storage for RamStorage {
    async fn last_block(&self) -> Result<u64> {
        Ok(self.data.read().await.last_block)
    }

    async fn update_log_block(&self, block: u64, timepoint: u64) -> Result<()> {
        let mut data = self.data.write().await;
        data.last_block = block;
        data.last_block_updated_at = timepoint;
        Ok(())
    }

    async fn store_trade_log(&self, trade: &TradeLog, _timepoint: u64) -> Result<()> {
        self.data
            .write()
            .await
            .trade_logs
            .entry((trade.tx_hash, trade.log_index))
            .or_insert_with(|| trade.clone());
        Ok(())
    }

    async fn store_category_log(&self, log: &CategoryLog) -> Result<()> {
        self.data
            .write()
            .await
            .category_logs
            .entry((log.tx_hash, log.log_index))
            .or_insert_with(|| log.clone());
        Ok(())
    }

    async fn set_trade_stats(
        &self,
        metric: Metric,
        freq: Frequency,
        timestamp: u64,
        stats: &TradeStats,
    ) -> Result<()> {
        let mut data = self.data.write().await;
        let bucket = data
            .stats
            .entry((metric, freq, freq.bucket(timestamp)))
            .or_default();
        for (key, value) in stats {
            *bucket.entry(key.clone()).or_insert(0.0) += value;
        }
        Ok(())
    }

    async fn get_rate_log(&self, month: u64) -> Result<Vec<RateSample>> {
        Ok(self
            .data
            .read()
            .await
            .rate_logs
            .get(&month)
            .cloned()
            .unwrap_or_default())
    }

    async fn store_rate_log(&self, samples: &[RateSample], month: u64) -> Result<()> {
        self.data
            .write()
            .await
            .rate_logs
            .insert(month, samples.to_vec());
        Ok(())
    }
}

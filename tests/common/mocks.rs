use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reserve_stats::chain::Blockchain;
use reserve_stats::fetcher::FetcherRunner;
use reserve_stats::models::{
    CategoryLog, ChainEvent, FetcherStatus, Frequency, Metric, RateSample, TradeLog, TradeStats,
};
use reserve_stats::rates::{HistoricalRateSource, LiveRateSource};
use reserve_stats::redis::StatusPublisher;
use reserve_stats::storage::{RamStorage, Storage};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{Notify, mpsc};

/// Blockchain that replays scripted `get_logs` outcomes in order and records
/// every request.
#[derive(Default)]
pub struct MockBlockchain {
    batches: Mutex<VecDeque<Result<Vec<ChainEvent>, String>>>,
    pub requests: Mutex<Vec<(u64, f64)>>,
    pub head: AtomicU64,
    pub head_fails: AtomicBool,
}

impl MockBlockchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_batch(&self, events: Vec<ChainEvent>) {
        self.batches.lock().unwrap().push_back(Ok(events));
    }

    pub fn push_error(&self, reason: &str) {
        self.batches.lock().unwrap().push_back(Err(reason.to_string()));
    }

    pub fn requests(&self) -> Vec<(u64, f64)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Blockchain for MockBlockchain {
    async fn current_block(&self) -> Result<u64> {
        if self.head_fails.load(Ordering::SeqCst) {
            return Err(anyhow!("node unreachable"));
        }
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn get_logs(&self, from_block: u64, _timepoint: u64, usd_rate: f64) -> Result<Vec<ChainEvent>> {
        self.requests.lock().unwrap().push((from_block, usd_rate));
        match self.batches.lock().unwrap().pop_front() {
            Some(Ok(events)) => Ok(events),
            Some(Err(reason)) => Err(anyhow!(reason)),
            None => Ok(Vec::new()),
        }
    }
}

/// RamStorage with switchable failures and call counters.
#[derive(Default)]
pub struct FlakyStorage {
    pub inner: RamStorage,
    pub fail_last_block: AtomicBool,
    pub fail_cursor_write: AtomicBool,
    pub fail_rate_log_read: AtomicBool,
    /// Trade logs in this block fail to store.
    pub fail_trade_block: Mutex<Option<u64>>,
    /// `set_trade_stats` fails once this many calls have succeeded.
    pub fail_stats_after: Mutex<Option<usize>>,
    pub stats_calls: AtomicUsize,
    pub cursor_writes: Mutex<Vec<u64>>,
    pub rate_log_writes: AtomicUsize,
    /// When set, `store_trade_log` signals `trade_store_entered` and waits
    /// for `trade_store_release`.
    pub hold_trade_store: AtomicBool,
    pub trade_store_entered: Notify,
    pub trade_store_release: Notify,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_last_block(block: u64) -> Self {
        Self {
            inner: RamStorage::with_last_block(block).await,
            ..Self::default()
        }
    }

    pub fn cursor_writes(&self) -> Vec<u64> {
        self.cursor_writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn last_block(&self) -> Result<u64> {
        if self.fail_last_block.load(Ordering::SeqCst) {
            return Err(anyhow!("cursor read failed"));
        }
        self.inner.last_block().await
    }

    async fn update_log_block(&self, block: u64, timepoint: u64) -> Result<()> {
        self.cursor_writes.lock().unwrap().push(block);
        if self.fail_cursor_write.load(Ordering::SeqCst) {
            return Err(anyhow!("cursor write failed"));
        }
        self.inner.update_log_block(block, timepoint).await
    }

    async fn store_trade_log(&self, trade: &TradeLog, timepoint: u64) -> Result<()> {
        if *self.fail_trade_block.lock().unwrap() == Some(trade.block_number) {
            return Err(anyhow!("insert failed"));
        }
        if self.hold_trade_store.load(Ordering::SeqCst) {
            self.trade_store_entered.notify_one();
            self.trade_store_release.notified().await;
        }
        self.inner.store_trade_log(trade, timepoint).await
    }

    async fn store_category_log(&self, log: &CategoryLog) -> Result<()> {
        self.inner.store_category_log(log).await
    }

    async fn set_trade_stats(
        &self,
        metric: Metric,
        freq: Frequency,
        timestamp: u64,
        stats: &TradeStats,
    ) -> Result<()> {
        let done = self.stats_calls.load(Ordering::SeqCst);
        if let Some(limit) = *self.fail_stats_after.lock().unwrap() {
            if done >= limit {
                return Err(anyhow!("stats write failed"));
            }
        }
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.set_trade_stats(metric, freq, timestamp, stats).await
    }

    async fn get_rate_log(&self, month: u64) -> Result<Vec<RateSample>> {
        if self.fail_rate_log_read.load(Ordering::SeqCst) {
            return Err(anyhow!("rate log read failed"));
        }
        self.inner.get_rate_log(month).await
    }

    async fn store_rate_log(&self, samples: &[RateSample], month: u64) -> Result<()> {
        self.rate_log_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.store_rate_log(samples, month).await
    }
}

pub struct CountingLiveSource {
    pub rate: Mutex<Result<f64, String>>,
    pub calls: AtomicUsize,
}

impl CountingLiveSource {
    pub fn new(rate: f64) -> Self {
        Self {
            rate: Mutex::new(Ok(rate)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, rate: Result<f64, String>) {
        *self.rate.lock().unwrap() = rate;
    }
}

#[async_trait]
impl LiveRateSource for CountingLiveSource {
    async fn fetch_eth_usd(&self) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rate.lock().unwrap().clone().map_err(|e| anyhow!(e))
    }
}

/// History source answering per month start; unknown months fail.
#[derive(Default)]
pub struct CountingHistorySource {
    months: Mutex<HashMap<u64, Vec<RateSample>>>,
    pub calls: Mutex<Vec<(u64, u64)>>,
}

impl CountingHistorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_month(self, month: u64, samples: Vec<RateSample>) -> Self {
        self.months.lock().unwrap().insert(month, samples);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl HistoricalRateSource for CountingHistorySource {
    async fn fetch_range(&self, from: u64, to: u64) -> Result<Vec<RateSample>> {
        self.calls.lock().unwrap().push((from, to));
        self.months
            .lock()
            .unwrap()
            .get(&from)
            .cloned()
            .ok_or_else(|| anyhow!("history unavailable for {}", from))
    }
}

/// Runner whose ticks are pushed by the test.
pub struct ManualRunner {
    sender: Mutex<Option<mpsc::UnboundedSender<u64>>>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<u64>>,
    pub started: AtomicBool,
}

impl ManualRunner {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(Some(tx)),
            receiver: tokio::sync::Mutex::new(rx),
            started: AtomicBool::new(false),
        }
    }

    pub fn tick(&self, timepoint: u64) {
        if let Some(tx) = self.sender.lock().unwrap().as_ref() {
            tx.send(timepoint).unwrap();
        }
    }
}

#[async_trait]
impl FetcherRunner for ManualRunner {
    async fn start(&self) -> Result<()> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.sender.lock().unwrap().take();
        Ok(())
    }

    async fn next_block_tick(&self) -> Option<u64> {
        self.receiver.lock().await.recv().await
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub published: Mutex<Vec<FetcherStatus>>,
}

#[async_trait]
impl StatusPublisher for RecordingPublisher {
    async fn publish_status(&self, status: &FetcherStatus) -> Result<()> {
        self.published.lock().unwrap().push(status.clone());
        Ok(())
    }
}

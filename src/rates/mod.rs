//! ETH/USD rate resolution for valuing trades.
//!
//! Timepoints in the current month use the live rate. Older timepoints are
//! looked up in the stored month log, refetched from the history source when
//! the log is missing or has nothing usable, and fall back to the live rate
//! when all else fails.

pub mod sources;

pub use sources::{HistoricalRateSource, LiveRateSource, RateHistoryClient, TickerClient};

use crate::models::{RateSample, find_rate};
use crate::storage::Storage;
use crate::timeutil::{is_current_month, month_start, next_month_start, timepoint_now};
use anyhow::{Context, Result, anyhow};
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Which source answered a rate lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateTier {
    Live,
    HistoricalLog,
    RemoteRefetch,
    StaleLive,
}

/// Outcome of warming one month.
#[derive(Debug, Clone, PartialEq)]
pub enum MonthWarmup {
    Stored(usize),
    Failed(String),
}

pub struct RateCache {
    live: RwLock<f64>,
    storage: Arc<dyn Storage>,
    live_source: Arc<dyn LiveRateSource>,
    history: Arc<dyn HistoricalRateSource>,
}

impl RateCache {
    pub fn new(
        storage: Arc<dyn Storage>,
        live_source: Arc<dyn LiveRateSource>,
        history: Arc<dyn HistoricalRateSource>,
    ) -> Self {
        Self {
            live: RwLock::new(0.0),
            storage,
            live_source,
            history,
        }
    }

    pub async fn live_rate(&self) -> f64 {
        *self.live.read().await
    }

    pub async fn set_live_rate(&self, usd: f64) {
        *self.live.write().await = usd;
    }

    /// USD per ETH at `timepoint`. Never fails; may be stale.
    pub async fn get_rate(&self, timepoint: u64) -> f64 {
        let (rate, tier) = self.resolve(timepoint, timepoint_now()).await;
        debug!(timepoint, rate, ?tier, "Resolved ETH rate");
        rate
    }

    pub async fn resolve(&self, timepoint: u64, now: u64) -> (f64, RateTier) {
        if is_current_month(timepoint, now) {
            return (self.live_rate().await, RateTier::Live);
        }

        let month = month_start(timepoint);
        match self.storage.get_rate_log(month).await {
            Ok(samples) if !samples.is_empty() => {
                let rate = find_rate(&samples, timepoint);
                if rate != 0.0 {
                    return (rate, RateTier::HistoricalLog);
                }
            }
            Ok(_) => {}
            Err(e) => warn!(month, error = %e, "Failed to read rate log"),
        }

        match self
            .history
            .fetch_range(month, next_month_start(timepoint))
            .await
        {
            Ok(samples) => {
                let rate = find_rate(&samples, timepoint);
                if rate != 0.0 {
                    if let Err(e) = self.storage.store_rate_log(&samples, month).await {
                        warn!(month, error = %e, "Failed to store rate log");
                    }
                    return (rate, RateTier::RemoteRefetch);
                }
                warn!(month, timepoint, "Fetched rate history has no usable sample");
            }
            Err(e) => warn!(month, error = %e, "Failed to fetch rate history"),
        }

        (self.live_rate().await, RateTier::StaleLive)
    }

    pub async fn refresh_live_rate(&self) -> Result<f64> {
        let usd = self
            .live_source
            .fetch_eth_usd()
            .await
            .context("Failed to fetch live ETH rate")?;
        self.set_live_rate(usd).await;
        Ok(usd)
    }

    /// Refreshes the live rate now and then every `interval` until `shutdown`
    /// is cancelled.
    pub async fn run_eth_rate_refresher(&self, interval: Duration, shutdown: CancellationToken) {
        loop {
            match self.refresh_live_rate().await {
                Ok(usd) => info!(eth_usd = usd, "Refreshed live ETH rate"),
                Err(e) => warn!(error = %e, "Live rate refresh failed, keeping previous rate"),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.cancelled() => {
                    debug!("Rate refresher shutting down");
                    return;
                }
            }
        }
    }

    /// Fetches and stores the rate log of every month in `months`, with at
    /// most `concurrency` fetches in flight.
    pub async fn warm_months(&self, months: &[u64], concurrency: usize) -> BTreeMap<u64, MonthWarmup> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

        let handles: Vec<_> = months
            .iter()
            .map(|&month| {
                let semaphore = semaphore.clone();
                let storage = self.storage.clone();
                let history = self.history.clone();
                let handle = tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| anyhow!("semaphore closed: {}", e))?;
                    warm_month(storage.as_ref(), history.as_ref(), month).await
                });
                (month, handle)
            })
            .collect();

        let (keys, futures): (Vec<u64>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(futures).await;

        keys.into_iter()
            .zip(results)
            .map(|(month, joined)| {
                let outcome = match joined {
                    Ok(Ok(count)) => MonthWarmup::Stored(count),
                    Ok(Err(e)) => MonthWarmup::Failed(format!("{:#}", e)),
                    Err(e) => MonthWarmup::Failed(format!("task failed: {}", e)),
                };
                (month, outcome)
            })
            .collect()
    }
}

async fn warm_month(
    storage: &dyn Storage,
    history: &dyn HistoricalRateSource,
    month: u64,
) -> Result<usize> {
    let samples: Vec<RateSample> = history
        .fetch_range(month, next_month_start(month))
        .await
        .with_context(|| format!("Failed to fetch rates for month {}", month))?;
    if samples.is_empty() {
        return Err(anyhow!("no samples for month {}", month));
    }
    storage
        .store_rate_log(&samples, month)
        .await
        .with_context(|| format!("Failed to store rates for month {}", month))?;
    Ok(samples.len())
}

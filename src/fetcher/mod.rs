//! Block-driven ingestion loop.
//!
//! Each runner tick reads the stored cursor, pulls every event after it,
//! dispatches them in chain order and writes back the block up to which
//! everything is durable. A separate task keeps the observed chain head
//! fresh for reporting.

pub mod aggregator;
pub mod dispatcher;
pub mod runner;

pub use aggregator::{StatsAggregator, aggregate};
pub use dispatcher::LogDispatcher;
pub use runner::{FetcherRunner, TickerRunner};

use crate::chain::Blockchain;
use crate::models::{ChainEvent, ChainHead, FetcherStatus, TokenRegistry};
use crate::rates::RateCache;
use crate::redis::StatusPublisher;
use crate::storage::Storage;
use crate::timeutil::timepoint_now;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DEFAULT_CURRENT_BLOCK_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetcherState {
    Idle,
    FetchingLogs,
    Persisting,
}

pub struct Fetcher {
    storage: Arc<dyn Storage>,
    blockchain: Arc<dyn Blockchain>,
    runner: Arc<dyn FetcherRunner>,
    rate_cache: Arc<RateCache>,
    dispatcher: LogDispatcher,
    publisher: Option<Arc<dyn StatusPublisher>>,
    current_block_interval: Duration,
    state: RwLock<FetcherState>,
    chain_head: RwLock<ChainHead>,
}

impl Fetcher {
    pub fn new(
        storage: Arc<dyn Storage>,
        blockchain: Arc<dyn Blockchain>,
        runner: Arc<dyn FetcherRunner>,
        rate_cache: Arc<RateCache>,
        tokens: Arc<TokenRegistry>,
    ) -> Self {
        let aggregator = StatsAggregator::new(storage.clone(), tokens);
        let dispatcher = LogDispatcher::new(storage.clone(), aggregator);
        Self {
            storage,
            blockchain,
            runner,
            rate_cache,
            dispatcher,
            publisher: None,
            current_block_interval: DEFAULT_CURRENT_BLOCK_INTERVAL,
            state: RwLock::new(FetcherState::Idle),
            chain_head: RwLock::new(ChainHead::default()),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn StatusPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_current_block_interval(mut self, interval: Duration) -> Self {
        self.current_block_interval = interval;
        self
    }

    pub async fn state(&self) -> FetcherState {
        *self.state.read().await
    }

    pub async fn current_block(&self) -> ChainHead {
        *self.chain_head.read().await
    }

    async fn set_state(&self, next: FetcherState) {
        let mut state = self.state.write().await;
        debug!(from = ?*state, to = ?next, "Fetcher state change");
        *state = next;
    }

    /// Starts the runner, then spawns the ingestion and chain head tasks.
    /// Both exit once `shutdown` is cancelled or the runner stops ticking.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<Vec<JoinHandle<()>>> {
        self.runner.start().await.context("Failed to start runner")?;
        info!("Fetcher started");

        let ingest = {
            let fetcher = self.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        tick = fetcher.runner.next_block_tick() => match tick {
                            Some(timepoint) => fetcher.run_cycle(timepoint).await,
                            None => {
                                info!("Runner stopped, ingestion loop exiting");
                                break;
                            }
                        },
                        _ = shutdown.cancelled() => {
                            info!("Ingestion loop shutting down");
                            break;
                        }
                    }
                }
            })
        };

        let head = {
            let fetcher = self.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(fetcher.current_block_interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = fetcher.fetch_current_block().await {
                                warn!(error = %e, "Failed to refresh chain head");
                            }
                        }
                        _ = shutdown.cancelled() => {
                            debug!("Chain head task shutting down");
                            break;
                        }
                    }
                }
            })
        };

        Ok(vec![ingest, head])
    }

    pub async fn stop(&self) -> Result<()> {
        self.runner.stop().await.context("Failed to stop runner")
    }

    /// One ingestion pass for the tick at `timepoint`.
    pub async fn run_cycle(&self, timepoint: u64) {
        self.set_state(FetcherState::FetchingLogs).await;

        let last_block = match self.storage.last_block().await {
            Ok(block) => block,
            Err(e) => {
                error!(error = %e, "Failed to read cursor, retrying next tick");
                self.set_state(FetcherState::Idle).await;
                return;
            }
        };

        let resume = self.fetch_logs(last_block + 1, timepoint).await;

        self.set_state(FetcherState::Persisting).await;
        match self.storage.update_log_block(resume, timepoint).await {
            Ok(()) => debug!(block = resume, "Cursor persisted"),
            Err(e) => error!(block = resume, error = %e, "Failed to persist cursor"),
        }
        self.set_state(FetcherState::Idle).await;
    }

    /// Fetches and dispatches everything from `from_block`, returning the
    /// block up to which all events are stored. Nothing is fetched while
    /// no ETH rate is known, so trades are never priced at zero.
    pub async fn fetch_logs(&self, from_block: u64, timepoint: u64) -> u64 {
        let last_block = from_block.saturating_sub(1);
        let rate = self.rate_cache.get_rate(timepoint).await;
        if rate <= 0.0 {
            warn!(from_block, timepoint, "No usable ETH rate, cursor held");
            return last_block;
        }

        let mut events = match self.blockchain.get_logs(from_block, timepoint, rate).await {
            Ok(events) => events,
            Err(e) => {
                warn!(from_block, error = %e, "Failed to fetch logs, cursor held");
                return last_block;
            }
        };

        if events.is_empty() {
            debug!(from_block, "No new events");
            return last_block;
        }

        if !events.windows(2).all(|w| w[0].position() <= w[1].position()) {
            warn!(from_block, count = events.len(), "Log batch out of order, sorting");
            events.sort_by_key(ChainEvent::position);
        }
        let last_event_block = events.last().map_or(last_block, ChainEvent::block_number);

        self.set_state(FetcherState::Persisting).await;
        match self.dispatcher.dispatch(&events, timepoint).await {
            Ok(count) => {
                info!(from_block, to_block = last_event_block, count, eth_usd = rate, "Stored events");
                last_event_block
            }
            Err(e) => {
                error!(
                    block = e.block_number,
                    tx_index = e.transaction_index,
                    error = %e.source,
                    "Batch stopped, will refetch from failing block"
                );
                e.block_number.saturating_sub(1)
            }
        }
    }

    /// Refreshes the observed chain head and mirrors it to the publisher.
    pub async fn fetch_current_block(&self) -> Result<ChainHead> {
        let block_number = self
            .blockchain
            .current_block()
            .await
            .context("Failed to fetch current block")?;
        let head = ChainHead {
            block_number,
            updated_at: timepoint_now(),
        };
        *self.chain_head.write().await = head;
        debug!(block = block_number, "Chain head updated");

        if let Some(publisher) = &self.publisher {
            let status = FetcherStatus {
                current_block: head.block_number,
                current_block_updated_at: head.updated_at,
                eth_usd: self.rate_cache.live_rate().await,
            };
            if let Err(e) = publisher.publish_status(&status).await {
                warn!(error = %e, "Failed to publish fetcher status");
            }
        }
        Ok(head)
    }
}

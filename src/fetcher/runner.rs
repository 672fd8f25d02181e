use crate::timeutil::timepoint_now;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Source of ingestion ticks.
#[async_trait]
pub trait FetcherRunner: Send + Sync {
    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    /// Next tick's timepoint, or `None` once stopped.
    async fn next_block_tick(&self) -> Option<u64>;
}

/// Emits a tick every `interval`. The channel holds one tick so a slow
/// consumer sees coalesced ticks instead of a backlog.
pub struct TickerRunner {
    interval: Duration,
    sender: Mutex<Option<mpsc::Sender<u64>>>,
    receiver: Mutex<mpsc::Receiver<u64>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TickerRunner {
    pub fn new(interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            interval,
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(rx),
            task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl FetcherRunner for TickerRunner {
    async fn start(&self) -> Result<()> {
        let sender = self
            .sender
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow!("runner already started"))?;
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match sender.try_send(timepoint_now()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => debug!("Tick coalesced"),
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        });
        *self.task.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        // Dropping the last sender ends the tick stream.
        self.sender.lock().await.take();
        Ok(())
    }

    async fn next_block_tick(&self) -> Option<u64> {
        self.receiver.lock().await.recv().await
    }
}

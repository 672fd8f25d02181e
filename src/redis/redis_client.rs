use crate::models::FetcherStatus;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{info, warn};

pub const STATUS_KEY: &str = "reserve_stats:status";

#[derive(Clone)]
pub struct RedisClient {
    pub connection: ConnectionManager,
}

impl RedisClient {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).context("Failed to create Redis client")?;

        let connection = ConnectionManager::new(client)
            .await
            .context("Failed to establish Redis connection")?;

        info!("Successfully connected to Redis");

        Ok(Self { connection })
    }

    pub async fn set<T: serde::Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value).context("Failed to serialize value")?;

        match self.connection.set::<_, _, ()>(key, json).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if e.is_connection_dropped() || e.is_io_error() {
                    warn!(key, "Redis connection lost, manager will reconnect");
                }
                Err(e).with_context(|| format!("Failed to set {}", key))
            }
        }
    }

    pub async fn ping(&mut self) -> Result<()> {
        redis::cmd("PING")
            .query_async::<String>(&mut self.connection)
            .await
            .context("Redis PING failed")?;
        Ok(())
    }
}

/// Destination for fetcher status snapshots.
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish_status(&self, status: &FetcherStatus) -> Result<()>;
}

/// Keeps the latest [`FetcherStatus`] under [`STATUS_KEY`].
pub struct RedisStatusPublisher {
    client: RedisClient,
}

impl RedisStatusPublisher {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusPublisher for RedisStatusPublisher {
    async fn publish_status(&self, status: &FetcherStatus) -> Result<()> {
        // ConnectionManager clones share one multiplexed connection.
        let mut client = self.client.clone();
        client.set(STATUS_KEY, status).await
    }
}

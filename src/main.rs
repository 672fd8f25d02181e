use anyhow::{Context, Result};
use futures_util::future::join_all;
use reserve_stats::chain::RpcBlockchain;
use reserve_stats::config::Config;
use reserve_stats::fetcher::{Fetcher, TickerRunner};
use reserve_stats::logging::init_tracing;
use reserve_stats::models::TokenRegistry;
use reserve_stats::rates::{RateCache, RateHistoryClient, TickerClient};
use reserve_stats::redis::{RedisClient, RedisStatusPublisher};
use reserve_stats::storage::{PgStorage, RamStorage, Storage};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    info!("Starting reserve stats fetcher");

    let config = Config::from_env()?;
    let tokens = Arc::new(TokenRegistry::load(&config.tokens_path)?);
    info!(count = tokens.len(), path = %config.tokens_path.display(), "Loaded token registry");

    let storage: Arc<dyn Storage> = match &config.database_url {
        Some(url) => Arc::new(PgStorage::connect(url).await?),
        None => {
            warn!("DATABASE_URL not set, using in-memory storage");
            Arc::new(RamStorage::new())
        }
    };

    let http = config.http_client()?;
    let blockchain = Arc::new(RpcBlockchain::new(
        http.clone(),
        config.node_url.clone(),
        vec![
            config.network_address,
            config.fee_burner_address,
            config.whitelist_address,
        ],
    ));
    let rate_cache = Arc::new(RateCache::new(
        storage.clone(),
        Arc::new(TickerClient::new(http.clone(), config.ticker_url.clone())),
        Arc::new(RateHistoryClient::new(http, config.rate_history_url.clone())),
    ));
    let runner = Arc::new(TickerRunner::new(config.block_interval));

    let mut fetcher = Fetcher::new(storage, blockchain, runner, rate_cache.clone(), tokens)
        .with_current_block_interval(config.current_block_interval);

    if let Some(url) = &config.redis_url {
        let mut client = RedisClient::new(url).await?;
        client.ping().await?;
        fetcher = fetcher.with_publisher(Arc::new(RedisStatusPublisher::new(client)));
    }
    let fetcher = Arc::new(fetcher);

    let shutdown = CancellationToken::new();

    // Ingestion holds its cursor until a live rate is known.
    match rate_cache.refresh_live_rate().await {
        Ok(usd) => info!(eth_usd = usd, "Initial live ETH rate loaded"),
        Err(e) => warn!(error = %e, "Initial live rate fetch failed"),
    }

    let refresher = {
        let rate_cache = rate_cache.clone();
        let shutdown = shutdown.clone();
        let interval = config.rate_refresh_interval;
        tokio::spawn(async move { rate_cache.run_eth_rate_refresher(interval, shutdown).await })
    };

    let mut handles = fetcher.clone().run(shutdown.clone()).await?;
    handles.push(refresher);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    shutdown.cancel();
    if let Err(e) = fetcher.stop().await {
        error!(error = %e, "Failed to stop runner cleanly");
    }

    for result in join_all(handles).await {
        if let Err(e) = result {
            error!(error = %e, "Task ended abnormally");
        }
    }

    info!("Fetcher stopped");
    Ok(())
}

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, TimeZone, Utc};
use reserve_stats::config::Config;
use reserve_stats::logging::init_tracing;
use reserve_stats::rates::{MonthWarmup, RateCache, RateHistoryClient, TickerClient};
use reserve_stats::storage::PgStorage;
use reserve_stats::timeutil::{from_timepoint, months_between, to_timepoint};
use std::sync::Arc;
use tracing::info;

const CONCURRENCY: usize = 4;

/// Parses `YYYY-MM` into the timepoint of that month's first instant.
fn parse_month(raw: &str) -> Result<u64> {
    let date = NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d")
        .with_context(|| format!("{} is not a YYYY-MM month", raw))?;
    let start = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("invalid month {}", raw))?;
    Ok(to_timepoint(Utc.from_utc_datetime(&start)))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (from, to) = match args.as_slice() {
        [from] => (parse_month(from)?, parse_month(from)?),
        [from, to] => (parse_month(from)?, parse_month(to)?),
        _ => return Err(anyhow!("usage: rate-backfill <YYYY-MM> [<YYYY-MM>]")),
    };
    if from > to {
        return Err(anyhow!("start month is after end month"));
    }

    let config = Config::from_env()?;
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set in .env for a backfill")?;
    let storage = Arc::new(PgStorage::connect(database_url).await?);

    let http = config.http_client()?;
    let cache = RateCache::new(
        storage,
        Arc::new(TickerClient::new(http.clone(), config.ticker_url.clone())),
        Arc::new(RateHistoryClient::new(http, config.rate_history_url.clone())),
    );

    let months = months_between(from, to);
    info!(count = months.len(), "Warming rate logs");

    let report = cache.warm_months(&months, CONCURRENCY).await;
    let mut failed = 0;
    for (month, outcome) in &report {
        let label = from_timepoint(*month).format("%Y-%m");
        match outcome {
            MonthWarmup::Stored(count) => println!("{}  stored {} samples", label, count),
            MonthWarmup::Failed(reason) => {
                failed += 1;
                println!("{}  FAILED: {}", label, reason);
            }
        }
    }

    if failed > 0 {
        return Err(anyhow!("{} of {} months failed", failed, report.len()));
    }
    Ok(())
}

use crate::models::RateSample;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

/// Current ETH/USD price.
#[async_trait]
pub trait LiveRateSource: Send + Sync {
    async fn fetch_eth_usd(&self) -> Result<f64>;
}

/// ETH/USD samples between two timepoints (milliseconds).
#[async_trait]
pub trait HistoricalRateSource: Send + Sync {
    async fn fetch_range(&self, from: u64, to: u64) -> Result<Vec<RateSample>>;
}

#[derive(Debug, Deserialize)]
struct TickerEntry {
    symbol: String,
    price_usd: Option<String>,
}

pub fn parse_ticker(body: &str) -> Result<f64> {
    let entries: Vec<TickerEntry> =
        serde_json::from_str(body).context("Failed to parse ticker response")?;
    let eth = entries
        .iter()
        .find(|e| e.symbol == "ETH")
        .ok_or_else(|| anyhow!("ticker has no ETH entry"))?;
    let raw = eth
        .price_usd
        .as_deref()
        .ok_or_else(|| anyhow!("ETH entry has no price_usd"))?;
    raw.trim()
        .parse::<f64>()
        .with_context(|| format!("ETH price {:?} is not a number", raw))
}

#[derive(Debug, Deserialize)]
struct RateHistory {
    price_usd: Vec<(f64, f64)>,
}

pub fn parse_rate_history(body: &str) -> Result<Vec<RateSample>> {
    let history: RateHistory =
        serde_json::from_str(body).context("Failed to parse rate history response")?;
    let mut samples: Vec<RateSample> = history
        .price_usd
        .into_iter()
        .filter(|(ts, _)| *ts >= 0.0)
        .map(|(ts, usd)| RateSample::new(ts as u64, usd))
        .collect();
    samples.sort_by_key(|s| s.timepoint);
    Ok(samples)
}

pub struct TickerClient {
    client: reqwest::Client,
    url: Url,
}

impl TickerClient {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl LiveRateSource for TickerClient {
    async fn fetch_eth_usd(&self) -> Result<f64> {
        let body = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .context("Ticker request failed")?
            .error_for_status()
            .context("Ticker returned an error status")?
            .text()
            .await
            .context("Failed to read ticker body")?;
        parse_ticker(&body)
    }
}

pub struct RateHistoryClient {
    client: reqwest::Client,
    base_url: Url,
}

impl RateHistoryClient {
    pub fn new(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    fn range_url(&self, from: u64, to: u64) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{}/{}/{}/", base, from, to)).context("Failed to build history URL")
    }
}

#[async_trait]
impl HistoricalRateSource for RateHistoryClient {
    async fn fetch_range(&self, from: u64, to: u64) -> Result<Vec<RateSample>> {
        let url = self.range_url(from, to)?;
        let body = self
            .client
            .get(url)
            .send()
            .await
            .context("Rate history request failed")?
            .error_for_status()
            .context("Rate history returned an error status")?
            .text()
            .await
            .context("Failed to read rate history body")?;
        parse_rate_history(&body)
    }
}

use alloy_primitives::Address;
use anyhow::{Context, Result, anyhow};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

const DEFAULT_TICKER_URL: &str = "https://api.coinmarketcap.com/v1/ticker/?convert=USD&limit=10";
const DEFAULT_RATE_HISTORY_URL: &str = "https://graphs2.coinmarketcap.com/currencies/ethereum/";
const DEFAULT_TOKENS_PATH: &str = "config/tokens.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub node_url: Url,
    pub network_address: Address,
    pub fee_burner_address: Address,
    pub whitelist_address: Address,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub tokens_path: PathBuf,
    pub block_interval: Duration,
    pub current_block_interval: Duration,
    pub rate_refresh_interval: Duration,
    pub ticker_url: Url,
    pub rate_history_url: Url,
    pub http_timeout: Duration,
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick
    /// up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{} must be set in .env", key))
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let address = |key: &str| -> Result<Address> {
            let raw = required(key)?;
            Address::from_str(raw.trim()).with_context(|| format!("{} is not a valid address", key))
        };
        let url_or = |key: &str, default: &str| -> Result<Url> {
            let raw = optional(key).unwrap_or_else(|| default.to_string());
            Url::parse(&raw).with_context(|| format!("{} is not a valid URL", key))
        };
        let number_or = |key: &str, default: u64| -> Result<u64> {
            match optional(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .with_context(|| format!("{} must be a non-negative integer", key)),
                None => Ok(default),
            }
        };
        let secs_or = |key: &str, default: u64| -> Result<Duration> {
            let secs = number_or(key, default)?;
            if secs == 0 {
                return Err(anyhow!("{} must be greater than zero", key));
            }
            Ok(Duration::from_secs(secs))
        };

        let node_url =
            Url::parse(&required("NODE_URL")?).context("NODE_URL is not a valid URL")?;

        Ok(Self {
            node_url,
            network_address: address("NETWORK_ADDRESS")?,
            fee_burner_address: address("FEE_BURNER_ADDRESS")?,
            whitelist_address: address("WHITELIST_ADDRESS")?,
            database_url: optional("DATABASE_URL"),
            redis_url: optional("REDIS_URL"),
            tokens_path: optional("TOKENS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKENS_PATH)),
            block_interval: secs_or("BLOCK_INTERVAL_SECS", 15)?,
            current_block_interval: secs_or("CURRENT_BLOCK_INTERVAL_SECS", 5)?,
            rate_refresh_interval: secs_or("RATE_REFRESH_INTERVAL_SECS", 3600)?,
            ticker_url: url_or("TICKER_URL", DEFAULT_TICKER_URL)?,
            rate_history_url: url_or("RATE_HISTORY_URL", DEFAULT_RATE_HISTORY_URL)?,
            http_timeout: secs_or("HTTP_TIMEOUT_SECS", 10)?,
        })
    }

    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.http_timeout)
            .build()
            .context("Failed to build HTTP client")
    }
}

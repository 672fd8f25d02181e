use super::Blockchain;
use super::log_parser::{EventTopics, RawLog, assemble_events, parse_quantity};
use crate::models::ChainEvent;
use alloy_primitives::Address;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

const MAX_RETRIES: u64 = 5;

#[derive(Debug, Deserialize)]
struct BlockHeader {
    timestamp: String,
}

/// JSON-RPC log source for the network, fee burner and whitelist contracts.
pub struct RpcBlockchain {
    client: reqwest::Client,
    node_url: Url,
    addresses: Vec<Address>,
    topics: EventTopics,
    request_id: AtomicU64,
}

impl RpcBlockchain {
    pub fn new(client: reqwest::Client, node_url: Url, addresses: Vec<Address>) -> Self {
        Self {
            client,
            node_url,
            addresses,
            topics: EventTopics::new(),
            request_id: AtomicU64::new(1),
        }
    }

    /// Sends one JSON-RPC request. Rate limits and transport errors are
    /// retried; an RPC error object fails straight away.
    async fn rpc_call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let mut attempt = 0;
        loop {
            attempt += 1;

            match self
                .client
                .post(self.node_url.clone())
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => {
                    if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        if attempt >= MAX_RETRIES {
                            return Err(anyhow!("{} rate limited {} times", method, attempt));
                        }
                        warn!(method, attempt, "Rate limited, cooling down");
                        sleep(Duration::from_secs(attempt * 2)).await;
                        continue;
                    }

                    let body: Value = resp
                        .json()
                        .await
                        .with_context(|| format!("Failed to parse {} response", method))?;

                    if let Some(error) = body.get("error") {
                        return Err(anyhow!("{} returned RPC error: {}", method, error));
                    }

                    let result = body
                        .get("result")
                        .cloned()
                        .ok_or_else(|| anyhow!("{} response has no result", method))?;
                    return serde_json::from_value(result)
                        .with_context(|| format!("Unexpected {} result shape", method));
                }
                Err(e) => {
                    if attempt >= MAX_RETRIES {
                        return Err(e).with_context(|| format!("{} failed after {} attempts", method, attempt));
                    }
                    warn!(method, attempt, error = %e, "Network error, retrying");
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn block_times(&self, logs: &[RawLog]) -> Result<HashMap<u64, u64>> {
        let blocks: BTreeSet<u64> = logs
            .iter()
            .filter(|l| !l.removed)
            .filter_map(|l| parse_quantity(&l.block_number).ok())
            .collect();

        let mut times = HashMap::with_capacity(blocks.len());
        for block in blocks {
            let header: Option<BlockHeader> = self
                .rpc_call("eth_getBlockByNumber", json!([format!("0x{:x}", block), false]))
                .await?;
            let header = header.ok_or_else(|| anyhow!("block {} not found", block))?;
            let secs = parse_quantity(&header.timestamp)
                .with_context(|| format!("bad timestamp for block {}", block))?;
            times.insert(block, secs * 1000);
        }
        Ok(times)
    }
}

#[async_trait]
impl Blockchain for RpcBlockchain {
    async fn current_block(&self) -> Result<u64> {
        let raw: String = self.rpc_call("eth_blockNumber", json!([])).await?;
        parse_quantity(&raw)
    }

    async fn get_logs(
        &self,
        from_block: u64,
        _timepoint: u64,
        usd_rate: f64,
    ) -> Result<Vec<ChainEvent>> {
        let head = self.current_block().await?;
        if from_block > head {
            debug!(from_block, head, "Nothing new on chain");
            return Ok(Vec::new());
        }

        let filter = json!([{
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", head),
            "address": self.addresses,
            "topics": [self.topics.all().to_vec()],
        }]);
        let logs: Vec<RawLog> = self.rpc_call("eth_getLogs", filter).await?;
        info!(from_block, to_block = head, count = logs.len(), "Fetched raw logs");

        let times = self.block_times(&logs).await?;
        assemble_events(&logs, &times, &self.topics, usd_rate)
    }
}

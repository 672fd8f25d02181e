use crate::models::{Frequency, Metric};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Storing trade log failed: {0:#}")]
    StoreTradeLog(anyhow::Error),

    #[error("Storing category log failed: {0:#}")]
    StoreCategoryLog(anyhow::Error),

    #[error("Setting {metric} stats at frequency {frequency} failed: {source:#}")]
    SetTradeStats {
        metric: Metric,
        frequency: Frequency,
        source: anyhow::Error,
    },
}

/// Where in a batch dispatch stopped, and why.
#[derive(Error, Debug)]
#[error("Dispatch aborted at block {block_number} (tx index {transaction_index}): {source}")]
pub struct DispatchError {
    pub block_number: u64,
    pub transaction_index: u64,
    #[source]
    pub source: StatsError,
}

use serde::{Deserialize, Serialize};

/// One historical ETH/USD price point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateSample {
    pub timepoint: u64,
    pub usd: f64,
}

impl RateSample {
    pub fn new(timepoint: u64, usd: f64) -> Self {
        Self { timepoint, usd }
    }
}

/// Rate of the earliest sample at or after `timepoint`, or zero when the log
/// holds no such sample.
pub fn find_rate(samples: &[RateSample], timepoint: u64) -> f64 {
    samples
        .iter()
        .find(|s| s.timepoint >= timepoint)
        .map(|s| s.usd)
        .unwrap_or(0.0)
}

/// Latest observed chain head; reporting only, never the ingestion cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub block_number: u64,
    pub updated_at: u64,
}

/// Snapshot mirrored to Redis for the reporting surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetcherStatus {
    pub current_block: u64,
    pub current_block_updated_at: u64,
    pub eth_usd: f64,
}

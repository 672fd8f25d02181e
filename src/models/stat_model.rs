use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Dimension key (lower-cased address or composite) to accumulated value.
pub type TradeStats = HashMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    AssetsVolume,
    BurnFee,
    WalletFee,
    UserVolume,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::AssetsVolume,
        Metric::BurnFee,
        Metric::WalletFee,
        Metric::UserVolume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::AssetsVolume => "assets_volume",
            Metric::BurnFee => "burn_fee",
            Metric::WalletFee => "wallet_fee",
            Metric::UserVolume => "user_volume",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time resolution a stat is accumulated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Frequency {
    #[serde(rename = "M")]
    Minute,
    #[serde(rename = "H")]
    Hour,
    #[serde(rename = "D")]
    Day,
}

impl Frequency {
    pub const ALL: [Frequency; 3] = [Frequency::Minute, Frequency::Hour, Frequency::Day];

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Minute => "M",
            Frequency::Hour => "H",
            Frequency::Day => "D",
        }
    }

    pub fn bucket_millis(&self) -> u64 {
        match self {
            Frequency::Minute => 60_000,
            Frequency::Hour => 3_600_000,
            Frequency::Day => 86_400_000,
        }
    }

    /// Aligns a millisecond timestamp to the start of its bucket.
    pub fn bucket(&self, timestamp: u64) -> u64 {
        timestamp - timestamp % self.bucket_millis()
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricUpdate {
    pub metric: Metric,
    pub stats: TradeStats,
}

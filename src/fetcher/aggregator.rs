use crate::error::StatsError;
use crate::models::{
    ETH_ADDRESS, ETH_DECIMALS, Frequency, Metric, MetricUpdate, TokenRegistry, TradeLog,
    TradeStats, addr_to_string, scale_amount,
};
use crate::storage::Storage;
use alloy_primitives::{Address, U256};
use std::sync::Arc;
use tracing::{debug, warn};

fn token_amount(tokens: &TokenRegistry, token: &Address, amount: U256) -> f64 {
    let decimals = tokens
        .decimals(token)
        .or_else(|| (*token == ETH_ADDRESS).then_some(ETH_DECIMALS));
    match decimals {
        Some(decimals) => scale_amount(amount, decimals),
        None => {
            warn!(token = %token, "Token missing from registry, counting zero volume");
            0.0
        }
    }
}

fn fee_amount(fee: Option<U256>) -> f64 {
    fee.map(|f| scale_amount(f, ETH_DECIMALS)).unwrap_or(0.0)
}

/// Splits one trade into its four metric families.
pub fn aggregate(trade: &TradeLog, tokens: &TokenRegistry) -> [MetricUpdate; 4] {
    let mut assets = TradeStats::new();
    *assets.entry(addr_to_string(&trade.src_address)).or_insert(0.0) +=
        token_amount(tokens, &trade.src_address, trade.src_amount);
    *assets.entry(addr_to_string(&trade.dest_address)).or_insert(0.0) +=
        token_amount(tokens, &trade.dest_address, trade.dest_amount);

    let mut burn = TradeStats::new();
    let mut wallet = TradeStats::new();
    let primary = (trade.reserve_address, trade.wallet_address, trade.burn_fee, trade.wallet_fee);
    let extra = trade
        .extra_fees
        .iter()
        .map(|f| (f.reserve_address, f.wallet_address, f.burn_fee, f.wallet_fee));
    for (reserve, wallet_address, burn_fee, wallet_fee) in std::iter::once(primary).chain(extra) {
        let reserve = addr_to_string(&reserve);
        let wallet_key = format!("{}_{}", reserve, addr_to_string(&wallet_address));
        *burn.entry(reserve).or_insert(0.0) += fee_amount(burn_fee);
        *wallet.entry(wallet_key).or_insert(0.0) += fee_amount(wallet_fee);
    }

    [
        MetricUpdate {
            metric: Metric::AssetsVolume,
            stats: assets,
        },
        MetricUpdate {
            metric: Metric::BurnFee,
            stats: burn,
        },
        MetricUpdate {
            metric: Metric::WalletFee,
            stats: wallet,
        },
        MetricUpdate {
            metric: Metric::UserVolume,
            stats: TradeStats::from([(addr_to_string(&trade.user_address), trade.fiat_amount)]),
        },
    ]
}

/// Writes a trade's metric updates at every frequency.
pub struct StatsAggregator {
    storage: Arc<dyn Storage>,
    tokens: Arc<TokenRegistry>,
}

impl StatsAggregator {
    pub fn new(storage: Arc<dyn Storage>, tokens: Arc<TokenRegistry>) -> Self {
        Self { storage, tokens }
    }

    /// Stops at the first failed write; earlier writes stay applied.
    pub async fn store(&self, trade: &TradeLog) -> Result<(), StatsError> {
        for update in aggregate(trade, &self.tokens) {
            for frequency in Frequency::ALL {
                self.storage
                    .set_trade_stats(update.metric, frequency, trade.timestamp, &update.stats)
                    .await
                    .map_err(|source| StatsError::SetTradeStats {
                        metric: update.metric,
                        frequency,
                        source,
                    })?;
            }
        }
        debug!(tx = %trade.tx_hash, block = trade.block_number, "Stored trade stats");
        Ok(())
    }
}

use super::aggregator::StatsAggregator;
use crate::error::{DispatchError, StatsError};
use crate::models::ChainEvent;
use crate::storage::Storage;
use std::sync::Arc;
use tracing::{error, trace};

/// Routes an ordered batch of events to storage and aggregation.
pub struct LogDispatcher {
    storage: Arc<dyn Storage>,
    aggregator: StatsAggregator,
}

impl LogDispatcher {
    pub fn new(storage: Arc<dyn Storage>, aggregator: StatsAggregator) -> Self {
        Self {
            storage,
            aggregator,
        }
    }

    /// Returns how many events were handled, or where the batch stopped.
    pub async fn dispatch(
        &self,
        events: &[ChainEvent],
        timepoint: u64,
    ) -> Result<usize, DispatchError> {
        for (handled, event) in events.iter().enumerate() {
            trace!(kind = event.kind().as_str(), block = event.block_number(), "Dispatching event");

            let outcome = match event {
                ChainEvent::Trade(trade) => match self.storage.store_trade_log(trade, timepoint).await {
                    Ok(()) => self.aggregator.store(trade).await,
                    Err(e) => Err(StatsError::StoreTradeLog(e)),
                },
                ChainEvent::Category(category) => self
                    .storage
                    .store_category_log(category)
                    .await
                    .map_err(StatsError::StoreCategoryLog),
            };

            if let Err(source) = outcome {
                error!(
                    block = event.block_number(),
                    tx_index = event.transaction_index(),
                    handled,
                    error = %source,
                    "Aborting batch"
                );
                return Err(DispatchError {
                    block_number: event.block_number(),
                    transaction_index: event.transaction_index(),
                    source,
                });
            }
        }
        Ok(events.len())
    }
}

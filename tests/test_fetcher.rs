mod common;

use common::mocks::{
    CountingHistorySource, CountingLiveSource, FlakyStorage, ManualRunner, MockBlockchain,
    RecordingPublisher,
};
use common::{RESERVE, TRADE_TIME, USER, category, registry, trade};
use reserve_stats::fetcher::{Fetcher, FetcherState};
use reserve_stats::models::{ChainEvent, Frequency, Metric};
use reserve_stats::rates::RateCache;
use reserve_stats::storage::Storage;
use reserve_stats::timeutil::timepoint_now;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const ETH_USD: f64 = 500.0;

struct Harness {
    storage: Arc<FlakyStorage>,
    chain: Arc<MockBlockchain>,
    runner: Arc<ManualRunner>,
    fetcher: Fetcher,
}

async fn harness(last_block: u64) -> Harness {
    harness_with_live_rate(last_block, Some(ETH_USD)).await
}

async fn harness_with_live_rate(last_block: u64, live_rate: Option<f64>) -> Harness {
    let storage = Arc::new(FlakyStorage::with_last_block(last_block).await);
    let chain = Arc::new(MockBlockchain::new());
    let runner = Arc::new(ManualRunner::new());
    let cache = Arc::new(RateCache::new(
        storage.clone(),
        Arc::new(CountingLiveSource::new(ETH_USD)),
        Arc::new(CountingHistorySource::new()),
    ));
    if let Some(rate) = live_rate {
        cache.set_live_rate(rate).await;
    }

    let fetcher = Fetcher::new(
        storage.clone(),
        chain.clone(),
        runner.clone(),
        cache,
        Arc::new(registry()),
    );
    Harness {
        storage,
        chain,
        runner,
        fetcher,
    }
}

async fn cursor(h: &Harness) -> u64 {
    h.storage.inner.last_block().await.unwrap()
}

#[tokio::test]
async fn test_full_batch_advances_cursor_to_last_event() {
    let h = harness(100).await;
    h.chain
        .push_batch(vec![trade(101, 0), trade(101, 1), trade(102, 0)]);
    let tick = timepoint_now();

    h.fetcher.run_cycle(tick).await;

    assert_eq!(cursor(&h).await, 102);
    assert_eq!(h.storage.inner.cursor_updated_at().await, tick);
    assert_eq!(h.chain.requests(), vec![(101, ETH_USD)]);
    assert_eq!(h.storage.inner.trade_logs().await.len(), 3);
    assert_eq!(h.fetcher.state().await, FetcherState::Idle);
}

#[tokio::test]
async fn test_partial_failure_resumes_before_failing_block() {
    let h = harness(100).await;
    *h.storage.fail_trade_block.lock().unwrap() = Some(102);
    h.chain
        .push_batch(vec![trade(101, 0), trade(101, 1), trade(102, 0)]);

    h.fetcher.run_cycle(timepoint_now()).await;

    assert_eq!(cursor(&h).await, 101);
    let stored: Vec<u64> = h
        .storage
        .inner
        .trade_logs()
        .await
        .iter()
        .map(|t| t.block_number)
        .collect();
    assert_eq!(stored, vec![101, 101]);
    // Both 101 trades were fully aggregated before the abort.
    assert_eq!(h.storage.stats_calls.load(Ordering::SeqCst), 24);
}

#[tokio::test]
async fn test_empty_batch_keeps_cursor() {
    let h = harness(100).await;
    h.chain.push_batch(Vec::new());

    h.fetcher.run_cycle(timepoint_now()).await;

    assert_eq!(cursor(&h).await, 100);
    assert_eq!(h.storage.cursor_writes(), vec![100]);
}

#[tokio::test]
async fn test_fetch_error_keeps_cursor() {
    let h = harness(100).await;
    h.chain.push_error("rpc timeout");

    h.fetcher.run_cycle(timepoint_now()).await;

    assert_eq!(cursor(&h).await, 100);
    assert_eq!(h.storage.cursor_writes(), vec![100]);
}

#[tokio::test]
async fn test_fetch_error_on_cold_start_stays_at_zero() {
    let h = harness(0).await;
    h.chain.push_error("rpc timeout");

    h.fetcher.run_cycle(timepoint_now()).await;

    assert_eq!(h.chain.requests()[0].0, 1);
    assert_eq!(cursor(&h).await, 0);
}

#[tokio::test]
async fn test_unknown_rate_holds_cursor_without_fetching() {
    let h = harness_with_live_rate(100, None).await;
    h.chain.push_batch(vec![trade(101, 0)]);

    h.fetcher.run_cycle(timepoint_now()).await;

    assert!(h.chain.requests().is_empty());
    assert_eq!(cursor(&h).await, 100);
    assert!(h.storage.inner.trade_logs().await.is_empty());
    assert_eq!(h.fetcher.state().await, FetcherState::Idle);
}

#[tokio::test]
async fn test_state_is_persisting_while_events_are_written() {
    let h = harness(100).await;
    h.storage.hold_trade_store.store(true, Ordering::SeqCst);
    h.chain.push_batch(vec![trade(101, 0)]);

    let observe = async {
        h.storage.trade_store_entered.notified().await;
        let state = h.fetcher.state().await;
        h.storage.trade_store_release.notify_one();
        state
    };
    let ((), during) = tokio::join!(h.fetcher.run_cycle(timepoint_now()), observe);

    assert_eq!(during, FetcherState::Persisting);
    assert_eq!(cursor(&h).await, 101);
    assert_eq!(h.fetcher.state().await, FetcherState::Idle);
}

#[tokio::test]
async fn test_cursor_read_failure_skips_cycle() {
    let h = harness(100).await;
    h.storage.fail_last_block.store(true, Ordering::SeqCst);
    h.chain.push_batch(vec![trade(101, 0)]);

    h.fetcher.run_cycle(timepoint_now()).await;

    assert!(h.chain.requests().is_empty());
    assert!(h.storage.cursor_writes().is_empty());
    assert_eq!(h.fetcher.state().await, FetcherState::Idle);
}

#[tokio::test]
async fn test_cursor_write_failure_is_not_fatal() {
    let h = harness(100).await;
    h.storage.fail_cursor_write.store(true, Ordering::SeqCst);
    h.chain.push_batch(vec![trade(101, 0)]);

    h.fetcher.run_cycle(timepoint_now()).await;

    assert_eq!(h.storage.cursor_writes(), vec![101]);
    assert_eq!(cursor(&h).await, 100);
    assert_eq!(h.storage.inner.trade_logs().await.len(), 1);
    assert_eq!(h.fetcher.state().await, FetcherState::Idle);
}

#[tokio::test]
async fn test_one_trade_makes_twelve_stat_writes() {
    let h = harness(100).await;
    h.chain.push_batch(vec![trade(101, 0)]);

    h.fetcher.run_cycle(timepoint_now()).await;

    assert_eq!(h.storage.stats_calls.load(Ordering::SeqCst), 12);
    for metric in Metric::ALL {
        for freq in Frequency::ALL {
            assert!(
                h.storage.inner.trade_stats(metric, freq, TRADE_TIME).await.is_some(),
                "no {} stats at {}",
                metric,
                freq
            );
        }
    }
}

#[tokio::test]
async fn test_stat_failure_aborts_at_that_trade() {
    let h = harness(100).await;
    *h.storage.fail_stats_after.lock().unwrap() = Some(5);
    h.chain.push_batch(vec![trade(101, 0), trade(102, 0)]);

    h.fetcher.run_cycle(timepoint_now()).await;

    assert_eq!(h.storage.stats_calls.load(Ordering::SeqCst), 5);
    assert_eq!(cursor(&h).await, 100);
    assert_eq!(h.storage.inner.trade_logs().await.len(), 1);
}

#[tokio::test]
async fn test_replayed_trade_doubles_totals_once_stored() {
    let h = harness(100).await;
    h.chain.push_batch(vec![trade(101, 0)]);
    h.chain.push_batch(vec![trade(101, 0)]);

    h.fetcher.run_cycle(timepoint_now()).await;
    h.fetcher.run_cycle(timepoint_now()).await;

    let users = h
        .storage
        .inner
        .trade_stats(Metric::UserVolume, Frequency::Day, TRADE_TIME)
        .await
        .unwrap();
    assert_eq!(users[USER], 1000.0);
    assert_eq!(h.storage.inner.trade_logs().await.len(), 1);
}

#[tokio::test]
async fn test_missing_burn_fee_records_zero() {
    let h = harness(100).await;
    let mut event = trade(101, 0);
    if let ChainEvent::Trade(t) = &mut event {
        t.burn_fee = None;
    }
    h.chain.push_batch(vec![event]);

    h.fetcher.run_cycle(timepoint_now()).await;

    let burn = h
        .storage
        .inner
        .trade_stats(Metric::BurnFee, Frequency::Hour, TRADE_TIME)
        .await
        .unwrap();
    assert_eq!(burn[RESERVE], 0.0);
}

#[tokio::test]
async fn test_out_of_order_batch_is_sorted_before_dispatch() {
    let h = harness(100).await;
    *h.storage.fail_trade_block.lock().unwrap() = Some(102);
    h.chain.push_batch(vec![trade(102, 0), trade(101, 0)]);

    h.fetcher.run_cycle(timepoint_now()).await;

    assert_eq!(cursor(&h).await, 101);
    assert_eq!(h.storage.inner.trade_logs().await[0].block_number, 101);
}

#[tokio::test]
async fn test_category_events_are_stored_not_aggregated() {
    let h = harness(100).await;
    h.chain.push_batch(vec![category(101, 0), trade(103, 2)]);

    h.fetcher.run_cycle(timepoint_now()).await;

    assert_eq!(cursor(&h).await, 103);
    assert_eq!(h.storage.inner.category_logs().await.len(), 1);
    assert_eq!(h.storage.stats_calls.load(Ordering::SeqCst), 12);
}

#[tokio::test]
async fn test_chain_head_refresh_publishes_status() {
    let h = harness(100).await;
    let publisher = Arc::new(RecordingPublisher::default());
    let fetcher = h.fetcher.with_publisher(publisher.clone());
    h.chain.head.store(5_000_000, Ordering::SeqCst);

    let head = fetcher.fetch_current_block().await.unwrap();
    assert_eq!(head.block_number, 5_000_000);
    assert_eq!(fetcher.current_block().await, head);

    let published = publisher.published.lock().unwrap().clone();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].current_block, 5_000_000);
    assert_eq!(published[0].eth_usd, ETH_USD);

    // Failures leave the last head in place and never touch the cursor.
    h.chain.head_fails.store(true, Ordering::SeqCst);
    assert!(fetcher.fetch_current_block().await.is_err());
    assert_eq!(fetcher.current_block().await, head);
    assert!(h.storage.cursor_writes().is_empty());
}

#[tokio::test]
async fn test_run_consumes_ticks_until_shutdown() {
    let h = harness(100).await;
    h.chain.head.store(150, Ordering::SeqCst);
    h.chain.push_batch(vec![trade(101, 0)]);
    h.chain.push_batch(vec![trade(104, 0)]);

    let storage = h.storage.clone();
    let runner = h.runner.clone();
    let fetcher = Arc::new(
        h.fetcher
            .with_current_block_interval(Duration::from_millis(10)),
    );
    let shutdown = CancellationToken::new();
    let handles = fetcher.clone().run(shutdown.clone()).await.unwrap();
    assert!(runner.started.load(Ordering::SeqCst));

    runner.tick(timepoint_now());
    runner.tick(timepoint_now());

    let mut advanced = false;
    for _ in 0..200 {
        if storage.inner.last_block().await.unwrap() == 104 {
            advanced = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(advanced, "cursor never reached 104");
    assert_eq!(storage.cursor_writes(), vec![101, 104]);

    shutdown.cancel();
    fetcher.stop().await.unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(fetcher.current_block().await.block_number, 150);
}

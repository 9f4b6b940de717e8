use std::sync::Arc;
use std::time::Duration;

use candlekeep::{CollectorError, DataSource, Timeframe};
use candlekeep_mock::{MemoryStorage, MockBehavior, MockExchange};
use tokio_util::sync::CancellationToken;

use crate::helpers::{BTC, ETH, builder, edge, harness, minutes_before, range};

#[tokio::test]
async fn identical_request_is_served_from_cache() {
    let exchange = MockExchange::new();
    exchange
        .set_series(BTC, Timeframe::M1, minutes_before(100_000))
        .await;
    let storage = Arc::new(MemoryStorage::new());
    let collector = builder(&exchange, storage)
        .cache_ttl(Duration::from_secs(60))
        .build()
        .unwrap();
    let req = range(minutes_before(200), edge());

    let first = collector.collect_all(BTC, Timeframe::M1, req).await.unwrap();
    assert_eq!(first.data_source, DataSource::Api);
    assert_eq!(exchange.call_count(), 1);

    let second = collector.collect_all(BTC, Timeframe::M1, req).await.unwrap();
    assert_eq!(second.data_source, DataSource::Cache);
    assert_eq!(second.candles, first.candles);
    assert_eq!(exchange.call_count(), 1);

    collector.invalidate_cache();
    let third = collector.collect_all(BTC, Timeframe::M1, req).await.unwrap();
    assert_eq!(third.data_source, DataSource::Db);
    assert_eq!(exchange.call_count(), 1);
}

#[tokio::test]
async fn failed_aggregate_is_not_cached() {
    let exchange = MockExchange::new();
    exchange
        .set_series(BTC, Timeframe::M1, minutes_before(100_000))
        .await;
    let storage = Arc::new(MemoryStorage::new());
    storage.set_fail_upserts(true);
    let collector = builder(&exchange, storage.clone())
        .cache_ttl(Duration::from_secs(60))
        .build()
        .unwrap();
    let req = range(minutes_before(200), edge());

    let first = collector.collect_all(BTC, Timeframe::M1, req).await.unwrap();
    assert!(!first.success);

    storage.set_fail_upserts(false);
    let second = collector.collect_all(BTC, Timeframe::M1, req).await.unwrap();
    assert!(second.success);
    assert_eq!(second.data_source, DataSource::Api);
    assert_eq!(exchange.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_collection_stops_it() {
    let h = harness(minutes_before(100_000)).await;
    h.exchange.script(MockBehavior::Hang).await;

    let collection = h
        .collector
        .collect(BTC, Timeframe::M1, range(minutes_before(400), edge()));
    collection.cancel();

    let err = collection.finish().await.unwrap_err();
    assert_eq!(err, CollectorError::Cancelled);
    assert!(h.storage.candles(BTC, Timeframe::M1).is_empty());
}

#[tokio::test(start_paused = true)]
async fn caller_token_cancels_request() {
    let h = harness(minutes_before(100_000)).await;
    h.exchange.script(MockBehavior::Hang).await;
    let token = CancellationToken::new();

    let collection = h.collector.collect_with_cancel(
        BTC,
        Timeframe::M1,
        range(minutes_before(200), edge()),
        &token,
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();

    assert_eq!(collection.finish().await.unwrap_err(), CollectorError::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_in_flight_requests() {
    let h = harness(minutes_before(100_000)).await;
    h.exchange.script(MockBehavior::Hang).await;

    let collection = h
        .collector
        .collect(BTC, Timeframe::M1, range(minutes_before(200), edge()));
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.collector.shutdown().await;

    assert_eq!(collection.finish().await.unwrap_err(), CollectorError::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn overall_deadline_times_out() {
    let exchange = MockExchange::new();
    exchange
        .set_series(BTC, Timeframe::M1, minutes_before(100_000))
        .await;
    exchange.script(MockBehavior::Hang).await;
    let collector = builder(&exchange, Arc::new(MemoryStorage::new()))
        .request_timeout(Duration::from_secs(1))
        .build()
        .unwrap();

    let err = collector
        .collect_all(BTC, Timeframe::M1, range(minutes_before(200), edge()))
        .await
        .unwrap_err();

    assert!(matches!(err, CollectorError::Timeout(_)), "{err:?}");
}

#[tokio::test]
async fn independent_requests_run_together() {
    let h = harness(minutes_before(100_000)).await;
    h.exchange
        .set_series(ETH, Timeframe::M1, minutes_before(100_000))
        .await;

    let results = h
        .collector
        .collect_many([
            (BTC, Timeframe::M1, range(minutes_before(300), edge())),
            (ETH, Timeframe::M1, range(minutes_before(100), edge())),
            ("KRW-NOPE", Timeframe::M1, range(minutes_before(100), edge())),
        ])
        .await;

    assert_eq!(results.len(), 3);
    let btc = results[0].as_ref().unwrap();
    let eth = results[1].as_ref().unwrap();
    let nope = results[2].as_ref().unwrap();
    assert_eq!(btc.total_count, 300);
    assert!(btc.candles.iter().all(|c| c.symbol == BTC));
    assert_eq!(eth.total_count, 100);
    assert!(eth.candles.iter().all(|c| c.symbol == ETH));
    assert!(!nope.success);
    assert_eq!(h.storage.candles(ETH, Timeframe::M1).len(), 100);
}

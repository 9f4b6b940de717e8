use candlekeep::{ChunkStatus, Timeframe};
use candlekeep_mock::fixtures;
use chrono::TimeDelta;
use rust_decimal::Decimal;

use crate::helpers::{BTC, assert_contiguous, edge, harness, minutes_before, range};

fn meta<'a>(resp: &'a candlekeep::CollectResponse, key: &str) -> Option<&'a str> {
    resp.chunks[0].metadata.get(key).map(String::as_str)
}

#[tokio::test]
async fn missing_slot_is_flat_filled_from_previous_close() {
    let h = harness(minutes_before(100_000)).await;
    let hole = minutes_before(50);
    h.exchange.add_holes(BTC, Timeframe::M1, &[hole]).await;

    let resp = h
        .collector
        .collect_all(BTC, Timeframe::M1, range(minutes_before(200), edge()))
        .await
        .unwrap();

    assert_eq!(resp.total_count, 200);
    assert_contiguous(&resp.candles, Timeframe::M1);
    let filled: Vec<_> = resp.candles.iter().filter(|c| c.synthetic).collect();
    assert_eq!(filled.len(), 1);
    let filled = filled[0];
    let previous = fixtures::candle(BTC, Timeframe::M1, minutes_before(51));
    assert_eq!(filled.utc_time, hole);
    assert_eq!(filled.open, previous.close);
    assert_eq!(filled.high, previous.close);
    assert_eq!(filled.low, previous.close);
    assert_eq!(filled.close, previous.close);
    assert_eq!(filled.volume, Decimal::ZERO);
    assert_eq!(filled.local_time, (hole + TimeDelta::hours(9)).naive_utc());

    assert_eq!(meta(&resp, "synthetic_count"), Some("1"));
    assert_eq!(meta(&resp, "received_count"), Some("200"));
    let stored = h.storage.candles(BTC, Timeframe::M1);
    assert!(stored.iter().any(|c| c.utc_time == hole && c.synthetic));
}

#[tokio::test]
async fn invalid_candle_is_dropped_and_replaced() {
    let h = harness(minutes_before(100_000)).await;
    let broken = minutes_before(10);
    h.exchange.break_candle(BTC, Timeframe::M1, broken).await;

    let resp = h
        .collector
        .collect_all(BTC, Timeframe::M1, range(minutes_before(200), edge()))
        .await
        .unwrap();

    assert_eq!(resp.chunks[0].status, ChunkStatus::Success);
    assert_eq!(meta(&resp, "invalid_dropped"), Some("1"));
    assert!(meta(&resp, "invalid_reason").is_some());
    let replaced = resp.candles.iter().find(|c| c.utc_time == broken).unwrap();
    assert!(replaced.synthetic);
    assert!(replaced.validate().is_ok());
    assert!(resp.candles.iter().all(|c| c.validate().is_ok()));
}

#[tokio::test]
async fn duplicate_is_dropped_and_displaced_slot_filled() {
    let h = harness(minutes_before(100_000)).await;
    h.exchange
        .duplicate_candle(BTC, Timeframe::M1, minutes_before(10))
        .await;

    let resp = h
        .collector
        .collect_all(BTC, Timeframe::M1, range(minutes_before(200), edge()))
        .await
        .unwrap();

    assert_eq!(meta(&resp, "duplicates_dropped"), Some("1"));
    assert_eq!(meta(&resp, "synthetic_count"), Some("1"));
    assert_eq!(resp.total_count, 200);
    assert_contiguous(&resp.candles, Timeframe::M1);

    // The duplicate pushed the oldest slot off the page; it opens at the next real open.
    let oldest = &resp.candles[0];
    assert_eq!(oldest.utc_time, minutes_before(200));
    assert!(oldest.synthetic);
    let next = fixtures::candle(BTC, Timeframe::M1, minutes_before(199));
    assert_eq!(oldest.close, next.open);
}

#[tokio::test]
async fn saved_count_mismatch_is_noted_not_failed() {
    let h = harness(minutes_before(100_000)).await;
    h.storage.set_short_saves(1);

    let resp = h
        .collector
        .collect_all(BTC, Timeframe::M1, range(minutes_before(200), edge()))
        .await
        .unwrap();

    assert!(resp.success);
    assert!(resp.error_message.is_none());
    let chunk = &resp.chunks[0];
    assert_eq!(chunk.status, ChunkStatus::Success);
    assert_eq!(chunk.saved_count, 199);
    assert_eq!(
        chunk.metadata.get("saved_mismatch").map(String::as_str),
        Some("expected 200 saved 199")
    );
}

#[tokio::test]
async fn chunk_size_controls_page_size() {
    let exchange = candlekeep_mock::MockExchange::new();
    exchange
        .set_series(BTC, Timeframe::M1, minutes_before(100_000))
        .await;
    let storage = std::sync::Arc::new(candlekeep_mock::MemoryStorage::new());
    let collector = crate::helpers::builder(&exchange, storage)
        .chunk_size(50)
        .build()
        .unwrap();

    let resp = collector
        .collect_all(BTC, Timeframe::M1, range(minutes_before(120), edge()))
        .await
        .unwrap();

    let counts: Vec<u16> = exchange.queries().await.iter().map(|q| q.count).collect();
    assert_eq!(counts, vec![50, 50, 20]);
    assert_eq!(resp.total_count, 120);
}

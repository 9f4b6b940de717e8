use candlekeep::{ChunkStatus, DataSource, Timeframe};

use crate::helpers::{BTC, assert_contiguous, edge, harness, minutes_before, range};

#[tokio::test]
async fn short_page_stops_pagination() {
    let h = harness(minutes_before(250)).await;

    let mut collection = h
        .collector
        .collect(BTC, Timeframe::M1, range(minutes_before(1_000), edge()));
    let mut streamed = Vec::new();
    while let Some(chunk) = collection.next_chunk().await {
        streamed.push((chunk.index, chunk.status));
    }
    let resp = collection.finish().await.unwrap();

    assert_eq!(
        streamed,
        vec![(0, ChunkStatus::Success), (1, ChunkStatus::EarlyExit)]
    );
    assert_eq!(h.exchange.call_count(), 2);
    assert!(resp.success);
    assert_eq!(resp.data_source, DataSource::Api);
    assert_eq!(resp.total_count, 250);
    assert_eq!(resp.candles[0].utc_time, minutes_before(250));
    assert!(resp.candles.iter().all(|c| !c.synthetic));
    assert_contiguous(&resp.candles, Timeframe::M1);

    let exit = &resp.chunks[0];
    assert_eq!(exit.index, 1);
    assert_eq!(
        exit.metadata.get("early_exit").map(String::as_str),
        Some("provider_data_end")
    );
    assert_eq!(
        exit.metadata.get("received_count").map(String::as_str),
        Some("50")
    );
}

#[tokio::test]
async fn empty_page_ends_without_storing() {
    let h = harness(minutes_before(200)).await;

    let resp = h
        .collector
        .collect_all(BTC, Timeframe::M1, range(minutes_before(400), edge()))
        .await
        .unwrap();

    assert_eq!(h.exchange.call_count(), 2);
    assert_eq!(h.storage.upsert_calls(), 1);
    assert_eq!(resp.total_count, 200);

    let exit = &resp.chunks[0];
    assert_eq!(exit.index, 1);
    assert_eq!(exit.status, ChunkStatus::EarlyExit);
    assert_eq!(exit.saved_count, 0);
}

#[tokio::test]
async fn symbol_without_any_history_exits_on_first_chunk() {
    let h = harness(edge()).await;

    let resp = h
        .collector
        .collect_all(BTC, Timeframe::M1, range(minutes_before(600), edge()))
        .await
        .unwrap();

    assert_eq!(h.exchange.call_count(), 1);
    assert!(resp.success);
    assert!(resp.candles.is_empty());
    assert_eq!(resp.chunks.len(), 1);
    assert_eq!(resp.chunks[0].status, ChunkStatus::EarlyExit);
}

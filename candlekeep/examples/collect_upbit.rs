//! Collect the last few hours of KRW-BTC minute candles from Upbit into an
//! in-memory store, then read a live ticker.
//!
//! Run with `RUST_LOG=info,candlekeep=debug cargo run --example collect_upbit --features tracing`.

use std::sync::Arc;

use candlekeep::{Collector, StreamKind, TimeRange, Timeframe};
use candlekeep_mock::MemoryStorage;
use candlekeep_upbit::UpbitConnector;
use chrono::{TimeDelta, Utc};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();

    let upbit = Arc::new(UpbitConnector::builder().build()?);
    let collector = Collector::builder()
        .rest(upbit.clone())
        .stream(upbit)
        .storage(Arc::new(MemoryStorage::new()))
        .build()?;

    let end = Utc::now();
    let range = TimeRange::new(end - TimeDelta::hours(6), end)?;
    let mut collection = collector.collect("KRW-BTC", Timeframe::M1, range);
    while let Some(chunk) = collection.next_chunk().await {
        println!(
            "chunk {} {:?} saved={} in {} ms",
            chunk.index, chunk.status, chunk.saved_count, chunk.elapsed_ms
        );
    }
    let response = collection.finish().await?;
    println!(
        "{} candles from {:?} in {} ms",
        response.total_count, response.data_source, response.response_time_ms
    );

    let mut trades = collector.subscribe(StreamKind::Trade, &["KRW-BTC"])?;
    if let Some(event) = trades.recv().await {
        println!("first trade: {event:?}");
    }
    let ticker = collector.live_ticker("KRW-BTC").await?;
    println!("KRW-BTC last price {}", ticker.trade_price);

    collector.shutdown().await;
    Ok(())
}

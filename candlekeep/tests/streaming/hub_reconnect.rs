use std::sync::Arc;
use std::time::Duration;

use candlekeep::{
    BackoffConfig, Collector, CollectorError, HubConfig, MarketEvent, StreamHub, StreamKind,
    StreamType, Trade, TradeSide,
};
use candlekeep_mock::{MemoryStorage, MockExchange, MockStream, MockStreamController};
use chrono::Utc;
use rust_decimal::Decimal;

use crate::helpers::{BTC, ETH, builder, quick_backoff, wait_until};

fn hub_with(backoff: BackoffConfig) -> (StreamHub, MockStreamController) {
    let (stream, ctl) = MockStream::new_with_controller();
    let hub = StreamHub::new(
        stream,
        HubConfig {
            ticket: Some("test-ticket".into()),
            backoff,
            ..HubConfig::default()
        },
    );
    (hub, ctl)
}

fn trade(symbol: &str, seq: u64) -> MarketEvent {
    MarketEvent::Trade(Trade {
        symbol: symbol.into(),
        price: Decimal::from(100),
        volume: Decimal::ONE,
        side: TradeSide::Bid,
        sequential_id: seq,
        ts: Utc::now(),
        stream_type: StreamType::Realtime,
    })
}

async fn subscriptions_reach(ctl: &MockStreamController, n: usize) {
    wait_until("subscription messages", move || async move {
        ctl.subscriptions().await.len() >= n
    })
    .await;
}

#[tokio::test]
async fn reconnects_and_resubscribes_after_disconnect() {
    let (hub, ctl) = hub_with(quick_backoff());
    let mut trades = hub.subscribe(StreamKind::Trade, &["krw-btc"]).unwrap();
    subscriptions_reach(&ctl, 1).await;
    assert_eq!(hub.connect_count(), 1);

    ctl.disconnect().await;
    subscriptions_reach(&ctl, 2).await;

    let subs = ctl.subscriptions().await;
    assert_eq!(subs[0], subs[1]);
    assert_eq!(subs[1].ticket, "test-ticket");
    assert!(subs[1].contains(StreamKind::Trade, BTC));
    assert_eq!(ctl.connect_count().await, 2);
    assert_eq!(hub.connect_count(), 2);

    assert!(ctl.push(trade(BTC, 7)).await);
    let ev = tokio::time::timeout(Duration::from_secs(2), trades.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(ev, MarketEvent::Trade(t) if t.sequential_id == 7));
    hub.shutdown().await;
}

#[tokio::test]
async fn refused_connects_are_retried() {
    let (hub, ctl) = hub_with(quick_backoff());
    ctl.refuse_next_connects(2).await;

    let _listener = hub.subscribe(StreamKind::Ticker, &[BTC]).unwrap();
    let feed: &StreamHub = &hub;
    wait_until("connected hub", move || async move { feed.is_connected() }).await;

    assert_eq!(ctl.connect_count().await, 3);
    assert_eq!(hub.connect_count(), 1);
    subscriptions_reach(&ctl, 1).await;
    hub.shutdown().await;
}

#[tokio::test]
async fn listeners_share_one_consolidated_subscription() {
    let (hub, ctl) = hub_with(quick_backoff());
    let tickers = hub.subscribe(StreamKind::Ticker, &[BTC]).unwrap();
    let trades = hub.subscribe(StreamKind::Trade, &[BTC, ETH]).unwrap();

    let probe = &ctl;
    wait_until("consolidated subscription", move || async move {
        probe.subscriptions().await.last().is_some_and(|s| {
            s.contains(StreamKind::Ticker, BTC)
                && s.contains(StreamKind::Trade, BTC)
                && s.contains(StreamKind::Trade, ETH)
        })
    })
    .await;
    assert_eq!(ctl.connect_count().await, 1);
    assert!(hub.is_subscribed(StreamKind::Trade, ETH));

    drop(trades);
    wait_until("shrunk subscription", move || async move {
        probe.subscriptions().await.last().is_some_and(|s| {
            s.contains(StreamKind::Ticker, BTC) && !s.contains(StreamKind::Trade, ETH)
        })
    })
    .await;
    assert!(!hub.is_subscribed(StreamKind::Trade, ETH));

    drop(tickers);
    assert!(hub.subscription().is_empty());
    let feed: &StreamHub = &hub;
    wait_until("closed session", move || async move { !feed.is_connected() }).await;
    hub.shutdown().await;
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let (hub, ctl) = hub_with(BackoffConfig {
        max_attempts: Some(3),
        ..quick_backoff()
    });
    ctl.refuse_next_connects(10).await;

    let mut trades = hub.subscribe(StreamKind::Trade, &[BTC]).unwrap();
    let closed = tokio::time::timeout(Duration::from_secs(5), trades.recv())
        .await
        .unwrap();

    assert!(closed.is_none());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(ctl.connect_count().await, 3);
    assert!(!hub.is_connected());
    assert!(!hub.is_subscribed(StreamKind::Trade, BTC));
    assert!(hub.subscription().is_empty());
}

#[tokio::test]
async fn subscribe_validates_input_and_lifecycle() {
    let (hub, _ctl) = hub_with(quick_backoff());
    let empty: [&str; 0] = [];
    assert!(matches!(
        hub.subscribe(StreamKind::Ticker, &empty),
        Err(CollectorError::InvalidArg(_))
    ));
    assert!(matches!(
        hub.subscribe(StreamKind::Ticker, &["  "]),
        Err(CollectorError::InvalidArg(_))
    ));

    hub.shutdown().await;
    assert!(matches!(
        hub.subscribe(StreamKind::Ticker, &[BTC]),
        Err(CollectorError::Cancelled)
    ));
}

#[tokio::test]
async fn collector_subscribe_needs_a_stream_source() {
    let ex = MockExchange::new();
    let without = builder(&ex, Arc::new(MemoryStorage::new())).build().unwrap();
    assert!(matches!(
        without.subscribe(StreamKind::Trade, &[BTC]),
        Err(CollectorError::InvalidArg(_))
    ));

    let (stream, ctl) = MockStream::new_with_controller();
    let with: Collector = builder(&ex, Arc::new(MemoryStorage::new()))
        .stream(stream)
        .build()
        .unwrap();
    let mut trades = with.subscribe(StreamKind::Trade, &[BTC]).unwrap();
    subscriptions_reach(&ctl, 1).await;
    assert!(ctl.push(trade(BTC, 1)).await);
    let ev = tokio::time::timeout(Duration::from_secs(2), trades.recv())
        .await
        .unwrap();
    assert!(ev.is_some());

    with.shutdown().await;
    let after = tokio::time::timeout(Duration::from_secs(2), trades.recv())
        .await
        .unwrap();
    assert!(after.is_none());
}

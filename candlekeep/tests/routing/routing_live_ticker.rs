use std::sync::Arc;
use std::time::Duration;

use candlekeep::{
    ChannelRequest, ChannelResponse, ChannelRouter, HubConfig, MarketEvent, StreamHub, StreamKind,
    StreamType, Ticker,
};
use candlekeep_mock::{MockExchange, MockStream, MockStreamController};
use chrono::Utc;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::helpers::{BTC, LIMIT_KEY, quick_backoff, router, wait_until};

fn pushed_ticker(price: i64) -> MarketEvent {
    MarketEvent::Ticker(Ticker {
        symbol: BTC.into(),
        trade_price: Decimal::from(price),
        change_rate: Decimal::ZERO,
        acc_volume_24h: Decimal::from(10),
        ts: Utc::now(),
        stream_type: StreamType::Realtime,
    })
}

fn hub_router(ex: &MockExchange) -> (ChannelRouter, Arc<StreamHub>, MockStreamController) {
    let (stream, ctl) = MockStream::new_with_controller();
    let hub = Arc::new(StreamHub::new(
        stream,
        HubConfig {
            backoff: quick_backoff(),
            ..HubConfig::default()
        },
    ));
    (router(ex).with_hub(Arc::clone(&hub)), hub, ctl)
}

async fn wait_subscribed(ctl: &MockStreamController) {
    wait_until("ticker subscription on the session", move || async move {
        ctl.subscriptions()
            .await
            .last()
            .is_some_and(|s| s.contains(StreamKind::Ticker, BTC))
    })
    .await;
}

#[tokio::test]
async fn without_hub_live_ticker_uses_rest() {
    let ex = MockExchange::new();
    let router = router(&ex);

    let res = router
        .execute(
            ChannelRequest::LiveTicker(BTC.into()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let ChannelResponse::Ticker(t) = res else {
        panic!("expected a ticker");
    };
    assert_eq!(t.symbol, BTC);
    let counts = router.metrics().counts();
    assert_eq!(counts.rest_calls, 1);
    assert_eq!(counts.ws_served, 0);
}

#[tokio::test]
async fn fresh_feed_serves_ticker_without_rest() {
    let ex = MockExchange::new();
    let (router, hub, ctl) = hub_router(&ex);
    let _listener = hub.subscribe(StreamKind::Ticker, &[BTC]).unwrap();
    wait_subscribed(&ctl).await;

    assert!(ctl.push(pushed_ticker(777)).await);
    let feed: &StreamHub = &hub;
    wait_until("fresh ticker", move || async move {
        feed.is_fresh(StreamKind::Ticker, BTC, Duration::from_secs(5))
    })
    .await;

    let t = router
        .live_ticker(BTC, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(t.trade_price, Decimal::from(777));
    let counts = router.metrics().counts();
    assert_eq!(counts.ws_served, 1);
    assert_eq!(counts.rest_calls, 0);
    hub.shutdown().await;
}

#[tokio::test]
async fn stale_feed_with_ample_quota_uses_rest() {
    let ex = MockExchange::new();
    let (router, hub, ctl) = hub_router(&ex);
    let _listener = hub.subscribe(StreamKind::Ticker, &[BTC]).unwrap();
    wait_subscribed(&ctl).await;

    let snap = router.snapshot(BTC);
    assert!(snap.ws_subscribed);
    assert!(!snap.ws_fresh);

    let t = router
        .live_ticker(BTC, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(t.stream_type, StreamType::Snapshot);
    assert_eq!(router.metrics().counts().rest_calls, 1);
    hub.shutdown().await;
}

#[tokio::test]
async fn scarce_quota_waits_for_the_next_push() {
    let ex = MockExchange::new();
    let (router, hub, ctl) = hub_router(&ex);
    let _listener = hub.subscribe(StreamKind::Ticker, &[BTC]).unwrap();
    wait_subscribed(&ctl).await;
    assert!(
        router
            .limiter()
            .update_from_response(LIMIT_KEY, "group=default; min=10; sec=1")
    );
    assert!(router.snapshot(BTC).rest_headroom < 0.5);

    let cancel = CancellationToken::new();
    let (res, pushed) = tokio::join!(router.live_ticker(BTC, &cancel), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        ctl.push(pushed_ticker(555)).await
    });

    assert!(pushed);
    assert_eq!(res.unwrap().trade_price, Decimal::from(555));
    let counts = router.metrics().counts();
    assert_eq!(counts.ws_served, 1);
    assert_eq!(counts.rest_calls, 0);
    hub.shutdown().await;
}

#[tokio::test]
async fn live_ticker_is_uppercased_by_the_collector() {
    let ex = MockExchange::new();
    let collector = crate::helpers::builder(&ex, Arc::new(candlekeep_mock::MemoryStorage::new()))
        .build()
        .unwrap();

    let t = collector.live_ticker("krw-btc").await.unwrap();

    assert_eq!(t.symbol, BTC);
}

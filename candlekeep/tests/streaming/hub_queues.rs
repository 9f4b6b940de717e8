use std::time::Duration;

use candlekeep::{
    HubConfig, MarketEvent, StreamHub, StreamKind, StreamType, Ticker, Trade, TradeSide,
};
use candlekeep_mock::{MockStream, MockStreamController};
use chrono::Utc;
use rust_decimal::Decimal;

use crate::helpers::{BTC, ETH, quick_backoff, wait_until};

fn hub(queue: usize) -> (StreamHub, MockStreamController) {
    let (stream, ctl) = MockStream::new_with_controller();
    let hub = StreamHub::new(
        stream,
        HubConfig {
            backoff: quick_backoff(),
            listener_queue: queue,
            ..HubConfig::default()
        },
    );
    (hub, ctl)
}

fn ticker(price: i64) -> MarketEvent {
    MarketEvent::Ticker(Ticker {
        symbol: BTC.into(),
        trade_price: Decimal::from(price),
        change_rate: Decimal::ZERO,
        acc_volume_24h: Decimal::ONE,
        ts: Utc::now(),
        stream_type: StreamType::Realtime,
    })
}

fn trade(symbol: &str, seq: u64) -> MarketEvent {
    MarketEvent::Trade(Trade {
        symbol: symbol.into(),
        price: Decimal::from(100),
        volume: Decimal::ONE,
        side: if seq % 2 == 0 { TradeSide::Bid } else { TradeSide::Ask },
        sequential_id: seq,
        ts: Utc::now(),
        stream_type: StreamType::Realtime,
    })
}

async fn wait_subscribed(ctl: &MockStreamController, kind: StreamKind) {
    wait_until("session subscription", move || async move {
        ctl.subscriptions()
            .await
            .last()
            .is_some_and(|s| s.contains(kind, BTC))
    })
    .await;
}

fn price(ev: &MarketEvent) -> Decimal {
    match ev {
        MarketEvent::Ticker(t) => t.trade_price,
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn slow_ticker_listener_drops_oldest() {
    let (hub, ctl) = hub(2);
    let mut tickers = hub.subscribe(StreamKind::Ticker, &[BTC]).unwrap();
    wait_subscribed(&ctl, StreamKind::Ticker).await;

    for p in 1..=10 {
        assert!(ctl.push(ticker(p)).await);
    }
    let feed: &StreamHub = &hub;
    wait_until("last ticker routed", move || async move {
        feed.latest_ticker(BTC, Duration::from_secs(5))
            .is_some_and(|t| t.trade_price == Decimal::from(10))
    })
    .await;

    let first = tickers.recv().await.unwrap();
    assert_eq!(price(&first), Decimal::from(9));
    assert_eq!(tickers.dropped(), 8);
    let second = tickers.recv().await.unwrap();
    assert_eq!(price(&second), Decimal::from(10));
    assert_eq!(tickers.kind(), StreamKind::Ticker);
    hub.shutdown().await;
}

#[tokio::test]
async fn trade_listener_keeps_every_message_in_order() {
    let (hub, ctl) = hub(4);
    let mut trades = hub.subscribe(StreamKind::Trade, &[BTC]).unwrap();
    wait_subscribed(&ctl, StreamKind::Trade).await;

    let pusher = ctl.clone();
    let feed = tokio::spawn(async move {
        for seq in 0..50 {
            assert!(pusher.push(trade(BTC, seq)).await);
        }
    });

    let mut seen = Vec::new();
    while seen.len() < 50 {
        let ev = tokio::time::timeout(Duration::from_secs(2), trades.recv())
            .await
            .unwrap()
            .unwrap();
        if let MarketEvent::Trade(t) = ev {
            seen.push(t.sequential_id);
        }
    }
    feed.await.unwrap();

    assert_eq!(seen, (0..50).collect::<Vec<_>>());
    assert_eq!(trades.dropped(), 0);
    hub.shutdown().await;
}

#[tokio::test]
async fn events_reach_only_matching_listeners() {
    let (hub, ctl) = hub(16);
    let mut btc = hub.subscribe(StreamKind::Trade, &[BTC]).unwrap();
    let mut eth = hub.subscribe(StreamKind::Trade, &[ETH]).unwrap();
    let probe = &ctl;
    wait_until("both markets subscribed", move || async move {
        probe
            .subscriptions()
            .await
            .last()
            .is_some_and(|s| s.contains(StreamKind::Trade, BTC) && s.contains(StreamKind::Trade, ETH))
    })
    .await;

    assert!(ctl.push(trade(ETH, 1)).await);
    assert!(ctl.push(trade(BTC, 2)).await);

    let got = tokio::time::timeout(Duration::from_secs(2), btc.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(got, MarketEvent::Trade(t) if t.symbol == BTC && t.sequential_id == 2));
    let got = tokio::time::timeout(Duration::from_secs(2), eth.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(got, MarketEvent::Trade(t) if t.symbol == ETH && t.sequential_id == 1));
    hub.shutdown().await;
}

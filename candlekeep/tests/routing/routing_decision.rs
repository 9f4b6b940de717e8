use candlekeep::{
    CandleQuery, Channel, ChannelRequest, MetricsSnapshot, Timeframe, decide_channel,
};

use crate::helpers::{BTC, edge};

fn snapshot(subscribed: bool, fresh: bool, headroom: f64) -> MetricsSnapshot {
    MetricsSnapshot {
        ws_subscribed: subscribed,
        ws_fresh: fresh,
        rest_headroom: headroom,
        rest_headroom_floor: 0.5,
    }
}

#[test]
fn historical_requests_always_use_rest() {
    let req = ChannelRequest::Candles(CandleQuery {
        symbol: BTC.into(),
        timeframe: Timeframe::M1,
        to: edge(),
        count: 200,
    });
    assert!(req.is_historical());
    for snap in [
        snapshot(true, true, 0.0),
        snapshot(true, false, 0.0),
        snapshot(false, false, 1.0),
    ] {
        assert_eq!(decide_channel(&req, &snap), Channel::Rest);
    }
}

#[test]
fn live_requests_follow_freshness_and_headroom() {
    let req = ChannelRequest::LiveTicker(BTC.into());
    let cases = [
        // (subscribed, fresh, headroom, expected)
        (true, true, 1.0, Channel::WebSocket),
        (true, true, 0.0, Channel::WebSocket),
        (true, false, 0.2, Channel::WebSocket),
        (true, false, 0.5, Channel::Rest),
        (true, false, 0.9, Channel::Rest),
        (false, false, 0.0, Channel::Rest),
        (false, false, 1.0, Channel::Rest),
    ];
    for (subscribed, fresh, headroom, expected) in cases {
        assert_eq!(
            decide_channel(&req, &snapshot(subscribed, fresh, headroom)),
            expected,
            "subscribed={subscribed} fresh={fresh} headroom={headroom}"
        );
    }
}

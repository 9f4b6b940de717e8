//! Vendor JSON to canonical model conversion.
//!
//! Upbit reports candle open times as naive UTC and KST strings; the local
//! time is derived from the UTC instant through `chrono-tz` so both stay
//! consistent even when the KST field is missing.

use candlekeep_core::{
    Candle, CollectorError, MarketEvent, Orderbook, OrderbookUnit, StreamKind, StreamType,
    Subscription, Ticker, Timeframe, Trade, TradeSide,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Asia::Seoul;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};

/// REST path of the candle endpoint serving `tf`.
#[must_use]
pub fn candle_path(tf: Timeframe) -> String {
    match tf {
        Timeframe::S1 => "v1/candles/seconds".to_string(),
        Timeframe::D1 => "v1/candles/days".to_string(),
        Timeframe::W1 => "v1/candles/weeks".to_string(),
        Timeframe::Mo1 => "v1/candles/months".to_string(),
        Timeframe::Y1 => "v1/candles/years".to_string(),
        other => format!("v1/candles/minutes/{}", other.minutes().unwrap_or(1)),
    }
}

/// `to` query parameter (exclusive, UTC).
#[must_use]
pub fn to_param(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Candle as served by the REST candle endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct UpbitCandle {
    /// Market code.
    pub market: String,
    /// Open time, naive UTC.
    pub candle_date_time_utc: String,
    /// Opening price.
    pub opening_price: Decimal,
    /// Highest price.
    pub high_price: Decimal,
    /// Lowest price.
    pub low_price: Decimal,
    /// Closing price.
    pub trade_price: Decimal,
    /// Accumulated volume.
    pub candle_acc_trade_volume: Decimal,
    /// Minute unit (minute candles only).
    #[serde(default)]
    pub unit: Option<u32>,
    /// Previous close (day candles only).
    #[serde(default)]
    pub prev_closing_price: Option<Decimal>,
    /// Change rate (day candles only).
    #[serde(default)]
    pub change_rate: Option<Decimal>,
    /// First day of the period (week and longer candles).
    #[serde(default)]
    pub first_day_of_period: Option<String>,
}

fn data_err(msg: impl Into<String>) -> CollectorError {
    CollectorError::Data(msg.into())
}

fn parse_naive_utc(s: &str) -> Result<DateTime<Utc>, CollectorError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .map(|n| n.and_utc())
        .map_err(|e| data_err(format!("bad candle time {s:?}: {e}")))
}

fn local_time(t: DateTime<Utc>) -> NaiveDateTime {
    t.with_timezone(&Seoul).naive_local()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, CollectorError> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| data_err(format!("bad timestamp {ms}")))
}

/// Convert one REST candle.
///
/// # Errors
/// Returns `CollectorError::Data` when a timestamp cannot be parsed.
pub fn candle(raw: &UpbitCandle, tf: Timeframe) -> Result<Candle, CollectorError> {
    let utc_time = parse_naive_utc(&raw.candle_date_time_utc)?;
    let period_start = match &raw.first_day_of_period {
        Some(s) => Some(
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| data_err(format!("bad period start {s:?}: {e}")))?,
        ),
        None if matches!(tf, Timeframe::W1 | Timeframe::Mo1 | Timeframe::Y1) => {
            Some(local_time(utc_time).date())
        }
        None => None,
    };
    let daily = matches!(tf, Timeframe::D1);
    Ok(Candle {
        symbol: raw.market.clone(),
        timeframe: tf,
        open: raw.opening_price,
        high: raw.high_price,
        low: raw.low_price,
        close: raw.trade_price,
        volume: raw.candle_acc_trade_volume,
        utc_time,
        local_time: local_time(utc_time),
        unit: if tf.is_sub_hour() {
            raw.unit.or_else(|| tf.minutes())
        } else {
            None
        },
        prev_close: if daily { raw.prev_closing_price } else { None },
        change_rate: if daily { raw.change_rate } else { None },
        period_start,
        synthetic: false,
    })
}

/// Convert a REST candle page, preserving order.
///
/// # Errors
/// Returns the first conversion failure.
pub fn candles(raw: &[UpbitCandle], tf: Timeframe) -> Result<Vec<Candle>, CollectorError> {
    raw.iter().map(|c| candle(c, tf)).collect()
}

/// Ticker as served by `GET /v1/ticker`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpbitTicker {
    /// Market code.
    pub market: String,
    /// Last trade price.
    pub trade_price: Decimal,
    /// Signed change rate.
    pub signed_change_rate: Decimal,
    /// Trailing 24h volume.
    pub acc_trade_volume_24h: Decimal,
    /// Exchange timestamp in milliseconds.
    pub timestamp: i64,
}

/// Convert a REST ticker.
///
/// # Errors
/// Returns `CollectorError::Data` for an out-of-range timestamp.
pub fn ticker(raw: &UpbitTicker) -> Result<Ticker, CollectorError> {
    Ok(Ticker {
        symbol: raw.market.clone(),
        trade_price: raw.trade_price,
        change_rate: raw.signed_change_rate,
        acc_volume_24h: raw.acc_trade_volume_24h,
        ts: from_millis(raw.timestamp)?,
        stream_type: StreamType::Snapshot,
    })
}

/// WebSocket `type` value for a subscription kind.
#[must_use]
pub fn stream_type_name(kind: StreamKind, candle_tf: Timeframe) -> String {
    match kind {
        StreamKind::Ticker => "ticker".to_string(),
        StreamKind::Trade => "trade".to_string(),
        StreamKind::Orderbook => "orderbook".to_string(),
        StreamKind::Candle => format!("candle.{}", candle_tf.as_str()),
    }
}

/// Serialize a consolidated subscription set into one request frame.
#[must_use]
pub fn subscribe_message(sub: &Subscription) -> String {
    let mut frames = vec![json!({ "ticket": sub.ticket })];
    for (kind, codes) in &sub.topics {
        if codes.is_empty() {
            continue;
        }
        let codes: Vec<String> = codes.iter().map(|c| c.to_uppercase()).collect();
        frames.push(json!({
            "type": stream_type_name(*kind, sub.candle_timeframe),
            "codes": codes,
        }));
    }
    frames.push(json!({ "format": "DEFAULT" }));
    Value::Array(frames).to_string()
}

#[derive(Debug, Deserialize)]
struct WsTicker {
    code: String,
    trade_price: Decimal,
    signed_change_rate: Decimal,
    acc_trade_volume_24h: Decimal,
    timestamp: i64,
    stream_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WsTrade {
    code: String,
    trade_price: Decimal,
    trade_volume: Decimal,
    ask_bid: String,
    sequential_id: u64,
    trade_timestamp: i64,
    stream_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WsOrderbookUnit {
    ask_price: Decimal,
    bid_price: Decimal,
    ask_size: Decimal,
    bid_size: Decimal,
}

#[derive(Debug, Deserialize)]
struct WsOrderbook {
    code: String,
    orderbook_units: Vec<WsOrderbookUnit>,
    timestamp: i64,
    stream_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WsCandle {
    code: String,
    candle_date_time_utc: String,
    opening_price: Decimal,
    high_price: Decimal,
    low_price: Decimal,
    trade_price: Decimal,
    candle_acc_trade_volume: Decimal,
}

fn stream_type(raw: Option<&str>) -> StreamType {
    match raw {
        Some("SNAPSHOT") => StreamType::Snapshot,
        _ => StreamType::Realtime,
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> Result<T, CollectorError> {
    serde_json::from_value(value).map_err(|e| data_err(format!("bad {what} message: {e}")))
}

/// Decode one push-feed frame.
///
/// Returns `Ok(None)` for frames that carry no market data (status replies,
/// unknown types).
///
/// # Errors
/// Returns `CollectorError::Data` for malformed market data frames.
pub fn parse_event(text: &str) -> Result<Option<MarketEvent>, CollectorError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| data_err(format!("bad frame: {e}")))?;
    let Some(kind) = value.get("type").and_then(Value::as_str).map(str::to_string) else {
        return Ok(None);
    };

    let event = match kind.as_str() {
        "ticker" => {
            let raw: WsTicker = decode(value, "ticker")?;
            MarketEvent::Ticker(Ticker {
                symbol: raw.code,
                trade_price: raw.trade_price,
                change_rate: raw.signed_change_rate,
                acc_volume_24h: raw.acc_trade_volume_24h,
                ts: from_millis(raw.timestamp)?,
                stream_type: stream_type(raw.stream_type.as_deref()),
            })
        }
        "trade" => {
            let raw: WsTrade = decode(value, "trade")?;
            let side = match raw.ask_bid.as_str() {
                "ASK" => TradeSide::Ask,
                "BID" => TradeSide::Bid,
                other => return Err(data_err(format!("unknown trade side {other:?}"))),
            };
            MarketEvent::Trade(Trade {
                symbol: raw.code,
                price: raw.trade_price,
                volume: raw.trade_volume,
                side,
                sequential_id: raw.sequential_id,
                ts: from_millis(raw.trade_timestamp)?,
                stream_type: stream_type(raw.stream_type.as_deref()),
            })
        }
        "orderbook" => {
            let raw: WsOrderbook = decode(value, "orderbook")?;
            MarketEvent::Orderbook(Orderbook {
                symbol: raw.code,
                units: raw
                    .orderbook_units
                    .into_iter()
                    .map(|u| OrderbookUnit {
                        ask_price: u.ask_price,
                        bid_price: u.bid_price,
                        ask_size: u.ask_size,
                        bid_size: u.bid_size,
                    })
                    .collect(),
                ts: from_millis(raw.timestamp)?,
                stream_type: stream_type(raw.stream_type.as_deref()),
            })
        }
        t if t.starts_with("candle.") => {
            let tf = Timeframe::parse(&t["candle.".len()..])?;
            let raw: WsCandle = decode(value, "candle")?;
            let utc_time = parse_naive_utc(&raw.candle_date_time_utc)?;
            MarketEvent::Candle(Candle {
                symbol: raw.code,
                timeframe: tf,
                open: raw.opening_price,
                high: raw.high_price,
                low: raw.low_price,
                close: raw.trade_price,
                volume: raw.candle_acc_trade_volume,
                utc_time,
                local_time: local_time(utc_time),
                unit: tf.minutes().filter(|_| tf.is_sub_hour()),
                prev_close: None,
                change_rate: None,
                period_start: None,
                synthetic: false,
            })
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}

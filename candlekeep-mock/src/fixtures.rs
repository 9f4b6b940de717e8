//! Deterministic candle fixtures.

use candlekeep_core::{Candle, Ticker, Timeframe};
use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;

/// Offset of the exchange's local time (KST) from UTC.
pub const LOCAL_OFFSET_HOURS: i64 = 9;

/// Reference price of the slot starting at `t`; varies slowly and never drops below 100.
#[must_use]
pub fn price_at(t: DateTime<Utc>, tf: Timeframe) -> Decimal {
    let slot = t.timestamp().div_euclid(tf.seconds().max(1));
    Decimal::from(100 + slot.rem_euclid(10))
}

/// Well-formed candle at `t` priced by [`price_at`].
#[must_use]
pub fn candle(symbol: &str, tf: Timeframe, t: DateTime<Utc>) -> Candle {
    let p = price_at(t, tf);
    Candle {
        symbol: symbol.to_string(),
        timeframe: tf,
        open: p,
        high: p + Decimal::TWO,
        low: p - Decimal::ONE,
        close: p + Decimal::ONE,
        volume: Decimal::from(3),
        utc_time: t,
        local_time: (t + TimeDelta::hours(LOCAL_OFFSET_HOURS)).naive_utc(),
        unit: tf.minutes(),
        prev_close: matches!(tf, Timeframe::D1).then_some(p),
        change_rate: matches!(tf, Timeframe::D1).then_some(Decimal::ZERO),
        period_start: matches!(tf, Timeframe::W1 | Timeframe::Mo1 | Timeframe::Y1)
            .then(|| t.date_naive()),
        synthetic: false,
    }
}

/// Candle violating the OHLC invariants (high below low).
#[must_use]
pub fn broken_candle(symbol: &str, tf: Timeframe, t: DateTime<Utc>) -> Candle {
    let mut c = candle(symbol, tf, t);
    c.high = c.low - Decimal::ONE;
    c
}

/// Contiguous candles for every slot in `[start, end)`, oldest first.
#[must_use]
pub fn series(symbol: &str, tf: Timeframe, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Candle> {
    candlekeep_core::time_sequence(start, end, tf)
        .into_iter()
        .map(|t| candle(symbol, tf, t))
        .collect()
}

/// Ticker derived from the candle at `t`.
#[must_use]
pub fn ticker(symbol: &str, t: DateTime<Utc>) -> Ticker {
    let c = candle(symbol, Timeframe::M1, Timeframe::M1.align(t));
    Ticker {
        symbol: symbol.to_string(),
        trade_price: c.close,
        change_rate: Decimal::ZERO,
        acc_volume_24h: Decimal::from(1_440 * 3),
        ts: t,
        stream_type: candlekeep_core::StreamType::Snapshot,
    }
}

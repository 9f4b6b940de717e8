use chrono::{DateTime, Datelike, Utc};

use crate::{CollectorError, Timeframe};

/// Parse a timeframe string and return its nominal length in seconds.
///
/// Months and years report 30 and 365 days; alignment and stepping use
/// calendar arithmetic instead.
///
/// # Errors
/// Returns `CollectorError::InvalidTimeframe` for unsupported units.
pub fn parse_seconds(tf: &str) -> Result<i64, CollectorError> {
    Timeframe::parse(tf).map(Timeframe::seconds)
}

/// Floor `instant` to the nearest candle boundary at or before it.
///
/// Days start at 00:00 UTC, weeks on Monday, months on the 1st and years on
/// January 1st. Idempotent.
#[must_use]
pub fn align_to_boundary(instant: DateTime<Utc>, tf: Timeframe) -> DateTime<Utc> {
    tf.align(instant)
}

/// Move `instant` back by `n` candles.
#[must_use]
pub fn step_back(instant: DateTime<Utc>, tf: Timeframe, n: u32) -> DateTime<Utc> {
    tf.shift(instant, -i64::from(n))
}

/// Move `instant` forward by `n` candles.
#[must_use]
pub fn step_forward(instant: DateTime<Utc>, tf: Timeframe, n: u32) -> DateTime<Utc> {
    tf.shift(instant, i64::from(n))
}

/// Number of candle slots in `[align(start), align(end))`.
///
/// Returns 0 when the aligned range is empty or inverted.
#[must_use]
pub fn candle_count(start: DateTime<Utc>, end: DateTime<Utc>, tf: Timeframe) -> usize {
    let from = tf.align(start);
    let to = tf.align(end);
    if to <= from {
        return 0;
    }
    let slots = match tf {
        Timeframe::Mo1 => month_index(to) - month_index(from),
        Timeframe::Y1 => i64::from(to.year() - from.year()),
        _ => (to.timestamp() - from.timestamp()) / tf.seconds(),
    };
    usize::try_from(slots).unwrap_or(0)
}

/// Open times of every candle slot in `[align(start), align(end))`, oldest first.
#[must_use]
pub fn time_sequence(start: DateTime<Utc>, end: DateTime<Utc>, tf: Timeframe) -> Vec<DateTime<Utc>> {
    let to = tf.align(end);
    let mut cursor = tf.align(start);
    let mut out = Vec::with_capacity(candle_count(start, end, tf));
    while cursor < to {
        out.push(cursor);
        cursor = tf.shift(cursor, 1);
    }
    out
}

fn month_index(t: DateTime<Utc>) -> i64 {
    i64::from(t.year()) * 12 + i64::from(t.month0())
}

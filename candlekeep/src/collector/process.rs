//! Pure post-fetch processing of one chunk.

use std::collections::BTreeMap;

use candlekeep_core::{Candle, CollectorError, TimeRange, Timeframe, time_sequence};
use chrono::{DateTime, Utc};

/// Candles of one chunk after validation, filtering and gap filling.
#[derive(Debug, Default)]
pub(crate) struct Processed {
    /// Oldest first, one per slot.
    pub candles: Vec<Candle>,
    /// Candles dropped for violating OHLC invariants.
    pub invalid: Vec<CollectorError>,
    /// Raw candles outside the expected range.
    pub out_of_range: usize,
    pub duplicates: usize,
    pub synthetic: usize,
    /// Real candles kept.
    pub real: usize,
}

/// Validate, filter, order, dedup and gap-fill one page of provider candles.
///
/// `exhausted` means the provider returned fewer candles than asked for, so
/// nothing older than the oldest real candle of the chunk is synthesized.
pub(crate) fn process(
    raw: Vec<Candle>,
    expected: &TimeRange,
    timeframe: Timeframe,
    exhausted: bool,
) -> Processed {
    let mut out = Processed::default();
    let mut in_range: BTreeMap<DateTime<Utc>, Candle> = BTreeMap::new();
    let mut older: Option<Candle> = None;

    for candle in raw {
        if let Err(e) = candle.validate() {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %e, "dropping invalid candle");
            out.invalid.push(e);
            continue;
        }
        let t = candle.utc_time;
        if expected.contains(t) {
            if in_range.contains_key(&t) {
                out.duplicates += 1;
            } else {
                in_range.insert(t, candle);
            }
            continue;
        }
        out.out_of_range += 1;
        if t < expected.start() && older.as_ref().is_none_or(|o| o.utc_time < t) {
            older = Some(candle);
        }
    }
    out.real = in_range.len();

    let fill_from = if exhausted {
        in_range.keys().next().copied()
    } else {
        Some(expected.start())
    };
    let Some(fill_from) = fill_from else {
        return out;
    };

    // Anchor: previous close, or the oldest in-range open when nothing older exists.
    let mut prev = older.or_else(|| in_range.values().next().map(|c| opening_anchor(c)));
    let mut candles = Vec::with_capacity(in_range.len());
    for slot in time_sequence(fill_from, expected.end(), timeframe) {
        if let Some(c) = in_range.remove(&slot) {
            prev = Some(c.clone());
            candles.push(c);
            continue;
        }
        let Some(anchor) = prev.as_ref() else {
            continue;
        };
        let offset = anchor.local_time - anchor.utc_time.naive_utc();
        let filled = Candle::flat_fill(anchor, slot, slot.naive_utc() + offset, anchor.close);
        out.synthetic += 1;
        prev = Some(filled.clone());
        candles.push(filled);
    }
    // Off-boundary stragglers still belong to the chunk.
    if !in_range.is_empty() {
        candles.extend(in_range.into_values());
        candles.sort_by_key(|c| c.utc_time);
    }
    out.candles = candles;
    out
}

/// Copy of `c` whose close is its open, used to price gaps below the first real candle.
fn opening_anchor(c: &Candle) -> Candle {
    let mut anchor = c.clone();
    anchor.close = c.open;
    anchor
}

/// Merge candles from several chunks into one ordered, duplicate-free series
/// restricted to `range`. Real candles win over synthetic ones for the same slot.
pub(crate) fn merge(chunks: Vec<Vec<Candle>>, range: &TimeRange) -> Vec<Candle> {
    let mut by_time: BTreeMap<DateTime<Utc>, Candle> = BTreeMap::new();
    for c in chunks.into_iter().flatten() {
        if !range.contains(c.utc_time) {
            continue;
        }
        match by_time.get(&c.utc_time) {
            Some(existing) if !existing.synthetic || c.synthetic => {}
            _ => {
                by_time.insert(c.utc_time, c);
            }
        }
    }
    by_time.into_values().collect()
}

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use candlekeep_core::{
    Candle, CandleStorage, CollectorError, DataRange, TimeRange, Timeframe,
};
use chrono::{DateTime, Utc};

type Series = BTreeMap<DateTime<Utc>, Candle>;

/// Ordered in-memory candle store.
///
/// Coverage reported by `existing_range` spans the oldest to one slot past
/// the newest stored candle, with every missing slot in between listed as a
/// gap.
#[derive(Default)]
pub struct MemoryStorage {
    series: Mutex<HashMap<(String, Timeframe), Series>>,
    fail_upserts: AtomicBool,
    upsert_calls: AtomicUsize,
    short_saves: AtomicUsize,
}

impl MemoryStorage {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert candles directly, bypassing failure injection.
    pub fn seed(&self, candles: impl IntoIterator<Item = Candle>) {
        let mut guard = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        for c in candles {
            guard
                .entry((c.symbol.clone(), c.timeframe))
                .or_default()
                .insert(c.utc_time, c);
        }
    }

    /// Make every subsequent upsert fail with a storage error.
    pub fn set_fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    /// Under-report the saved count of each subsequent upsert by `n`.
    pub fn set_short_saves(&self, n: usize) {
        self.short_saves.store(n, Ordering::SeqCst);
    }

    /// Number of `upsert_candles` calls so far.
    #[must_use]
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of a stored series, oldest first.
    #[must_use]
    pub fn candles(&self, symbol: &str, tf: Timeframe) -> Vec<Candle> {
        let guard = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .get(&(symbol.to_string(), tf))
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }

    fn coverage(tf: Timeframe, series: &Series) -> Option<DataRange> {
        let (&oldest, _) = series.first_key_value()?;
        let (&newest, _) = series.last_key_value()?;
        let mut gaps = Vec::new();
        let mut expected = oldest;
        for &t in series.keys() {
            if t > expected
                && let Ok(gap) = TimeRange::new(expected, t)
            {
                gaps.push(gap);
            }
            expected = tf.shift(t, 1);
        }
        Some(DataRange::from_candle_times(oldest, newest, tf).with_gaps(gaps))
    }
}

#[async_trait]
impl CandleStorage for MemoryStorage {
    async fn existing_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<DataRange>, CollectorError> {
        let guard = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard
            .get(&(symbol.to_string(), timeframe))
            .and_then(|s| Self::coverage(timeframe, s)))
    }

    async fn upsert_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Result<usize, CollectorError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(CollectorError::storage("disk I/O error"));
        }
        let mut guard = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        let series = guard.entry((symbol.to_string(), timeframe)).or_default();
        for c in candles {
            series.insert(c.utc_time, c.clone());
        }
        Ok(candles
            .len()
            .saturating_sub(self.short_saves.load(Ordering::SeqCst)))
    }

    async fn load_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        range: TimeRange,
    ) -> Result<Vec<Candle>, CollectorError> {
        let guard = self.series.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard
            .get(&(symbol.to_string(), timeframe))
            .map(|s| {
                s.range(range.start()..range.end())
                    .map(|(_, c)| c.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

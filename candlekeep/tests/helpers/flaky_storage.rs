use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use candlekeep::{Candle, CandleStorage, CollectorError, DataRange, TimeRange, Timeframe};
use candlekeep_mock::MemoryStorage;

/// `MemoryStorage` whose n-th upsert (1-based) fails.
pub struct FlakyStorage {
    pub inner: MemoryStorage,
    fail_on: usize,
    calls: AtomicUsize,
}

impl FlakyStorage {
    pub fn failing_upsert(n: usize) -> Self {
        Self {
            inner: MemoryStorage::new(),
            fail_on: n,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CandleStorage for FlakyStorage {
    async fn existing_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<DataRange>, CollectorError> {
        self.inner.existing_range(symbol, timeframe).await
    }

    async fn upsert_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Result<usize, CollectorError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            return Err(CollectorError::storage("database is locked"));
        }
        self.inner.upsert_candles(symbol, timeframe, candles).await
    }

    async fn load_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        range: TimeRange,
    ) -> Result<Vec<Candle>, CollectorError> {
        self.inner.load_candles(symbol, timeframe, range).await
    }
}

use async_trait::async_trait;

use crate::{Candle, CollectorError, DataRange, TimeRange, Timeframe};

/// Persistence collaborator consumed by the collector.
///
/// Implementations are expected to be idempotent on `(symbol, timeframe,
/// utc_time)`: upserting a candle that already exists replaces it.
#[async_trait]
pub trait CandleStorage: Send + Sync {
    /// Stored coverage for a series, including internal gaps.
    async fn existing_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<DataRange>, CollectorError>;

    /// Insert or replace candles; returns the number of rows written.
    async fn upsert_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Result<usize, CollectorError>;

    /// Load stored candles with open times in `range`, oldest first.
    async fn load_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        range: TimeRange,
    ) -> Result<Vec<Candle>, CollectorError>;
}

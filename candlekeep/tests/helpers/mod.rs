// Re-export helpers so tests can `use crate::helpers::*;`
#![allow(dead_code)]

pub mod flaky_storage;

pub use flaky_storage::FlakyStorage;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use candlekeep::{
    BackoffConfig, Candle, ChannelRouter, Collector, CollectorBuilder, RateLimitConfig,
    RateLimiter, RetryConfig, TimeRange, Timeframe,
};
use candlekeep_mock::{MemoryStorage, MockExchange};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};

/// Common symbol constants used across tests.
pub const BTC: &str = "KRW-BTC";
pub const ETH: &str = "KRW-ETH";
pub const LIMIT_KEY: &str = "rest-quotation";

/// Construct a UTC `DateTime` from components for readability in tests.
pub fn dt(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, hh, mm, 0).unwrap()
}

/// Newest edge of most requests: a closed minute boundary in the past.
pub fn edge() -> DateTime<Utc> {
    dt(2024, 3, 1, 12, 0)
}

/// `n` one-minute slots before [`edge`].
pub fn minutes_before(n: i64) -> DateTime<Utc> {
    edge() - TimeDelta::minutes(n)
}

pub fn range(start: DateTime<Utc>, end: DateTime<Utc>) -> TimeRange {
    TimeRange::new(start, end).unwrap()
}

/// Limits generous enough that no test waits on admission by accident.
pub fn fast_limits() -> RateLimitConfig {
    RateLimitConfig {
        rps: 1_000,
        rpm: 60_000,
        rps_burst: 1_000,
        rpm_burst: 60_000,
    }
}

pub fn quick_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        request_timeout: Duration::from_secs(2),
        max_rate_limit_wait: Duration::from_secs(60),
    }
}

pub fn quick_backoff() -> BackoffConfig {
    BackoffConfig {
        min_backoff_ms: 10,
        max_backoff_ms: 200,
        factor: 2,
        jitter_percent: 0,
        max_attempts: None,
    }
}

pub fn builder(exchange: &MockExchange, storage: Arc<dyn candlekeep::CandleStorage>) -> CollectorBuilder {
    Collector::builder()
        .rest(Arc::new(exchange.clone()))
        .storage(storage)
        .rate_limit(fast_limits())
        .retry(quick_retry())
        .backoff(quick_backoff())
}

/// Router over `exchange` with its own fast limiter.
pub fn router(exchange: &MockExchange) -> ChannelRouter {
    let limiter = Arc::new(RateLimiter::new(fast_limits(), Duration::from_secs(60)));
    ChannelRouter::new(Arc::new(exchange.clone()), limiter, LIMIT_KEY, quick_retry())
        .with_backoff(quick_backoff())
}

pub struct Harness {
    pub exchange: MockExchange,
    pub storage: Arc<MemoryStorage>,
    pub collector: Collector,
}

/// Exchange serving BTC 1m candles from `data_start` onward, empty storage.
pub async fn harness(data_start: DateTime<Utc>) -> Harness {
    let exchange = MockExchange::new();
    exchange.set_series(BTC, Timeframe::M1, data_start).await;
    let storage = Arc::new(MemoryStorage::new());
    let collector = builder(&exchange, storage.clone()).build().unwrap();
    Harness {
        exchange,
        storage,
        collector,
    }
}

pub fn assert_contiguous(candles: &[Candle], tf: Timeframe) {
    for pair in candles.windows(2) {
        assert_eq!(
            pair[1].utc_time,
            tf.shift(pair[0].utc_time, 1),
            "hole or disorder after {}",
            pair[0].utc_time
        );
    }
}

/// Poll `cond` until it holds; panics after a bounded number of attempts.
pub async fn wait_until<F, Fut>(what: &str, mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..2_000 {
        if cond().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

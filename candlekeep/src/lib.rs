//! candlekeep collects OHLCV candle series from an exchange into local storage.
//!
//! Overview
//! - Splits a requested range into newest-first chunks of at most 200 candles
//!   and drives each through Planning -> Fetching -> Processing -> Storing.
//! - Never re-fetches a range already stored contiguously: chunks inside the
//!   stored coverage are skipped, chunks straddling it fetch only the rest.
//! - Admits every REST call through one shared dual-window GCRA limiter and
//!   resynchronizes it from the venue's `Remaining-Req` header.
//! - Serves live data from one multiplexed push-feed connection that
//!   reconnects with jittered backoff and resubscribes on its own.
//!
//! Key behaviors and trade-offs
//! - Only closed candles are collected; the range end is clamped to the open
//!   candle's boundary.
//! - A page shorter than requested means the provider has no older data. The
//!   chunk stores what arrived and collection stops (`EarlyExit`); nothing
//!   older than the oldest real candle is synthesized.
//! - Internal holes are flat-filled at the previous close with zero volume
//!   and flagged `synthetic`.
//! - Any internal gap in storage invalidates contiguity from that gap down,
//!   so the range below it is refetched rather than trusted.
//! - An error aborts only its chunk; the aggregate reports partial success.
//!
//! Examples
//! ```rust,ignore
//! use std::sync::Arc;
//! use candlekeep::{Collector, TimeRange, Timeframe};
//! use candlekeep_upbit::UpbitConnector;
//!
//! let upbit = Arc::new(UpbitConnector::builder().build()?);
//! let collector = Collector::builder()
//!     .rest(upbit.clone())
//!     .stream(upbit)
//!     .storage(my_storage)
//!     .build()?;
//!
//! let mut collection = collector.collect("KRW-BTC", Timeframe::M1, range);
//! while let Some(chunk) = collection.next_chunk().await {
//!     println!("chunk {} -> {:?}", chunk.index, chunk.status);
//! }
//! let response = collection.finish().await?;
//! ```
//!
//! Live data:
//! ```rust,ignore
//! use candlekeep::StreamKind;
//!
//! let mut trades = collector.subscribe(StreamKind::Trade, &["KRW-BTC"])?;
//! while let Some(event) = trades.recv().await {
//!     // ...
//! }
//! let ticker = collector.live_ticker("KRW-BTC").await?;
//! ```
#![warn(missing_docs)]

mod collector;
pub(crate) mod core;
pub mod router;

pub use crate::collector::Collection;
pub use crate::core::{Collector, CollectorBuilder};
pub use crate::router::hub::{HubConfig, Listener, StreamHub};
pub use crate::router::{
    Channel, ChannelRequest, ChannelResponse, ChannelRouter, MetricsSnapshot, RouterCounts,
    RouterMetrics, decide_channel,
};

pub use candlekeep_middleware::{AggregateCache, AggregateKey, Decision, RateLimiter};

// Re-export core types for convenience
pub use candlekeep_core::{
    BackoffConfig, Candle, CandleQuery, CandleStorage, ChunkPhase, ChunkResult, ChunkSpec,
    ChunkStatus, ChunkSummary, CollectResponse, CollectorConfig, CollectorError, DataRange,
    DataSource, ExecutionPlan, FetchStrategy, MarketEvent, Orderbook, OrderbookUnit,
    OverlapResult, OverlapStatus, RateLimitConfig, RestReply, RestSource, RetryConfig,
    RouterConfig, StreamKind, StreamSession, StreamSource, StreamType, Subscription, Ticker,
    TimeRange, Timeframe, Trade, TradeSide,
};

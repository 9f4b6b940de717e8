//! Candlekeep-specific data transfer objects and configuration primitives.
#![warn(missing_docs)]

mod candle;
mod chunk;
mod config;
mod error;
mod market;
mod range;
mod report;
mod timeframe;

pub use candle::Candle;
pub use chunk::{
    ChunkPhase, ChunkResult, ChunkSpec, ChunkStatus, ExecutionPlan, FetchParams, FetchStrategy,
    OverlapResult, OverlapStatus,
};
pub use config::{
    BackoffConfig, CollectorConfig, RateLimitConfig, RetryConfig, RouterConfig,
    DEFAULT_LIMIT_KEY, MAX_CHUNK_CANDLES,
};
pub use error::CollectorError;
pub use market::{
    MarketEvent, Orderbook, OrderbookUnit, StreamKind, StreamType, Ticker, Trade, TradeSide,
};
pub use range::{DataRange, TimeRange};
pub use report::{ChunkSummary, CollectResponse, DataSource};
pub use timeframe::Timeframe;

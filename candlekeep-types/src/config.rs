//! Configuration types shared across the collector, router and connectors.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Limit key used for public REST quotation endpoints.
pub const DEFAULT_LIMIT_KEY: &str = "rest-quotation";

/// Largest page the provider serves per candle request.
pub const MAX_CHUNK_CANDLES: u16 = 200;

/// Dual-window GCRA parameters for one limit key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained requests per second.
    pub rps: u32,
    /// Sustained requests per minute.
    pub rpm: u32,
    /// Requests that may be issued back-to-back against the per-second window.
    pub rps_burst: u32,
    /// Requests that may be issued back-to-back against the per-minute window.
    pub rpm_burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rps: 10,
            rpm: 600,
            rps_burst: 10,
            rpm_burst: 100,
        }
    }
}

/// Retry and timeout policy for network calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt for 429/5xx/transport failures.
    pub max_retries: u32,
    /// Per-call HTTP timeout.
    pub request_timeout: Duration,
    /// Longest single limiter wait a caller accepts before giving up.
    pub max_rate_limit_wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            request_timeout: Duration::from_secs(10),
            max_rate_limit_wait: Duration::from_secs(60),
        }
    }
}

/// Exponential backoff configuration for reconnecting streaming sessions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Minimum backoff delay in milliseconds.
    pub min_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Exponential factor to increase delay after each failure (>= 1).
    pub factor: u32,
    /// Random jitter percentage [0, 100] added to each delay.
    pub jitter_percent: u8,
    /// Reconnect attempts before the hub gives up; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_backoff_ms: 500,
            max_backoff_ms: 30_000,
            factor: 2,
            jitter_percent: 20,
            max_attempts: None,
        }
    }
}

/// Channel selection thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RouterConfig {
    /// A subscription counts as fresh if it delivered a message this recently.
    pub ws_fresh_within: Duration,
    /// REST is preferred for live queries while at least this fraction of the
    /// per-minute budget is unused.
    pub rest_headroom_floor: f64,
    /// Bounded queue size for each push-feed listener.
    pub listener_queue: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            ws_fresh_within: Duration::from_secs(5),
            rest_headroom_floor: 0.5,
            listener_queue: 256,
        }
    }
}

/// Global configuration for the `Collector` orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Limiter key for candle requests.
    pub limit_key: String,
    /// Window parameters applied to `limit_key`.
    pub rate_limit: RateLimitConfig,
    /// Retry and timeout policy.
    pub retry: RetryConfig,
    /// Streaming reconnect policy.
    pub backoff: BackoffConfig,
    /// Channel selection thresholds.
    pub router: RouterConfig,
    /// Candles per chunk, clamped to `MAX_CHUNK_CANDLES`.
    pub chunk_size: u16,
    /// How long an identical collect request is served from the aggregate cache.
    /// `None` disables the cache.
    pub cache_ttl: Option<Duration>,
    /// Maximum cached aggregates.
    pub cache_capacity: u64,
    /// Optional overall deadline for one collect request.
    pub request_timeout: Option<Duration>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            limit_key: DEFAULT_LIMIT_KEY.to_string(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            backoff: BackoffConfig::default(),
            router: RouterConfig::default(),
            chunk_size: MAX_CHUNK_CANDLES,
            cache_ttl: None,
            cache_capacity: 256,
            request_timeout: None,
        }
    }
}

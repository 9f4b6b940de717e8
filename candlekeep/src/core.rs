use std::sync::Arc;
use std::time::Duration;

use candlekeep_core::{
    BackoffConfig, CandleStorage, CollectResponse, CollectorConfig, CollectorError,
    MAX_CHUNK_CANDLES, RateLimitConfig, RestSource, RetryConfig, RouterConfig, StreamKind,
    StreamSource, Ticker, TimeRange, Timeframe,
};
use candlekeep_middleware::{AggregateCache, RateLimiter};
use tokio_util::sync::CancellationToken;

use crate::collector::{Collection, Pipeline};
use crate::router::ChannelRouter;
use crate::router::hub::{HubConfig, Listener, StreamHub};

/// Orchestrator that collects candle series into storage and serves live data.
///
/// Cloning is cheap; clones share the limiter, the push-feed hub and the
/// aggregate cache.
#[derive(Clone)]
pub struct Collector {
    pipeline: Arc<Pipeline>,
    cfg: Arc<CollectorConfig>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("router", &self.pipeline.router)
            .field("limit_key", &self.cfg.limit_key)
            .finish_non_exhaustive()
    }
}

/// Builder for constructing a [`Collector`].
pub struct CollectorBuilder {
    rest: Option<Arc<dyn RestSource>>,
    stream: Option<Arc<dyn StreamSource>>,
    storage: Option<Arc<dyn CandleStorage>>,
    limiter: Option<Arc<RateLimiter>>,
    cfg: CollectorConfig,
}

impl Default for CollectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectorBuilder {
    /// Create a builder with default configuration and no collaborators.
    ///
    /// A REST source and a storage are required; the push-feed source is
    /// optional and only needed for [`Collector::subscribe`] and
    /// push-served tickers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rest: None,
            stream: None,
            storage: None,
            limiter: None,
            cfg: CollectorConfig::default(),
        }
    }

    /// Paginated REST source for candles and tickers.
    #[must_use]
    pub fn rest(mut self, rest: Arc<dyn RestSource>) -> Self {
        self.rest = Some(rest);
        self
    }

    /// Push-feed source.
    #[must_use]
    pub fn stream(mut self, stream: Arc<dyn StreamSource>) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Persistence collaborator.
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn CandleStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Share an existing limiter, e.g. between collectors hitting the same venue.
    ///
    /// The collector still configures its own limit key on it.
    #[must_use]
    pub fn limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, cfg: CollectorConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Limiter key for candle and ticker requests.
    #[must_use]
    pub fn limit_key(mut self, key: impl Into<String>) -> Self {
        self.cfg.limit_key = key.into();
        self
    }

    /// Window parameters for the limit key.
    #[must_use]
    pub const fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.cfg.rate_limit = rate_limit;
        self
    }

    /// Retry and per-call timeout policy.
    #[must_use]
    pub const fn retry(mut self, retry: RetryConfig) -> Self {
        self.cfg.retry = retry;
        self
    }

    /// Backoff between REST retries and push-feed reconnects.
    #[must_use]
    pub const fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.cfg.backoff = backoff;
        self
    }

    /// Channel selection thresholds.
    #[must_use]
    pub const fn router(mut self, router: RouterConfig) -> Self {
        self.cfg.router = router;
        self
    }

    /// Candles per chunk; clamped to `1..=200`.
    #[must_use]
    pub fn chunk_size(mut self, size: u16) -> Self {
        self.cfg.chunk_size = size.clamp(1, MAX_CHUNK_CANDLES);
        self
    }

    /// Serve identical requests from memory for `ttl`.
    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cfg.cache_ttl = Some(ttl);
        self
    }

    /// Overall deadline for one collect request.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.cfg.request_timeout = Some(timeout);
        self
    }

    /// Build the collector.
    ///
    /// # Errors
    /// Returns `CollectorError::InvalidArg` when no REST source or storage
    /// was provided, or the limit key is empty.
    pub fn build(self) -> Result<Collector, CollectorError> {
        let rest = self
            .rest
            .ok_or_else(|| CollectorError::InvalidArg("a REST source is required".into()))?;
        let storage = self
            .storage
            .ok_or_else(|| CollectorError::InvalidArg("a storage is required".into()))?;
        let cfg = self.cfg;
        if cfg.limit_key.trim().is_empty() {
            return Err(CollectorError::InvalidArg("limit key must not be empty".into()));
        }

        let limiter = self.limiter.unwrap_or_else(|| {
            Arc::new(RateLimiter::new(
                cfg.rate_limit,
                cfg.retry.max_rate_limit_wait,
            ))
        });
        limiter.configure(&cfg.limit_key, cfg.rate_limit);

        let mut router = ChannelRouter::new(rest, limiter, cfg.limit_key.clone(), cfg.retry)
            .with_backoff(cfg.backoff)
            .with_config(cfg.router);
        if let Some(stream) = self.stream {
            let hub = StreamHub::new(
                stream,
                HubConfig {
                    backoff: cfg.backoff,
                    listener_queue: cfg.router.listener_queue,
                    ..HubConfig::default()
                },
            );
            router = router.with_hub(Arc::new(hub));
        }

        let pipeline = Pipeline {
            router: Arc::new(router),
            storage,
            cache: AggregateCache::new(cfg.cache_capacity, cfg.cache_ttl),
            chunk_size: cfg.chunk_size.clamp(1, MAX_CHUNK_CANDLES),
            request_timeout: cfg.request_timeout,
        };
        Ok(Collector {
            pipeline: Arc::new(pipeline),
            cfg: Arc::new(cfg),
            cancel: CancellationToken::new(),
        })
    }
}

impl Collector {
    /// Start building a collector.
    #[must_use]
    pub fn builder() -> CollectorBuilder {
        CollectorBuilder::new()
    }

    /// Start collecting `[range.start, range.end)` of `symbol` candles.
    ///
    /// Returns immediately; the request runs on a background task. Must be
    /// called within a Tokio runtime.
    #[must_use]
    pub fn collect(
        &self,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        range: TimeRange,
    ) -> Collection {
        self.collect_with_cancel(symbol, timeframe, range, &self.cancel)
    }

    /// [`Collector::collect`] under a caller-supplied cancellation token.
    ///
    /// The request also stops on [`Collector::shutdown`].
    #[must_use]
    pub fn collect_with_cancel(
        &self,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        range: TimeRange,
        cancel: &CancellationToken,
    ) -> Collection {
        self.pipeline.start(
            symbol.into(),
            timeframe,
            range,
            cancel,
            self.cancel.clone(),
        )
    }

    /// Collect and wait for the aggregate.
    ///
    /// # Errors
    /// See [`Collection::finish`].
    pub async fn collect_all(
        &self,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        range: TimeRange,
    ) -> Result<CollectResponse, CollectorError> {
        self.collect(symbol, timeframe, range).finish().await
    }

    /// Run independent requests concurrently.
    ///
    /// Requests only contend on the shared rate limiter. Results come back in
    /// input order.
    pub async fn collect_many<I, S>(
        &self,
        requests: I,
    ) -> Vec<Result<CollectResponse, CollectorError>>
    where
        I: IntoIterator<Item = (S, Timeframe, TimeRange)>,
        S: Into<String>,
    {
        let pending: Vec<Collection> = requests
            .into_iter()
            .map(|(symbol, tf, range)| self.collect(symbol, tf, range))
            .collect();
        futures::future::join_all(pending.into_iter().map(Collection::finish)).await
    }

    /// Register a push-feed listener.
    ///
    /// # Errors
    /// Returns `CollectorError::InvalidArg` when the collector has no stream
    /// source or `symbols` is empty.
    pub fn subscribe<S: AsRef<str>>(
        &self,
        kind: StreamKind,
        symbols: &[S],
    ) -> Result<Listener, CollectorError> {
        let hub = self.pipeline.router.hub().ok_or_else(|| {
            CollectorError::InvalidArg("collector was built without a stream source".into())
        })?;
        hub.subscribe(kind, symbols)
    }

    /// Current ticker of `symbol` on the channel picked by the router.
    ///
    /// # Errors
    /// Channel and limiter errors; `Cancelled` after shutdown.
    pub async fn live_ticker(&self, symbol: &str) -> Result<Ticker, CollectorError> {
        self.pipeline
            .router
            .live_ticker(&symbol.trim().to_uppercase(), &self.cancel)
            .await
    }

    /// The channel router.
    #[must_use]
    pub fn router(&self) -> &ChannelRouter {
        &self.pipeline.router
    }

    /// The shared rate limiter.
    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        self.pipeline.router.limiter()
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &CollectorConfig {
        &self.cfg
    }

    /// Drop every cached aggregate.
    pub fn invalidate_cache(&self) {
        self.pipeline.cache.invalidate_all();
    }

    /// Cancel in-flight requests and close the push feed.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(hub) = self.pipeline.router.hub() {
            hub.shutdown().await;
        }
    }
}

//! Channel selection and execution.
//!
//! [`decide_channel`] is a pure function over a [`MetricsSnapshot`]; the
//! [`ChannelRouter`] builds that snapshot from the hub and the limiter, then
//! runs the request on the chosen channel. Counters live in a separate
//! [`RouterMetrics`] observer.

pub mod backoff;
pub mod hub;
mod rest;
#[doc(hidden)]
pub mod supervisor;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use candlekeep_core::{
    BackoffConfig, Candle, CandleQuery, CollectorError, RetryConfig, RestSource, RouterConfig,
    StreamKind, Ticker,
};
use candlekeep_middleware::RateLimiter;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use self::hub::StreamHub;

/// Network channel a request runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Paginated request/response API.
    Rest,
    /// Push feed.
    WebSocket,
}

/// What a caller wants from the venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRequest {
    /// A page of historical candles. The push feed has no backfill, so this is REST-only.
    Candles(CandleQuery),
    /// The current ticker of one market.
    LiveTicker(String),
}

impl ChannelRequest {
    /// True for requests that can only be served from history.
    #[must_use]
    pub const fn is_historical(&self) -> bool {
        matches!(self, Self::Candles(_))
    }
}

/// Result of [`ChannelRouter::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelResponse {
    /// Candles, newest first as served by the venue.
    Candles(Vec<Candle>),
    /// A ticker.
    Ticker(Ticker),
}

/// Immutable inputs of [`decide_channel`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// A listener currently wants the symbol on the push feed.
    pub ws_subscribed: bool,
    /// The push feed delivered the symbol recently on a live session.
    pub ws_fresh: bool,
    /// Unused fraction of the REST quota, in `[0, 1]`.
    pub rest_headroom: f64,
    /// Headroom below which REST counts as scarce.
    pub rest_headroom_floor: f64,
}

/// Pick the channel for `request`.
///
/// - Historical requests always use REST.
/// - Live requests use the push feed when it holds fresh data for the symbol.
/// - A subscribed but momentarily quiet feed is still preferred while REST
///   headroom sits below the floor; otherwise REST answers.
#[must_use]
pub fn decide_channel(request: &ChannelRequest, snapshot: &MetricsSnapshot) -> Channel {
    if request.is_historical() {
        return Channel::Rest;
    }
    if snapshot.ws_fresh {
        return Channel::WebSocket;
    }
    if snapshot.ws_subscribed && snapshot.rest_headroom < snapshot.rest_headroom_floor {
        return Channel::WebSocket;
    }
    Channel::Rest
}

/// Point-in-time copy of [`RouterMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterCounts {
    /// REST calls sent, retries included.
    pub rest_calls: u64,
    /// REST calls repeated after a retryable failure.
    pub rest_retries: u64,
    /// Requests that failed after exhausting retries or on a fatal status.
    pub rest_failures: u64,
    /// Live requests answered from the push feed.
    pub ws_served: u64,
}

/// Mutable counters observed by the router.
#[derive(Debug, Default)]
pub struct RouterMetrics {
    rest_calls: AtomicU64,
    rest_retries: AtomicU64,
    rest_failures: AtomicU64,
    ws_served: AtomicU64,
}

impl RouterMetrics {
    pub(crate) fn rest_call(&self) {
        self.rest_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn rest_retry(&self) {
        self.rest_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn rest_failure(&self) {
        self.rest_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn ws_served(&self) {
        self.ws_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counter values.
    #[must_use]
    pub fn counts(&self) -> RouterCounts {
        RouterCounts {
            rest_calls: self.rest_calls.load(Ordering::Relaxed),
            rest_retries: self.rest_retries.load(Ordering::Relaxed),
            rest_failures: self.rest_failures.load(Ordering::Relaxed),
            ws_served: self.ws_served.load(Ordering::Relaxed),
        }
    }
}

/// Runs requests on REST or the push feed, admitting every REST call
/// through the shared [`RateLimiter`].
pub struct ChannelRouter {
    rest: Arc<dyn RestSource>,
    limiter: Arc<RateLimiter>,
    hub: Option<Arc<StreamHub>>,
    limit_key: String,
    retry: RetryConfig,
    backoff: BackoffConfig,
    cfg: RouterConfig,
    metrics: RouterMetrics,
}

impl std::fmt::Debug for ChannelRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRouter")
            .field("rest", &self.rest.name())
            .field("limit_key", &self.limit_key)
            .field("has_hub", &self.hub.is_some())
            .finish_non_exhaustive()
    }
}

impl ChannelRouter {
    /// Router over `rest`, admitting calls under `limit_key`.
    #[must_use]
    pub fn new(
        rest: Arc<dyn RestSource>,
        limiter: Arc<RateLimiter>,
        limit_key: impl Into<String>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            rest,
            limiter,
            hub: None,
            limit_key: limit_key.into(),
            retry,
            backoff: BackoffConfig::default(),
            cfg: RouterConfig::default(),
            metrics: RouterMetrics::default(),
        }
    }

    /// Attach a push-feed hub for live requests.
    #[must_use]
    pub fn with_hub(mut self, hub: Arc<StreamHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Delay policy between retries of 5xx and transport failures.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Freshness and headroom thresholds.
    #[must_use]
    pub const fn with_config(mut self, cfg: RouterConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// The shared limiter.
    #[must_use]
    pub const fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// The push-feed hub, if one is attached.
    #[must_use]
    pub const fn hub(&self) -> Option<&Arc<StreamHub>> {
        self.hub.as_ref()
    }

    /// Counter observer.
    #[must_use]
    pub const fn metrics(&self) -> &RouterMetrics {
        &self.metrics
    }

    /// Current routing inputs for a live request on `symbol`.
    #[must_use]
    pub fn snapshot(&self, symbol: &str) -> MetricsSnapshot {
        let (ws_subscribed, ws_fresh) = self.hub.as_ref().map_or((false, false), |hub| {
            (
                hub.is_subscribed(StreamKind::Ticker, symbol),
                hub.is_fresh(StreamKind::Ticker, symbol, self.cfg.ws_fresh_within),
            )
        });
        MetricsSnapshot {
            ws_subscribed,
            ws_fresh,
            rest_headroom: self.limiter.headroom(&self.limit_key),
            rest_headroom_floor: self.cfg.rest_headroom_floor,
        }
    }

    /// Decide the channel for `request` and run it.
    ///
    /// # Errors
    /// Returns `CollectorError::Channel` when the channel fails after retries,
    /// `CollectorError::Cancelled` when `cancel` fires, and limiter errors
    /// from admission.
    pub async fn execute(
        &self,
        request: ChannelRequest,
        cancel: &CancellationToken,
    ) -> Result<ChannelResponse, CollectorError> {
        match request {
            ChannelRequest::Candles(query) => self
                .fetch_candles(&query, cancel)
                .await
                .map(ChannelResponse::Candles),
            ChannelRequest::LiveTicker(symbol) => self
                .live_ticker(&symbol, cancel)
                .await
                .map(ChannelResponse::Ticker),
        }
    }

    /// Current ticker of `symbol`, from the push feed when it is fresh or
    /// REST is scarce, otherwise over REST.
    ///
    /// # Errors
    /// See [`ChannelRouter::execute`].
    pub async fn live_ticker(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<Ticker, CollectorError> {
        let request = ChannelRequest::LiveTicker(symbol.to_string());
        let channel = decide_channel(&request, &self.snapshot(symbol));
        #[cfg(feature = "tracing")]
        tracing::debug!(symbol, ?channel, "routing live ticker");
        if channel == Channel::WebSocket
            && let Some(t) = self.ticker_from_feed(symbol, cancel).await?
        {
            self.metrics.ws_served();
            return Ok(t);
        }
        self.fetch_ticker(symbol, cancel).await
    }

    /// Fetch one candle page over REST.
    ///
    /// # Errors
    /// See [`ChannelRouter::execute`].
    pub async fn fetch_candles(
        &self,
        query: &CandleQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Candle>, CollectorError> {
        let timeout = self.retry.request_timeout;
        self.call_rest(cancel, || self.rest.candles(query, timeout))
            .await
    }

    async fn fetch_ticker(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<Ticker, CollectorError> {
        let timeout = self.retry.request_timeout;
        let symbols = [symbol.to_string()];
        let tickers = self
            .call_rest(cancel, || self.rest.tickers(&symbols, timeout))
            .await?;
        tickers
            .into_iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| CollectorError::Data(format!("no ticker returned for {symbol}")))
    }

    /// Latest ticker from the feed, waiting up to the freshness window for
    /// the next push when the cached one is stale.
    async fn ticker_from_feed(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Ticker>, CollectorError> {
        let Some(hub) = &self.hub else {
            return Ok(None);
        };
        let within = self.cfg.ws_fresh_within;
        if let Some(t) = hub.latest_ticker(symbol, within) {
            return Ok(Some(t));
        }
        let mut listener = hub.subscribe(StreamKind::Ticker, &[symbol])?;
        let wait = async {
            while let Some(ev) = listener.recv().await {
                if let candlekeep_core::MarketEvent::Ticker(t) = ev {
                    return Some(t);
                }
            }
            None
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(CollectorError::Cancelled),
            res = tokio::time::timeout(within.max(Duration::from_millis(1)), wait) => Ok(res.ok().flatten()),
        }
    }
}

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::stream::StreamHandle;
use crate::{Candle, CollectorError, MarketEvent, StreamKind, Ticker, Timeframe};

/// Parameters of one paginated candle request.
///
/// The provider returns at most `count` candles with open times strictly
/// before `to`, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleQuery {
    /// Market code.
    pub symbol: String,
    /// Candle unit.
    pub timeframe: Timeframe,
    /// Exclusive newest edge.
    pub to: DateTime<Utc>,
    /// Page size, at most 200.
    pub count: u16,
}

/// One HTTP exchange as seen by the router.
///
/// Non-success statuses are returned, not raised, so the router can feed
/// quota headers back into the limiter before deciding whether to retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestReply<T> {
    /// HTTP status code.
    pub status: u16,
    /// Raw `Remaining-Req` header, when present.
    pub remaining_req: Option<String>,
    /// `Retry-After` hint, when present.
    pub retry_after: Option<Duration>,
    /// Decoded payload for success statuses.
    pub data: Option<T>,
    /// Error body for failure statuses.
    pub message: Option<String>,
}

impl<T> RestReply<T> {
    /// A 200 reply carrying `data`.
    pub const fn ok(data: T) -> Self {
        Self {
            status: 200,
            remaining_req: None,
            retry_after: None,
            data: Some(data),
            message: None,
        }
    }

    /// A failure reply with `status` and an error body.
    pub fn failed(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            remaining_req: None,
            retry_after: None,
            data: None,
            message: Some(message.into()),
        }
    }

    /// Attach a `Remaining-Req` header value.
    #[must_use]
    pub fn with_remaining(mut self, header: impl Into<String>) -> Self {
        self.remaining_req = Some(header.into());
        self
    }

    /// Attach a `Retry-After` hint.
    #[must_use]
    pub const fn with_retry_after(mut self, after: Duration) -> Self {
        self.retry_after = Some(after);
        self
    }

    /// True for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Paginated REST access to a venue's quotation API.
#[async_trait]
pub trait RestSource: Send + Sync {
    /// Short connector name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Fetch one page of candles, newest first.
    ///
    /// Transport failures (connect, timeout, body read) are returned as
    /// `CollectorError::Channel` without a status.
    async fn candles(
        &self,
        query: &CandleQuery,
        timeout: Duration,
    ) -> Result<RestReply<Vec<Candle>>, CollectorError>;

    /// Fetch current tickers for `symbols`.
    async fn tickers(
        &self,
        symbols: &[String],
        timeout: Duration,
    ) -> Result<RestReply<Vec<Ticker>>, CollectorError>;
}

/// Consolidated subscription set sent under one ticket.
///
/// Sending a new `Subscription` on the same ticket replaces the previous set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Ticket identifying the subscriber on the venue side.
    pub ticket: String,
    /// Market codes per stream kind.
    pub topics: BTreeMap<StreamKind, BTreeSet<String>>,
    /// Candle unit for `StreamKind::Candle` topics.
    pub candle_timeframe: Timeframe,
}

impl Subscription {
    /// Empty subscription set for `ticket`.
    pub fn new(ticket: impl Into<String>) -> Self {
        Self {
            ticket: ticket.into(),
            topics: BTreeMap::new(),
            candle_timeframe: Timeframe::M1,
        }
    }

    /// True when no topic has any code.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.values().all(BTreeSet::is_empty)
    }

    /// True when `(kind, symbol)` is part of the set.
    #[must_use]
    pub fn contains(&self, kind: StreamKind, symbol: &str) -> bool {
        self.topics.get(&kind).is_some_and(|codes| codes.contains(symbol))
    }
}

/// One live push-feed connection.
///
/// The session task owns the socket. Subscriptions written to `commands` are
/// forwarded to the venue; decoded messages arrive on `events`. The events
/// channel closing means the connection is gone.
#[derive(Debug)]
pub struct StreamSession {
    /// Stops the socket task when stopped or dropped.
    pub handle: StreamHandle,
    /// Replace-not-merge subscription updates.
    pub commands: mpsc::Sender<Subscription>,
    /// Canonical decoded messages.
    pub events: mpsc::Receiver<MarketEvent>,
}

/// Push-feed access to a venue.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Short connector name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Open a new connection and spawn its receive task.
    async fn connect(&self) -> Result<StreamSession, CollectorError>;
}

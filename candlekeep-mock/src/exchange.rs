use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use candlekeep_core::{
    Candle, CandleQuery, CollectorError, RestReply, RestSource, Ticker, Timeframe,
};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::fixtures;

/// Scripted outcome for the next candle request.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Reply with a failure status and an optional `Remaining-Req` header.
    Status {
        /// HTTP status code.
        status: u16,
        /// Header value attached to the reply.
        remaining_req: Option<String>,
        /// `Retry-After` hint.
        retry_after: Option<Duration>,
    },
    /// Fail the call at the transport level.
    Fail(CollectorError),
    /// Never answer (simulate a stalled request).
    Hang,
}

impl MockBehavior {
    /// A bare 429 reply.
    #[must_use]
    pub const fn too_many_requests() -> Self {
        Self::Status {
            status: 429,
            remaining_req: None,
            retry_after: None,
        }
    }

    /// A bare failure status.
    #[must_use]
    pub const fn status(status: u16) -> Self {
        Self::Status {
            status,
            remaining_req: None,
            retry_after: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Series {
    /// Oldest candle the exchange has.
    data_start: DateTime<Utc>,
    /// Slots without trades; the exchange omits them like a real venue does.
    holes: BTreeSet<DateTime<Utc>>,
    /// Slots served with broken OHLC values.
    broken: BTreeSet<DateTime<Utc>>,
    /// Slots served twice in the same page.
    duplicated: BTreeSet<DateTime<Utc>>,
}

#[derive(Default)]
struct ExchangeState {
    series: HashMap<(String, Timeframe), Series>,
    scripted: VecDeque<MockBehavior>,
    queries: Vec<CandleQuery>,
    remaining_req: Option<String>,
}

/// In-memory exchange serving generated candle series.
///
/// Pages follow the venue contract: at most `count` candles with open times
/// strictly before `to`, newest first, omitting slots before the series'
/// first candle and slots without trades.
#[derive(Clone, Default)]
pub struct MockExchange {
    state: Arc<Mutex<ExchangeState>>,
    calls: Arc<AtomicUsize>,
}

impl MockExchange {
    /// Empty exchange; every market answers 404 until a series is registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `(symbol, tf)` with candles available from `data_start` onward.
    pub async fn set_series(&self, symbol: &str, tf: Timeframe, data_start: DateTime<Utc>) {
        let mut guard = self.state.lock().await;
        guard.series.insert(
            (symbol.to_string(), tf),
            Series {
                data_start: tf.align(data_start),
                holes: BTreeSet::new(),
                broken: BTreeSet::new(),
                duplicated: BTreeSet::new(),
            },
        );
    }

    /// Mark slots as trade-less so they are omitted from pages.
    pub async fn add_holes(&self, symbol: &str, tf: Timeframe, slots: &[DateTime<Utc>]) {
        let mut guard = self.state.lock().await;
        if let Some(s) = guard.series.get_mut(&(symbol.to_string(), tf)) {
            s.holes.extend(slots.iter().copied());
        }
    }

    /// Serve the candle at `slot` with high below low.
    pub async fn break_candle(&self, symbol: &str, tf: Timeframe, slot: DateTime<Utc>) {
        let mut guard = self.state.lock().await;
        if let Some(s) = guard.series.get_mut(&(symbol.to_string(), tf)) {
            s.broken.insert(slot);
        }
    }

    /// Serve the candle at `slot` twice.
    pub async fn duplicate_candle(&self, symbol: &str, tf: Timeframe, slot: DateTime<Utc>) {
        let mut guard = self.state.lock().await;
        if let Some(s) = guard.series.get_mut(&(symbol.to_string(), tf)) {
            s.duplicated.insert(slot);
        }
    }

    /// Queue a scripted outcome consumed by the next candle request.
    pub async fn script(&self, behavior: MockBehavior) {
        self.state.lock().await.scripted.push_back(behavior);
    }

    /// Attach `header` as `Remaining-Req` to every successful reply.
    pub async fn set_remaining_header(&self, header: impl Into<String>) {
        self.state.lock().await.remaining_req = Some(header.into());
    }

    /// Candle requests received so far, including failed ones.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Copy of every candle query received, in arrival order.
    pub async fn queries(&self) -> Vec<CandleQuery> {
        self.state.lock().await.queries.clone()
    }

    fn page(symbol: &str, series: &Series, query: &CandleQuery) -> Vec<Candle> {
        let tf = query.timeframe;
        let mut out = Vec::with_capacity(usize::from(query.count));
        let mut slot = tf.align(query.to);
        if slot >= query.to {
            slot = tf.shift(slot, -1);
        }
        while out.len() < usize::from(query.count) && slot >= series.data_start {
            if !series.holes.contains(&slot) {
                let c = if series.broken.contains(&slot) {
                    fixtures::broken_candle(symbol, tf, slot)
                } else {
                    fixtures::candle(symbol, tf, slot)
                };
                if series.duplicated.contains(&slot) {
                    out.push(c.clone());
                }
                out.push(c);
            }
            slot = tf.shift(slot, -1);
        }
        out
    }
}

#[async_trait]
impl RestSource for MockExchange {
    fn name(&self) -> &'static str {
        "mock-exchange"
    }

    async fn candles(
        &self,
        query: &CandleQuery,
        _timeout: Duration,
    ) -> Result<RestReply<Vec<Candle>>, CollectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (scripted, series, header) = {
            let mut guard = self.state.lock().await;
            guard.queries.push(query.clone());
            let scripted = guard.scripted.pop_front();
            let series = guard
                .series
                .get(&(query.symbol.clone(), query.timeframe))
                .cloned();
            (scripted, series, guard.remaining_req.clone())
        };

        match scripted {
            Some(MockBehavior::Status {
                status,
                remaining_req,
                retry_after,
            }) => {
                let mut reply = RestReply::failed(status, format!("scripted status {status}"));
                reply.remaining_req = remaining_req;
                reply.retry_after = retry_after;
                return Ok(reply);
            }
            Some(MockBehavior::Fail(e)) => return Err(e),
            Some(MockBehavior::Hang) => return std::future::pending().await,
            None => {}
        }

        let Some(series) = series else {
            return Ok(RestReply::failed(404, format!("Code not found: {}", query.symbol)));
        };
        let reply = RestReply::ok(Self::page(&query.symbol, &series, query));
        Ok(match header {
            Some(h) => reply.with_remaining(h),
            None => reply,
        })
    }

    async fn tickers(
        &self,
        symbols: &[String],
        _timeout: Duration,
    ) -> Result<RestReply<Vec<Ticker>>, CollectorError> {
        let now = Utc::now();
        Ok(RestReply::ok(
            symbols.iter().map(|s| fixtures::ticker(s, now)).collect(),
        ))
    }
}

//! Chunked collection of one request.
//!
//! A request is clamped to closed candles, split into newest-first chunks of
//! at most 200 slots and driven chunk by chunk through
//! Planning -> Fetching -> Processing -> Storing by one supervisor task. Chunk
//! outcomes are streamed as they finish; the aggregate arrives last.

mod aggregate;
mod chunk;
mod process;

use std::sync::Arc;
use std::time::Duration;

use candlekeep_core::{
    CandleStorage, ChunkResult, ChunkStatus, CollectResponse, CollectorError, DataSource,
    TimeRange, Timeframe, chunk_specs,
};
use candlekeep_middleware::{AggregateCache, AggregateKey};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use self::aggregate::aggregate;
use self::chunk::{ChunkContext, run_chunk};
use crate::router::ChannelRouter;

/// Everything a request needs, shared by all requests of one collector.
pub(crate) struct Pipeline {
    pub router: Arc<ChannelRouter>,
    pub storage: Arc<dyn CandleStorage>,
    pub cache: AggregateCache<AggregateKey, CollectResponse>,
    pub chunk_size: u16,
    pub request_timeout: Option<Duration>,
}

/// An in-flight collect request.
///
/// Per-chunk results can be consumed as they complete with
/// [`Collection::next_chunk`]; [`Collection::finish`] waits for the aggregate.
/// Dropping a `Collection` detaches the request; call [`Collection::cancel`]
/// to stop it.
#[derive(Debug)]
pub struct Collection {
    chunks: mpsc::UnboundedReceiver<ChunkResult>,
    done: oneshot::Receiver<Result<CollectResponse, CollectorError>>,
    cancel: CancellationToken,
}

impl Collection {
    /// Next finished chunk, in pagination order (newest first). `None` once
    /// the request is done.
    pub async fn next_chunk(&mut self) -> Option<ChunkResult> {
        self.chunks.recv().await
    }

    /// The raw chunk receiver.
    pub const fn chunks(&mut self) -> &mut mpsc::UnboundedReceiver<ChunkResult> {
        &mut self.chunks
    }

    /// Wait for the aggregate response.
    ///
    /// # Errors
    /// Returns the fatal error that stopped the request: `InvalidArg` for an
    /// empty range, `Cancelled`, or `Timeout` when the overall deadline passed.
    pub async fn finish(self) -> Result<CollectResponse, CollectorError> {
        self.done.await.unwrap_or(Err(CollectorError::Cancelled))
    }

    /// Stop the request. Chunks already stored stay stored.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this request.
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Pipeline {
    /// Spawn the supervisor task for one request.
    ///
    /// The request stops when either `parent` or `shutdown` is cancelled.
    pub(crate) fn start(
        self: &Arc<Self>,
        symbol: String,
        timeframe: Timeframe,
        range: TimeRange,
        parent: &CancellationToken,
        shutdown: CancellationToken,
    ) -> Collection {
        let (tx, chunks) = mpsc::unbounded_channel();
        let (done_tx, done) = oneshot::channel();
        let cancel = parent.child_token();
        let token = cancel.clone();
        let this = Arc::clone(self);

        tokio::spawn(async move {
            let started = Instant::now();
            let work = async {
                let run = this.run(&symbol, timeframe, range, &token, &tx, started);
                match this.request_timeout {
                    Some(limit) => tokio::time::timeout(limit, run).await.unwrap_or_else(|_| {
                        Err(CollectorError::Timeout(format!(
                            "collect {symbol} {timeframe} exceeded {} ms",
                            limit.as_millis()
                        )))
                    }),
                    None => run.await,
                }
            };
            let res = tokio::select! {
                res = work => res,
                () = shutdown.cancelled() => Err(CollectorError::Cancelled),
            };
            // Stop anything still holding the request token.
            token.cancel();
            #[cfg(feature = "tracing")]
            if let Err(e) = &res {
                tracing::warn!(symbol = %symbol, %timeframe, error = %e, "collect request failed");
            }
            let _ = done_tx.send(res);
        });

        Collection {
            chunks,
            done,
            cancel,
        }
    }

    async fn run(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        requested: TimeRange,
        cancel: &CancellationToken,
        tx: &mpsc::UnboundedSender<ChunkResult>,
        started: Instant,
    ) -> Result<CollectResponse, CollectorError> {
        if symbol.trim().is_empty() {
            return Err(CollectorError::InvalidArg("symbol must not be empty".into()));
        }
        let range = align_to_closed(&requested, timeframe)?;

        let key = AggregateKey::new(symbol, timeframe, range);
        if let Some(mut cached) = self.cache.get(&key).await {
            #[cfg(feature = "tracing")]
            tracing::debug!(symbol, %timeframe, "serving collect request from cache");
            cached.data_source = DataSource::Cache;
            cached.response_time_ms = elapsed_ms(started);
            return Ok(cached);
        }

        let specs = chunk_specs(symbol, timeframe, &range, self.chunk_size)?;
        #[cfg(feature = "tracing")]
        tracing::info!(
            symbol,
            %timeframe,
            start = %range.start(),
            end = %range.end(),
            chunks = specs.len(),
            "collecting"
        );

        let ctx = ChunkContext {
            router: &self.router,
            storage: self.storage.as_ref(),
            request: range,
            cancel,
        };
        let mut results = Vec::with_capacity(specs.len());
        for spec in &specs {
            if cancel.is_cancelled() {
                return Err(CollectorError::Cancelled);
            }
            let result = run_chunk(&ctx, spec).await?;
            let stop = result.status == ChunkStatus::EarlyExit;
            // The receiver may have been dropped; the aggregate still completes.
            let _ = tx.send(result.clone());
            results.push(result);
            if stop {
                break;
            }
        }

        let response = aggregate(results, &range, elapsed_ms(started));
        #[cfg(feature = "tracing")]
        tracing::info!(
            symbol,
            %timeframe,
            candles = response.total_count,
            source = ?response.data_source,
            elapsed_ms = response.response_time_ms,
            "collect finished"
        );
        if response.error_message.is_none() {
            self.cache.put(key, response.clone()).await;
        }
        Ok(response)
    }
}

/// Snap `range` to candle boundaries and restrict it to candles that have
/// closed by now.
///
/// Both bounds are floored, so a partial oldest slot is included and a
/// partial newest slot is not.
fn align_to_closed(range: &TimeRange, timeframe: Timeframe) -> Result<TimeRange, CollectorError> {
    let open_candle = timeframe.align(Utc::now());
    let start = timeframe.align(range.start());
    let end = timeframe.align(range.end()).min(open_candle);
    TimeRange::new(start, end).map_err(|_| {
        CollectorError::InvalidArg(format!(
            "range {} .. {} holds no closed {timeframe} candle",
            range.start(),
            range.end()
        ))
    })
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

//! One chunk through Planning, Fetching, Processing and Storing.

use candlekeep_core::{
    CandleQuery, CandleStorage, ChunkPhase, ChunkResult, ChunkSpec, ChunkStatus, CollectorError,
    FetchStrategy, TimeRange, analyze, candle_count, plan,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::process::process;
use crate::router::ChannelRouter;

/// Shared inputs of every chunk in one request.
pub(crate) struct ChunkContext<'a> {
    pub router: &'a ChannelRouter,
    pub storage: &'a dyn CandleStorage,
    /// The whole (clamped) request.
    pub request: TimeRange,
    pub cancel: &'a CancellationToken,
}

const fn strategy_label(s: FetchStrategy) -> &'static str {
    match s {
        FetchStrategy::Skip => "skip_complete_overlap",
        FetchStrategy::Partial => "partial_fetch",
        FetchStrategy::Full => "full_fetch",
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn failed(mut result: ChunkResult, err: CollectorError, started: Instant) -> ChunkResult {
    #[cfg(feature = "tracing")]
    tracing::warn!(chunk = result.index, error = %err, "chunk failed");
    result.status = ChunkStatus::Error;
    result.error = Some(err);
    result.elapsed_ms = elapsed_ms(started);
    result
}

/// Run one chunk.
///
/// Chunk-local failures come back as a `ChunkStatus::Error` result; only
/// fatal errors (cancellation, invalid arguments) are returned as `Err`.
pub(crate) async fn run_chunk(
    ctx: &ChunkContext<'_>,
    spec: &ChunkSpec,
) -> Result<ChunkResult, CollectorError> {
    let started = Instant::now();
    let mut result = ChunkResult::new(spec.index, ChunkStatus::Success);

    // Planning
    let existing = match ctx
        .storage
        .existing_range(&spec.symbol, spec.timeframe)
        .await
    {
        Ok(e) => e,
        Err(e) => return Ok(failed(result, e, started)),
    };
    let overlap = analyze(&ctx.request, existing.as_ref());
    let execution = plan(spec, &overlap);
    result
        .metadata
        .insert("strategy".into(), strategy_label(execution.strategy).into());
    result.phases_completed.push(ChunkPhase::Planning);

    let params = match execution.optimized_params {
        Some(params) if !execution.should_skip_api_call => params,
        _ => {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                chunk = spec.index,
                symbol = %spec.symbol,
                start = %execution.expected_range.start(),
                "chunk already stored, skipping fetch"
            );
            return match ctx
                .storage
                .load_candles(&spec.symbol, spec.timeframe, execution.expected_range)
                .await
            {
                Ok(stored) => {
                    result.status = ChunkStatus::Skipped;
                    result.candles = stored;
                    result.elapsed_ms = elapsed_ms(started);
                    Ok(result)
                }
                Err(e) => Ok(failed(result, e, started)),
            };
        }
    };

    // Fetching
    let query = CandleQuery {
        symbol: spec.symbol.clone(),
        timeframe: spec.timeframe,
        to: params.to,
        count: params.count,
    };
    let raw = match ctx.router.fetch_candles(&query, ctx.cancel).await {
        Ok(raw) => raw,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => return Ok(failed(result, e, started)),
    };
    result.phases_completed.push(ChunkPhase::Fetching);
    let exhausted = raw.len() < usize::from(params.count);
    result
        .metadata
        .insert("requested_count".into(), params.count.to_string());
    result
        .metadata
        .insert("received_count".into(), raw.len().to_string());

    // Processing
    let processed = process(raw, &execution.expected_range, spec.timeframe, exhausted);
    let expected_slots = candle_count(
        execution.expected_range.start(),
        execution.expected_range.end(),
        spec.timeframe,
    );
    result
        .metadata
        .insert("expected_slots".into(), expected_slots.to_string());
    if processed.synthetic > 0 {
        result
            .metadata
            .insert("synthetic_count".into(), processed.synthetic.to_string());
    }
    if processed.duplicates > 0 {
        result
            .metadata
            .insert("duplicates_dropped".into(), processed.duplicates.to_string());
    }
    if let Some(first) = processed.invalid.first() {
        result
            .metadata
            .insert("invalid_dropped".into(), processed.invalid.len().to_string());
        result
            .metadata
            .insert("invalid_reason".into(), first.to_string());
    }
    result.phases_completed.push(ChunkPhase::Processing);

    // Storing
    let candles = processed.candles;
    if !candles.is_empty() {
        match ctx
            .storage
            .upsert_candles(&spec.symbol, spec.timeframe, &candles)
            .await
        {
            Ok(saved) => {
                result.saved_count = saved;
                if saved != candles.len() {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        chunk = spec.index,
                        expected = candles.len(),
                        saved,
                        "storage saved a different number of candles"
                    );
                    result.metadata.insert(
                        "saved_mismatch".into(),
                        format!("expected {} saved {saved}", candles.len()),
                    );
                }
            }
            Err(e) => return Ok(failed(result, e, started)),
        }
    }
    result.phases_completed.push(ChunkPhase::Storing);
    result.candles = candles;

    // The newer part of a partial chunk was already stored.
    if execution.strategy == FetchStrategy::Partial {
        let chunk_range = spec.range();
        if let Ok(covered) = TimeRange::new(execution.expected_range.end(), chunk_range.end()) {
            match ctx
                .storage
                .load_candles(&spec.symbol, spec.timeframe, covered)
                .await
            {
                Ok(stored) => result.candles.extend(stored),
                Err(e) => return Ok(failed(result, e, started)),
            }
        }
    }

    if exhausted {
        #[cfg(feature = "tracing")]
        tracing::info!(
            chunk = spec.index,
            symbol = %spec.symbol,
            requested = params.count,
            real = processed.real,
            "provider has no older data, stopping"
        );
        result.status = ChunkStatus::EarlyExit;
        result
            .metadata
            .insert("early_exit".into(), "provider_data_end".into());
    }
    result.elapsed_ms = elapsed_ms(started);
    Ok(result)
}

use crate::timeframe::candle_count;
use crate::{
    ChunkSpec, CollectorError, ExecutionPlan, FetchParams, FetchStrategy, OverlapResult, TimeRange,
    Timeframe, MAX_CHUNK_CANDLES,
};

/// Plan one chunk against the overlap analysis of the whole request.
///
/// Stored coverage is `[connected_end, request end)`. A chunk inside it is
/// skipped, a chunk straddling `connected_end` only fetches its older,
/// uncovered part, and anything else is fetched in full.
#[must_use]
pub fn plan(chunk: &ChunkSpec, overlap: &OverlapResult) -> ExecutionPlan {
    let range = chunk.range();
    match overlap.connected_end {
        Some(connected) if range.start() >= connected => ExecutionPlan {
            strategy: FetchStrategy::Skip,
            should_skip_api_call: true,
            optimized_params: None,
            expected_range: range,
        },
        Some(connected) if range.start() < connected && connected < range.end() => {
            let count = candle_count(range.start(), connected, chunk.timeframe);
            let count = u16::try_from(count).unwrap_or(chunk.count).min(chunk.count);
            // range.start() < connected, so the sub-range is never empty.
            let expected_range = TimeRange::new(range.start(), connected).unwrap_or(range);
            #[cfg(feature = "tracing")]
            tracing::debug!(
                symbol = %chunk.symbol,
                index = chunk.index,
                to = %connected,
                count,
                "narrowing chunk to uncovered range"
            );
            ExecutionPlan {
                strategy: FetchStrategy::Partial,
                should_skip_api_call: false,
                optimized_params: Some(FetchParams {
                    to: connected,
                    count,
                }),
                expected_range,
            }
        }
        _ => ExecutionPlan {
            strategy: FetchStrategy::Full,
            should_skip_api_call: false,
            optimized_params: Some(FetchParams {
                to: chunk.start_time,
                count: chunk.count,
            }),
            expected_range: range,
        },
    }
}

/// Split a request into newest-first chunks of at most `max_count` candles.
///
/// The range is aligned to `[align(start), align(end))`; `max_count` is
/// clamped to `1..=200`.
///
/// # Errors
/// Returns `CollectorError::InvalidArg` when the aligned range holds no slot.
pub fn chunk_specs(
    symbol: &str,
    timeframe: Timeframe,
    range: &TimeRange,
    max_count: u16,
) -> Result<Vec<ChunkSpec>, CollectorError> {
    let per_chunk = max_count.clamp(1, MAX_CHUNK_CANDLES);
    let total = candle_count(range.start(), range.end(), timeframe);
    if total == 0 {
        return Err(CollectorError::InvalidArg(format!(
            "range {} .. {} holds no {timeframe} candle",
            range.start(),
            range.end()
        )));
    }

    let mut remaining = total;
    let mut cursor = timeframe.align(range.end());
    let mut out = Vec::with_capacity(total.div_ceil(usize::from(per_chunk)));
    while remaining > 0 {
        let count = u16::try_from(remaining).map_or(per_chunk, |r| r.min(per_chunk));
        out.push(ChunkSpec {
            symbol: symbol.to_string(),
            timeframe,
            start_time: cursor,
            count,
            index: out.len(),
        });
        cursor = timeframe.shift(cursor, -i64::from(count));
        remaining -= usize::from(count);
    }
    #[cfg(feature = "tracing")]
    tracing::trace!(symbol, %timeframe, total, chunks = out.len(), "generated chunk specs");
    Ok(out)
}

use candlekeep_core::{
    ChunkResult, ChunkStatus, ChunkSummary, CollectResponse, DataSource, TimeRange,
};

use super::process::merge;

/// Fold per-chunk results into the aggregate response.
///
/// Chunks are re-sequenced chronologically (oldest first). The request
/// succeeds when at least one chunk did.
pub(crate) fn aggregate(
    mut results: Vec<ChunkResult>,
    range: &TimeRange,
    response_time_ms: u64,
) -> CollectResponse {
    results.sort_by(|a, b| b.index.cmp(&a.index));

    let db_chunks = results
        .iter()
        .filter(|r| r.status == ChunkStatus::Skipped)
        .count();
    let api_chunks = results
        .iter()
        .filter(|r| matches!(r.status, ChunkStatus::Success | ChunkStatus::EarlyExit))
        .count();
    let success = results.iter().any(ChunkResult::is_ok);

    let errors: Vec<String> = results
        .iter()
        .filter_map(|r| r.error.as_ref().map(|e| format!("chunk {}: {e}", r.index)))
        .collect();
    let error_message = if errors.is_empty() {
        None
    } else {
        Some(errors.join("; "))
    };

    let chunks: Vec<ChunkSummary> = results.iter().map(ChunkSummary::from).collect();
    let candles = merge(
        results.into_iter().map(|r| r.candles).collect(),
        range,
    );

    CollectResponse {
        success,
        total_count: candles.len(),
        candles,
        data_source: DataSource::from_counts(db_chunks, api_chunks),
        response_time_ms,
        error_message,
        chunks,
    }
}

//! Aggregate response envelopes produced by the collector.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Candle, ChunkResult, ChunkStatus};

/// Where the candles of an aggregate response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Served from the in-process aggregate cache.
    Cache,
    /// Every chunk was already stored locally.
    Db,
    /// Every chunk was fetched from the provider.
    Api,
    /// Some chunks came from storage, some from the provider.
    Mixed,
}

impl DataSource {
    /// Classify from the number of storage-served and provider-served chunks.
    #[must_use]
    pub const fn from_counts(db_chunks: usize, api_chunks: usize) -> Self {
        match (db_chunks, api_chunks) {
            (0, 0) | (_, 0) => Self::Db,
            (0, _) => Self::Api,
            _ => Self::Mixed,
        }
    }
}

/// Serializable per-chunk detail carried in the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSummary {
    /// Chunk position in pagination order.
    pub index: usize,
    /// Terminal state.
    pub status: ChunkStatus,
    /// Rows saved by storage.
    pub saved_count: usize,
    /// Wall time spent on the chunk.
    pub elapsed_ms: u64,
    /// Non-fatal notes.
    pub metadata: BTreeMap<String, String>,
    /// Failure message, if any.
    pub error: Option<String>,
}

impl From<&ChunkResult> for ChunkSummary {
    fn from(r: &ChunkResult) -> Self {
        Self {
            index: r.index,
            status: r.status,
            saved_count: r.saved_count,
            elapsed_ms: r.elapsed_ms,
            metadata: r.metadata.clone(),
            error: r.error.as_ref().map(ToString::to_string),
        }
    }
}

/// Final result of one collect request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectResponse {
    /// True unless every attempted chunk failed.
    pub success: bool,
    /// Candles covering the request, oldest first, one per slot.
    pub candles: Vec<Candle>,
    /// `candles.len()`.
    pub total_count: usize,
    /// Source mix.
    pub data_source: DataSource,
    /// End-to-end latency.
    pub response_time_ms: u64,
    /// Collapsed description of chunk failures, if any.
    pub error_message: Option<String>,
    /// Per-chunk detail in chronological order.
    pub chunks: Vec<ChunkSummary>,
}

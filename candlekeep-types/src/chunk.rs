//! Per-chunk planning and outcome types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Candle, CollectorError, TimeRange, Timeframe};

/// Whether local storage overlaps a requested range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverlapStatus {
    /// Nothing stored intersects the request.
    NoOverlap,
    /// Stored data reaches into the request.
    HasOverlap,
}

/// Outcome of comparing a requested range against stored coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapResult {
    /// Overlap classification.
    pub status: OverlapStatus,
    /// Oldest instant down to which stored data is contiguous with the
    /// request's newest edge. `None` when that edge itself is not stored.
    pub connected_end: Option<DateTime<Utc>>,
}

impl OverlapResult {
    /// No stored data intersects the request.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            status: OverlapStatus::NoOverlap,
            connected_end: None,
        }
    }

    /// Stored data intersects the request, contiguous down to `connected_end` if any.
    #[must_use]
    pub const fn overlapping(connected_end: Option<DateTime<Utc>>) -> Self {
        Self {
            status: OverlapStatus::HasOverlap,
            connected_end,
        }
    }
}

/// One page of a paginated fetch.
///
/// `start_time` is the pagination cursor: the chunk covers the `count`
/// candle slots strictly before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpec {
    /// Market code.
    pub symbol: String,
    /// Candle unit.
    pub timeframe: Timeframe,
    /// Exclusive newest edge the chunk pages backward from.
    pub start_time: DateTime<Utc>,
    /// Number of candle slots, at most 200.
    pub count: u16,
    /// Position in pagination order (0 = newest).
    pub index: usize,
}

impl ChunkSpec {
    /// Slots covered by the chunk. A zero count is treated as one slot.
    #[must_use]
    pub fn range(&self) -> TimeRange {
        let slots = i64::from(self.count.max(1));
        let oldest = self.timeframe.shift(self.start_time, -slots);
        TimeRange::new_unchecked(oldest, self.start_time)
    }
}

/// Per-chunk fetch strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchStrategy {
    /// The chunk is already stored contiguously; no network call.
    #[serde(rename = "skip_complete_overlap")]
    Skip,
    /// Only the uncovered older part of the chunk is fetched.
    #[serde(rename = "partial_fetch")]
    Partial,
    /// The whole chunk is fetched.
    #[serde(rename = "full_fetch")]
    Full,
}

/// Request parameters sent to the provider for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchParams {
    /// Exclusive newest edge (`to` query parameter).
    pub to: DateTime<Utc>,
    /// Number of candles requested (`count` query parameter).
    pub count: u16,
}

/// Plan for one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Selected strategy.
    pub strategy: FetchStrategy,
    /// True when no network call is needed.
    pub should_skip_api_call: bool,
    /// Narrowed provider parameters; `None` when skipping.
    pub optimized_params: Option<FetchParams>,
    /// Slots the chunk is expected to end up covering.
    pub expected_range: TimeRange,
}

/// Phases of the per-chunk state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkPhase {
    /// Overlap analysis and planning.
    Planning,
    /// Network fetch.
    Fetching,
    /// Validation and gap filling.
    Processing,
    /// Persistence.
    Storing,
}

/// Terminal state of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkStatus {
    /// Fetched, processed and stored.
    Success,
    /// Served from storage without a network call.
    Skipped,
    /// The provider has no older data; whatever arrived was stored.
    EarlyExit,
    /// The chunk failed; other chunks are unaffected.
    Error,
}

/// Outcome of processing one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkResult {
    /// Chunk position in pagination order.
    pub index: usize,
    /// Terminal state.
    pub status: ChunkStatus,
    /// Rows reported saved by storage.
    pub saved_count: usize,
    /// Wall time spent on the chunk.
    pub elapsed_ms: u64,
    /// Phases that ran to completion.
    pub phases_completed: Vec<ChunkPhase>,
    /// Non-fatal notes (count mismatches, dropped candles, plan details).
    pub metadata: BTreeMap<String, String>,
    /// Failure cause for `ChunkStatus::Error`.
    pub error: Option<CollectorError>,
    /// Candles produced by the chunk, oldest first.
    #[serde(skip)]
    pub candles: Vec<Candle>,
}

impl ChunkResult {
    /// Start an empty result for chunk `index`.
    #[must_use]
    pub fn new(index: usize, status: ChunkStatus) -> Self {
        Self {
            index,
            status,
            saved_count: 0,
            elapsed_ms: 0,
            phases_completed: Vec::new(),
            metadata: BTreeMap::new(),
            error: None,
            candles: Vec::new(),
        }
    }

    /// True for outcomes that count as success in the aggregate.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        !matches!(self.status, ChunkStatus::Error)
    }
}

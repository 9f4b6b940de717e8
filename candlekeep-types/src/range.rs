use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CollectorError, Timeframe};

/// Half-open time range `[start, end)` over candle open times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    /// Build a range, enforcing `start < end`.
    ///
    /// # Errors
    /// Returns `CollectorError::InvalidArg` when `start >= end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, CollectorError> {
        if start >= end {
            return Err(CollectorError::InvalidArg(format!(
                "time range start {start} must precede end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub(crate) const fn new_unchecked(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Inclusive lower bound.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive upper bound.
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// True if `t` lies in `[start, end)`.
    #[must_use]
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    /// True if `other` lies entirely within this range.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// True if the two ranges share at least one instant.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Existing local coverage for a `(symbol, timeframe)` series.
///
/// `[start, end)` spans from the oldest stored candle to one slot past the
/// newest. `gaps` lists missing candle slots strictly inside that span,
/// sorted oldest first and non-overlapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRange {
    /// Open time of the oldest stored candle.
    pub start: DateTime<Utc>,
    /// One slot past the newest stored candle.
    pub end: DateTime<Utc>,
    /// Internal holes in the stored series.
    pub gaps: Vec<TimeRange>,
}

impl DataRange {
    /// Contiguous coverage with no internal gaps.
    #[must_use]
    pub const fn contiguous(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            gaps: Vec::new(),
        }
    }

    /// Build coverage from the inclusive open times of the oldest and newest candles.
    #[must_use]
    pub fn from_candle_times(oldest: DateTime<Utc>, newest: DateTime<Utc>, tf: Timeframe) -> Self {
        Self::contiguous(oldest, tf.shift(newest, 1))
    }

    /// Attach internal gaps; they are sorted oldest first.
    #[must_use]
    pub fn with_gaps(mut self, mut gaps: Vec<TimeRange>) -> Self {
        gaps.sort_by_key(TimeRange::start);
        self.gaps = gaps;
        self
    }

    /// True when the stored series has no holes.
    #[must_use]
    pub fn is_contiguous(&self) -> bool {
        self.gaps.is_empty()
    }
}

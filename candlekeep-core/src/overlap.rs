use chrono::{DateTime, Utc};

use crate::{DataRange, OverlapResult, TimeRange};

/// Compare a requested range against the stored coverage of the same series.
///
/// The request's reference edge is its newest instant (`requested.end()`).
/// Stored data only counts as usable when it reaches that edge; from there it
/// is contiguous down to `connected_end`, which is the newest of:
/// - the request start (fully covered),
/// - the oldest stored candle (suffix covered),
/// - the end of the newest internal gap below the edge.
///
/// Any internal gap invalidates contiguity from that gap downward.
#[must_use]
pub fn analyze(requested: &TimeRange, existing: Option<&DataRange>) -> OverlapResult {
    let Some(existing) = existing else {
        return OverlapResult::none();
    };
    if existing.end < requested.start() {
        return OverlapResult::none();
    }

    let edge = requested.end();
    let edge_covered = existing.start < edge && existing.end >= edge;
    if !edge_covered {
        return OverlapResult::overlapping(None);
    }
    if existing.gaps.iter().any(|g| g.start() < edge && g.end() >= edge) {
        return OverlapResult::overlapping(None);
    }

    let newest_gap_end = existing
        .gaps
        .iter()
        .map(TimeRange::end)
        .filter(|&end| end <= edge)
        .max();

    let mut connected: DateTime<Utc> = requested.start().max(existing.start);
    if let Some(gap_end) = newest_gap_end {
        connected = connected.max(gap_end);
    }

    if connected >= edge {
        OverlapResult::overlapping(None)
    } else {
        OverlapResult::overlapping(Some(connected))
    }
}

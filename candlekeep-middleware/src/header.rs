use std::time::Duration;

/// Server-reported remaining quota.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaHeader {
    /// `limit:remaining[:reset_seconds]` for a single window.
    Window {
        /// Window size the server enforces.
        limit: u32,
        /// Requests left in the current window.
        remaining: u32,
        /// Seconds until the window resets, when reported.
        reset: Option<Duration>,
    },
    /// `group=<g>; min=<m>; sec=<s>` as sent in Upbit's `Remaining-Req`.
    Grouped {
        /// Limit group name (e.g. `candles`, `default`).
        group: String,
        /// Requests left in the current minute.
        per_minute: Option<u32>,
        /// Requests left in the current second.
        per_second: Option<u32>,
    },
}

/// Parse a remaining-quota header value. Returns `None` for anything unrecognized.
#[must_use]
pub fn parse_remaining(raw: &str) -> Option<QuotaHeader> {
    let raw = raw.trim();
    if raw.contains('=') {
        return parse_grouped(raw);
    }

    let mut parts = raw.split(':').map(str::trim);
    let limit = parts.next()?.parse().ok()?;
    let remaining = parts.next()?.parse().ok()?;
    let reset = match parts.next() {
        Some(s) => Some(Duration::from_secs(s.parse().ok()?)),
        None => None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(QuotaHeader::Window {
        limit,
        remaining,
        reset,
    })
}

fn parse_grouped(raw: &str) -> Option<QuotaHeader> {
    let mut group = None;
    let mut per_minute = None;
    let mut per_second = None;
    for pair in raw.split(';') {
        let Some((k, v)) = pair.split_once('=') else {
            continue;
        };
        match k.trim() {
            "group" => group = Some(v.trim().to_string()),
            "min" => per_minute = v.trim().parse().ok(),
            "sec" => per_second = v.trim().parse().ok(),
            _ => {}
        }
    }
    if per_minute.is_none() && per_second.is_none() {
        return None;
    }
    Some(QuotaHeader::Grouped {
        group: group.unwrap_or_default(),
        per_minute,
        per_second,
    })
}

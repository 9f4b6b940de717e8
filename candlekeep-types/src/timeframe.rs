//! Candle timeframe value type with calendar-aware boundary arithmetic.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Datelike, Months, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::CollectorError;

const SECS_PER_DAY: i64 = 86_400;
// 1970-01-01 was a Thursday; weeks start on Monday.
const WEEK_EPOCH_OFFSET: i64 = 4 * SECS_PER_DAY;

/// Supported candle units.
///
/// Sub-minute: `1s`. Minutes: `1m,3m,5m,10m,15m,30m,60m,240m`.
/// Day and longer only exist with unit 1: `1d,1w,1M,1y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Timeframe {
    /// One second.
    #[serde(rename = "1s")]
    S1,
    /// One minute.
    #[serde(rename = "1m")]
    M1,
    /// Three minutes.
    #[serde(rename = "3m")]
    M3,
    /// Five minutes.
    #[serde(rename = "5m")]
    M5,
    /// Ten minutes.
    #[serde(rename = "10m")]
    M10,
    /// Fifteen minutes.
    #[serde(rename = "15m")]
    M15,
    /// Thirty minutes.
    #[serde(rename = "30m")]
    M30,
    /// Sixty minutes.
    #[serde(rename = "60m")]
    M60,
    /// Four hours.
    #[serde(rename = "240m")]
    M240,
    /// One day (UTC midnight boundaries).
    #[serde(rename = "1d")]
    D1,
    /// One week (Monday boundaries).
    #[serde(rename = "1w")]
    W1,
    /// One calendar month.
    #[serde(rename = "1M")]
    Mo1,
    /// One calendar year.
    #[serde(rename = "1y")]
    Y1,
}

impl Timeframe {
    /// Every supported timeframe, finest first.
    pub const ALL: [Self; 13] = [
        Self::S1,
        Self::M1,
        Self::M3,
        Self::M5,
        Self::M10,
        Self::M15,
        Self::M30,
        Self::M60,
        Self::M240,
        Self::D1,
        Self::W1,
        Self::Mo1,
        Self::Y1,
    ];

    /// Canonical string form (`"15m"`, `"1M"`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::S1 => "1s",
            Self::M1 => "1m",
            Self::M3 => "3m",
            Self::M5 => "5m",
            Self::M10 => "10m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::M60 => "60m",
            Self::M240 => "240m",
            Self::D1 => "1d",
            Self::W1 => "1w",
            Self::Mo1 => "1M",
            Self::Y1 => "1y",
        }
    }

    /// Minute unit for minute candles, `None` otherwise.
    #[must_use]
    pub const fn minutes(self) -> Option<u32> {
        match self {
            Self::M1 => Some(1),
            Self::M3 => Some(3),
            Self::M5 => Some(5),
            Self::M10 => Some(10),
            Self::M15 => Some(15),
            Self::M30 => Some(30),
            Self::M60 => Some(60),
            Self::M240 => Some(240),
            _ => None,
        }
    }

    /// Length in seconds. Months and years report 30 and 365 days.
    #[must_use]
    pub const fn seconds(self) -> i64 {
        match self {
            Self::S1 => 1,
            Self::M1 => 60,
            Self::M3 => 180,
            Self::M5 => 300,
            Self::M10 => 600,
            Self::M15 => 900,
            Self::M30 => 1_800,
            Self::M60 => 3_600,
            Self::M240 => 14_400,
            Self::D1 => SECS_PER_DAY,
            Self::W1 => 7 * SECS_PER_DAY,
            Self::Mo1 => 30 * SECS_PER_DAY,
            Self::Y1 => 365 * SECS_PER_DAY,
        }
    }

    /// True for sub-hour candles (which carry a `unit` field).
    #[must_use]
    pub const fn is_sub_hour(self) -> bool {
        matches!(
            self,
            Self::S1 | Self::M1 | Self::M3 | Self::M5 | Self::M10 | Self::M15 | Self::M30
        )
    }

    /// True when the candle length varies with the calendar.
    #[must_use]
    pub const fn is_calendar(self) -> bool {
        matches!(self, Self::Mo1 | Self::Y1)
    }

    /// Floor `t` to the candle boundary at or before it.
    #[must_use]
    pub fn align(self, t: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Mo1 => month_start(t.year(), t.month()),
            Self::Y1 => month_start(t.year(), 1),
            Self::W1 => {
                let secs = t.timestamp();
                let step = self.seconds();
                let floored = secs - (secs - WEEK_EPOCH_OFFSET).rem_euclid(step);
                from_secs(floored)
            }
            _ => {
                let secs = t.timestamp();
                from_secs(secs - secs.rem_euclid(self.seconds()))
            }
        }
    }

    /// Move `t` by `n` candles (negative moves back). `t` is expected to be aligned.
    #[must_use]
    pub fn shift(self, t: DateTime<Utc>, n: i64) -> DateTime<Utc> {
        match self {
            Self::Mo1 | Self::Y1 => {
                let per = if matches!(self, Self::Y1) { 12 } else { 1 };
                let months = u32::try_from(n.unsigned_abs().saturating_mul(per)).unwrap_or(u32::MAX);
                let moved = if n >= 0 {
                    t.checked_add_months(Months::new(months))
                } else {
                    t.checked_sub_months(Months::new(months))
                };
                moved.unwrap_or(if n >= 0 {
                    DateTime::<Utc>::MAX_UTC
                } else {
                    DateTime::<Utc>::MIN_UTC
                })
            }
            _ => {
                let delta = TimeDelta::try_seconds(self.seconds().saturating_mul(n))
                    .unwrap_or(if n >= 0 { TimeDelta::MAX } else { TimeDelta::MIN });
                t.checked_add_signed(delta).unwrap_or(if n >= 0 {
                    DateTime::<Utc>::MAX_UTC
                } else {
                    DateTime::<Utc>::MIN_UTC
                })
            }
        }
    }

    /// Parse a timeframe string.
    ///
    /// Accepts the canonical forms plus bare minute numbers (`"15"`).
    ///
    /// # Errors
    /// Returns `CollectorError::InvalidTimeframe` for anything else.
    pub fn parse(s: &str) -> Result<Self, CollectorError> {
        let tf = match s.trim() {
            "1s" => Self::S1,
            "1m" | "1" => Self::M1,
            "3m" | "3" => Self::M3,
            "5m" | "5" => Self::M5,
            "10m" | "10" => Self::M10,
            "15m" | "15" => Self::M15,
            "30m" | "30" => Self::M30,
            "60m" | "60" => Self::M60,
            "240m" | "240" => Self::M240,
            "1d" => Self::D1,
            "1w" => Self::W1,
            "1M" => Self::Mo1,
            "1y" => Self::Y1,
            other => return Err(CollectorError::InvalidTimeframe(other.to_string())),
        };
        Ok(tf)
    }
}

fn from_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn month_start(year: i32, month: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map_or(DateTime::<Utc>::MIN_UTC, |naive| naive.and_utc())
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CollectorError, Timeframe};

/// Canonical OHLCV candle.
///
/// Invariants checked by [`Candle::validate`]:
/// `high >= max(open, close, low)`, `low <= min(open, close, high)`, `volume >= 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Market code, e.g. `KRW-BTC`.
    pub symbol: String,
    /// Candle unit.
    pub timeframe: Timeframe,
    /// Opening price.
    pub open: Decimal,
    /// Highest traded price.
    pub high: Decimal,
    /// Lowest traded price.
    pub low: Decimal,
    /// Closing price.
    pub close: Decimal,
    /// Accumulated traded volume.
    pub volume: Decimal,
    /// Candle open time in UTC.
    pub utc_time: DateTime<Utc>,
    /// Candle open time in the venue's local time zone.
    pub local_time: NaiveDateTime,
    /// Minute unit, set for sub-hour candles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<u32>,
    /// Previous day's close, set for daily candles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_close: Option<Decimal>,
    /// Change rate against the previous close, set for daily candles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_rate: Option<Decimal>,
    /// First day of the period, set for weekly and longer candles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_start: Option<NaiveDate>,
    /// True for flat placeholders synthesized over zero-activity gaps.
    #[serde(default)]
    pub synthetic: bool,
}

impl Candle {
    /// Check the OHLCV invariants.
    ///
    /// # Errors
    /// Returns `CollectorError::Validation` naming the first violated invariant.
    pub fn validate(&self) -> Result<(), CollectorError> {
        let at = || self.utc_time.to_rfc3339();
        if self.high < self.open.max(self.close).max(self.low) {
            return Err(CollectorError::validation(at(), "high below open/close/low"));
        }
        if self.low > self.open.min(self.close).min(self.high) {
            return Err(CollectorError::validation(at(), "low above open/close/high"));
        }
        if self.volume < Decimal::ZERO {
            return Err(CollectorError::validation(at(), "negative volume"));
        }
        Ok(())
    }

    /// Build a flat zero-volume placeholder at `utc_time`, priced at `price`.
    ///
    /// Timeframe-specific fields are copied from `template` where they still
    /// make sense; daily change fields are reset to a zero move.
    #[must_use]
    pub fn flat_fill(
        template: &Self,
        utc_time: DateTime<Utc>,
        local_time: NaiveDateTime,
        price: Decimal,
    ) -> Self {
        Self {
            symbol: template.symbol.clone(),
            timeframe: template.timeframe,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: Decimal::ZERO,
            utc_time,
            local_time,
            unit: template.unit,
            prev_close: template.prev_close.map(|_| price),
            change_rate: template.change_rate.map(|_| Decimal::ZERO),
            period_start: template.period_start.map(|_| utc_time.date_naive()),
            synthetic: true,
        }
    }
}

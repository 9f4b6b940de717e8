//! Canonical push-feed models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Candle;

/// Whether a pushed message is the initial snapshot or a live update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamType {
    /// First message after (re)subscribing to a `(kind, symbol)` pair.
    Snapshot,
    /// Subsequent live update.
    Realtime,
}

/// Kind of subscription on the push feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Current price summary.
    Ticker,
    /// Individual trades.
    Trade,
    /// Order book depth.
    Orderbook,
    /// Live candle updates.
    Candle,
}

impl StreamKind {
    /// Staleness-tolerant kinds may drop the oldest queued message under backpressure.
    #[must_use]
    pub const fn tolerates_drops(self) -> bool {
        matches!(self, Self::Ticker | Self::Orderbook)
    }
}

/// Price summary for one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    /// Market code.
    pub symbol: String,
    /// Last trade price.
    pub trade_price: Decimal,
    /// Signed change rate against the previous close.
    pub change_rate: Decimal,
    /// Volume accumulated over the trailing 24 hours.
    pub acc_volume_24h: Decimal,
    /// Exchange timestamp.
    pub ts: DateTime<Utc>,
    /// Snapshot or live update.
    pub stream_type: StreamType,
}

/// Aggressor side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    /// Buyer-initiated.
    Bid,
    /// Seller-initiated.
    Ask,
}

/// One executed trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Market code.
    pub symbol: String,
    /// Execution price.
    pub price: Decimal,
    /// Executed quantity.
    pub volume: Decimal,
    /// Aggressor side.
    pub side: TradeSide,
    /// Exchange sequence id.
    pub sequential_id: u64,
    /// Exchange timestamp.
    pub ts: DateTime<Utc>,
    /// Snapshot or live update.
    pub stream_type: StreamType,
}

/// One price level pair of an order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderbookUnit {
    /// Ask price.
    pub ask_price: Decimal,
    /// Bid price.
    pub bid_price: Decimal,
    /// Ask quantity.
    pub ask_size: Decimal,
    /// Bid quantity.
    pub bid_size: Decimal,
}

/// Order book depth snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orderbook {
    /// Market code.
    pub symbol: String,
    /// Price levels, best first.
    pub units: Vec<OrderbookUnit>,
    /// Exchange timestamp.
    pub ts: DateTime<Utc>,
    /// Snapshot or live update.
    pub stream_type: StreamType,
}

/// Canonical message dispatched to push-feed listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketEvent {
    /// Ticker update.
    Ticker(Ticker),
    /// Trade print.
    Trade(Trade),
    /// Order book update.
    Orderbook(Orderbook),
    /// Live candle update.
    Candle(Candle),
}

impl MarketEvent {
    /// Subscription kind this event belongs to.
    #[must_use]
    pub const fn kind(&self) -> StreamKind {
        match self {
            Self::Ticker(_) => StreamKind::Ticker,
            Self::Trade(_) => StreamKind::Trade,
            Self::Orderbook(_) => StreamKind::Orderbook,
            Self::Candle(_) => StreamKind::Candle,
        }
    }

    /// Market code of the event.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::Ticker(t) => &t.symbol,
            Self::Trade(t) => &t.symbol,
            Self::Orderbook(o) => &o.symbol,
            Self::Candle(c) => &c.symbol,
        }
    }
}

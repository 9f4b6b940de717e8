use std::hash::Hash;
use std::time::Duration;

use candlekeep_core::{TimeRange, Timeframe};
use moka::future::Cache;

/// Identity of a collect request for aggregate caching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateKey {
    /// Market code.
    pub symbol: String,
    /// Candle unit.
    pub timeframe: Timeframe,
    /// Aligned request range.
    pub range: TimeRange,
}

impl AggregateKey {
    /// Build a key for `(symbol, timeframe, range)`.
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, range: TimeRange) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            range,
        }
    }
}

/// Bounded TTL cache for finished aggregates.
///
/// A disabled cache (no TTL) answers every lookup with a miss.
#[derive(Clone)]
pub struct AggregateCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Option<Cache<K, V>>,
}

impl<K, V> AggregateCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache holding at most `capacity` entries for `ttl` each.
    ///
    /// `ttl = None` or `capacity = 0` disables caching.
    #[must_use]
    pub fn new(capacity: u64, ttl: Option<Duration>) -> Self {
        let inner = match ttl {
            Some(ttl) if capacity > 0 && !ttl.is_zero() => Some(
                Cache::builder()
                    .max_capacity(capacity)
                    .time_to_live(ttl)
                    .build(),
            ),
            _ => None,
        };
        Self { inner }
    }

    /// A cache that never stores anything.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { inner: None }
    }

    /// True when entries are retained.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Look up `key`.
    pub async fn get(&self, key: &K) -> Option<V> {
        match &self.inner {
            Some(cache) => cache.get(key).await,
            None => None,
        }
    }

    /// Store `value` under `key`.
    pub async fn put(&self, key: K, value: V) {
        if let Some(cache) = &self.inner {
            cache.insert(key, value).await;
        }
    }

    /// Drop every entry.
    pub fn invalidate_all(&self) {
        if let Some(cache) = &self.inner {
            cache.invalidate_all();
        }
    }
}

//! candlekeep-middleware
//!
//! Admission control and caching shared by every network call of the
//! collection pipeline.
//!
//! - [`RateLimiter`]: dual-window (per-second and per-minute) GCRA limiter,
//!   keyed by limit group and resynchronized from server quota headers.
//! - [`AggregateCache`]: TTL cache for finished collect responses.

mod cache;
mod gcra;
mod header;

pub use crate::cache::{AggregateCache, AggregateKey};
pub use crate::gcra::{Decision, RateLimiter};
pub use crate::header::{QuotaHeader, parse_remaining};

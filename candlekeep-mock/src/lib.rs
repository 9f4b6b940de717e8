//! Deterministic collaborators for exercising the candlekeep pipeline without
//! a network or a database.
//!
//! - [`MockExchange`]: a `RestSource` serving generated candle series with a
//!   configurable first available candle, trade-less holes and scripted failures.
//! - [`MockStream`]: a `StreamSource` driven from a [`MockStreamController`].
//! - [`MemoryStorage`]: a `CandleStorage` over ordered in-memory maps.

mod exchange;
pub mod fixtures;
mod storage;
mod stream;

pub use exchange::{MockBehavior, MockExchange};
pub use storage::MemoryStorage;
pub use stream::{MockStream, MockStreamController};

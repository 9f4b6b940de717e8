//! candlekeep-core
//!
//! Pure building blocks and collaborator traits for the candlekeep collection
//! pipeline.
//!
//! - `timeframe`: boundary alignment, candle counts and stepping.
//! - `overlap`: compares a requested range against stored coverage.
//! - `planner`: turns overlap analysis into per-chunk fetch strategies.
//! - `connector`: the `RestSource` and `StreamSource` traits implemented by
//!   venue connectors.
//! - `storage`: the `CandleStorage` trait implemented by persistence layers.
//!
//! Async runtime (Tokio)
//! ---------------------
//! `stream::StreamHandle` wraps `tokio::task::JoinHandle<()>` and uses
//! `tokio::sync::oneshot::Sender<()>` for cooperative shutdown, and
//! `connector::StreamSession` exposes Tokio mpsc channels. Code that uses
//! streaming must run under a Tokio 1.x runtime.
#![warn(missing_docs)]

/// Venue connector traits for REST and push-feed access.
pub mod connector;
/// Overlap analysis between a requested range and stored coverage.
pub mod overlap;
/// Per-chunk execution planning and chunk generation.
pub mod planner;
/// Storage collaborator trait.
pub mod storage;
/// Internal stream utilities used by `StreamHandle` and tests.
pub mod stream;
/// Timeframe arithmetic over candle boundaries.
pub mod timeframe;

pub use candlekeep_types::*;
pub use connector::{CandleQuery, RestReply, RestSource, StreamSession, StreamSource, Subscription};
pub use overlap::analyze;
pub use planner::{chunk_specs, plan};
pub use storage::CandleStorage;
pub use stream::StreamHandle;
pub use timeframe::{
    align_to_boundary, candle_count, parse_seconds, step_back, step_forward, time_sequence,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the candlekeep workspace.
///
/// Variants follow the collection pipeline's failure taxonomy: caller mistakes
/// (`InvalidTimeframe`, `InvalidArg`), recoverable admission failures
/// (`RateLimitExceeded`), transport faults (`Channel`), per-candle data
/// problems (`Validation`, `Data`), and storage failures (`Storage`).
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CollectorError {
    /// The timeframe string is not one of the supported candle units.
    #[error("invalid timeframe: {0}")]
    InvalidTimeframe(String),

    /// Invalid input argument.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// The limiter refused admission and the wait exceeds what the caller allows.
    #[error("rate limit exceeded: key={key} retry_after_ms={retry_after_ms}")]
    RateLimitExceeded {
        /// Limit key whose windows are exhausted (e.g. "rest-quotation").
        key: String,
        /// Milliseconds until the request would conform.
        retry_after_ms: u64,
    },

    /// A network channel (REST or WebSocket) failed after retries.
    #[error("{channel} channel failed: {msg}")]
    Channel {
        /// Channel label, "rest" or "websocket".
        channel: String,
        /// HTTP status code when the failure came from a response.
        status: Option<u16>,
        /// Human-readable error message.
        msg: String,
    },

    /// A candle violated the OHLC invariants and was dropped.
    #[error("invalid candle at {at}: {reason}")]
    Validation {
        /// Candle open time (RFC 3339).
        at: String,
        /// Which invariant failed.
        reason: String,
    },

    /// The vendor payload could not be decoded into the canonical model.
    #[error("data issue: {0}")]
    Data(String),

    /// The storage collaborator failed.
    #[error("storage failed: {0}")]
    Storage(String),

    /// The operation was cancelled through its cancellation token.
    #[error("cancelled")]
    Cancelled,

    /// An operation exceeded its configured deadline.
    #[error("timed out: {0}")]
    Timeout(String),
}

impl CollectorError {
    /// Helper: build a `Channel` error without a status code.
    pub fn channel(channel: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Channel {
            channel: channel.into(),
            status: None,
            msg: msg.into(),
        }
    }

    /// Helper: build a `Channel` error carrying the HTTP status that caused it.
    pub fn channel_status(channel: impl Into<String>, status: u16, msg: impl Into<String>) -> Self {
        Self::Channel {
            channel: channel.into(),
            status: Some(status),
            msg: msg.into(),
        }
    }

    /// Helper: build a `Storage` error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Helper: build a `Validation` error for a candle open time.
    pub fn validation(at: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            at: at.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if retrying the same request may succeed.
    ///
    /// Rate-limit denials always qualify. Channel failures qualify when they
    /// carry no status (connect/read errors), a 429, or a 5xx status.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimitExceeded { .. } | Self::Timeout(_) => true,
            Self::Channel { status, .. } => match status {
                None => true,
                Some(code) => *code == 429 || (500..600).contains(code),
            },
            _ => false,
        }
    }

    /// Returns true if this error should fail the whole request rather than a single chunk.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidTimeframe(_) | Self::InvalidArg(_) | Self::Cancelled
        )
    }
}

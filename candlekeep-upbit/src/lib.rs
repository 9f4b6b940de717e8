//! candlekeep-upbit
//!
//! Upbit quotation API connector.
//!
//! - REST: `GET /v1/candles/{unit}?market&to&count` and `GET /v1/ticker`
//!   through `reqwest`, surfacing the `Remaining-Req` header on every reply.
//! - WebSocket: one `tokio-tungstenite` connection per session, with
//!   subscription frames in Upbit's `[{ticket}, {type, codes}, {format}]` form.
//!
//! Public quotation endpoints need no credentials.
#![warn(missing_docs)]

mod builder;
/// Vendor JSON to canonical model conversion.
pub mod convert;
mod rest;
mod ws;

use std::time::Duration;

use url::Url;

pub use builder::UpbitConnectorBuilder;

/// Default REST base URL.
pub const DEFAULT_REST_BASE: &str = "https://api.upbit.com/";
/// Default WebSocket endpoint.
pub const DEFAULT_WS_URL: &str = "wss://api.upbit.com/websocket/v1";

/// Upbit connector implementing both `RestSource` and `StreamSource`.
#[derive(Debug, Clone)]
pub struct UpbitConnector {
    http: reqwest::Client,
    rest_base: Url,
    ws_url: Url,
    connect_timeout: Duration,
    ping_interval: Duration,
}

impl UpbitConnector {
    /// Returns a builder preconfigured for the public Upbit endpoints.
    #[must_use]
    pub fn builder() -> UpbitConnectorBuilder {
        UpbitConnectorBuilder::default()
    }

    /// REST base URL in use.
    #[must_use]
    pub const fn rest_base(&self) -> &Url {
        &self.rest_base
    }

    /// WebSocket endpoint in use.
    #[must_use]
    pub const fn ws_url(&self) -> &Url {
        &self.ws_url
    }
}

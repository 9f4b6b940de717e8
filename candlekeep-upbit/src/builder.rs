use std::time::Duration;

use candlekeep_core::CollectorError;
use url::Url;

use crate::{DEFAULT_REST_BASE, DEFAULT_WS_URL, UpbitConnector};

/// Builder for [`UpbitConnector`].
#[derive(Debug, Clone)]
pub struct UpbitConnectorBuilder {
    rest_base: String,
    ws_url: String,
    user_agent: Option<String>,
    connect_timeout: Duration,
    ping_interval: Duration,
}

impl Default for UpbitConnectorBuilder {
    fn default() -> Self {
        Self {
            rest_base: DEFAULT_REST_BASE.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            user_agent: None,
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(60),
        }
    }
}

impl UpbitConnectorBuilder {
    /// Override the REST base URL (useful for tests against a local server).
    #[must_use]
    pub fn rest_base(mut self, url: impl Into<String>) -> Self {
        self.rest_base = url.into();
        self
    }

    /// Override the WebSocket endpoint.
    #[must_use]
    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    /// Set the `User-Agent` sent with REST calls.
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Timeout for establishing a WebSocket connection.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Interval between keep-alive pings on an idle socket.
    #[must_use]
    pub const fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Build the connector.
    ///
    /// # Errors
    /// Returns `CollectorError::InvalidArg` for malformed URLs and
    /// `CollectorError::Channel` if the HTTP client cannot be created.
    pub fn build(self) -> Result<UpbitConnector, CollectorError> {
        let mut base = self.rest_base;
        if !base.ends_with('/') {
            base.push('/');
        }
        let rest_base = Url::parse(&base)
            .map_err(|e| CollectorError::InvalidArg(format!("bad REST base {base:?}: {e}")))?;
        let ws_url = Url::parse(&self.ws_url).map_err(|e| {
            CollectorError::InvalidArg(format!("bad WebSocket url {:?}: {e}", self.ws_url))
        })?;

        let mut http = reqwest::Client::builder();
        if let Some(ua) = self.user_agent {
            http = http.user_agent(ua);
        }
        let http = http
            .build()
            .map_err(|e| CollectorError::channel("rest", format!("http client: {e}")))?;

        Ok(UpbitConnector {
            http,
            rest_base,
            ws_url,
            connect_timeout: self.connect_timeout,
            ping_interval: self.ping_interval.max(Duration::from_secs(1)),
        })
    }
}

use std::time::Duration;

use async_trait::async_trait;
use candlekeep_core::{
    Candle, CandleQuery, CollectorError, MAX_CHUNK_CANDLES, RestReply, RestSource, Ticker,
};
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;

use crate::UpbitConnector;
use crate::convert::{self, UpbitCandle, UpbitTicker};

fn transport(e: &reqwest::Error) -> CollectorError {
    if e.is_timeout() {
        CollectorError::Timeout(format!("rest: {e}"))
    } else {
        CollectorError::channel("rest", e.to_string())
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

impl UpbitConnector {
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<RestReply<T>, CollectorError> {
        let url = self
            .rest_base
            .join(path)
            .map_err(|e| CollectorError::InvalidArg(format!("bad path {path:?}: {e}")))?;
        let resp = self
            .http
            .get(url)
            .header("accept", "application/json")
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport(&e))?;

        let status = resp.status();
        let remaining_req = header_str(resp.headers(), "remaining-req");
        let retry_after = header_str(resp.headers(), "retry-after")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            #[cfg(feature = "tracing")]
            tracing::debug!(status = status.as_u16(), path, body = %body, "upbit non-success reply");
            return Ok(RestReply {
                status: status.as_u16(),
                remaining_req,
                retry_after,
                data: None,
                message: Some(body),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| transport(&e))?;
        let data: T = serde_json::from_slice(&bytes)
            .map_err(|e| CollectorError::Data(format!("decode {path}: {e}")))?;
        Ok(RestReply {
            status: status.as_u16(),
            remaining_req,
            retry_after,
            data: Some(data),
            message: None,
        })
    }
}

fn map_data<A, B>(
    reply: RestReply<A>,
    f: impl FnOnce(A) -> Result<B, CollectorError>,
) -> Result<RestReply<B>, CollectorError> {
    let data = reply.data.map(f).transpose()?;
    Ok(RestReply {
        status: reply.status,
        remaining_req: reply.remaining_req,
        retry_after: reply.retry_after,
        data,
        message: reply.message,
    })
}

#[async_trait]
impl RestSource for UpbitConnector {
    fn name(&self) -> &'static str {
        "upbit"
    }

    async fn candles(
        &self,
        query: &CandleQuery,
        timeout: Duration,
    ) -> Result<RestReply<Vec<Candle>>, CollectorError> {
        if query.count == 0 || query.count > MAX_CHUNK_CANDLES {
            return Err(CollectorError::InvalidArg(format!(
                "count must be within 1..={MAX_CHUNK_CANDLES}, got {}",
                query.count
            )));
        }
        let path = convert::candle_path(query.timeframe);
        let params = [
            ("market", query.symbol.clone()),
            ("to", convert::to_param(query.to)),
            ("count", query.count.to_string()),
        ];
        let reply: RestReply<Vec<UpbitCandle>> = self.get_json(&path, &params, timeout).await?;
        let tf = query.timeframe;
        map_data(reply, |raw| convert::candles(&raw, tf))
    }

    async fn tickers(
        &self,
        symbols: &[String],
        timeout: Duration,
    ) -> Result<RestReply<Vec<Ticker>>, CollectorError> {
        if symbols.is_empty() {
            return Ok(RestReply::ok(Vec::new()));
        }
        let params = [("markets", symbols.join(","))];
        let reply: RestReply<Vec<UpbitTicker>> =
            self.get_json("v1/ticker", &params, timeout).await?;
        map_data(reply, |raw| raw.iter().map(convert::ticker).collect())
    }
}

//! REST execution with admission, quota feedback and retries.

use std::future::Future;
use std::time::Duration;

use candlekeep_core::{CollectorError, RestReply};
use tokio_util::sync::CancellationToken;

use super::ChannelRouter;
use super::backoff::retry_delay;

const CHANNEL: &str = "rest";

/// What to do after one attempt.
enum Outcome<T> {
    Done(T),
    Fatal(CollectorError),
    /// Retryable failure; `wait` overrides the backoff delay.
    Retry {
        err: CollectorError,
        wait: Option<Duration>,
    },
}

impl ChannelRouter {
    /// Run `call` until it succeeds, fails fatally or exhausts `max_retries`.
    ///
    /// Every attempt waits for the limiter first. Quota headers from every
    /// reply, successful or not, resynchronize the limiter.
    pub(super) async fn call_rest<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T, CollectorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<RestReply<T>, CollectorError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            self.limiter.acquire(&self.limit_key, 1, cancel).await?;
            self.metrics.rest_call();

            let timeout = self.retry.request_timeout;
            let res = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(CollectorError::Cancelled),
                res = tokio::time::timeout(timeout, call()) => res,
            };
            let reply = match res {
                Ok(reply) => reply,
                Err(_) => Err(CollectorError::Timeout(format!(
                    "{} request exceeded {} ms",
                    self.rest.name(),
                    timeout.as_millis()
                ))),
            };

            let (err, wait) = match self.classify(reply, attempt) {
                Outcome::Done(data) => return Ok(data),
                Outcome::Fatal(err) => {
                    self.metrics.rest_failure();
                    return Err(err);
                }
                Outcome::Retry { err, wait } => (err, wait),
            };

            if attempt >= self.retry.max_retries {
                self.metrics.rest_failure();
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    source = self.rest.name(),
                    attempts = attempt + 1,
                    error = %err,
                    "REST retries exhausted"
                );
                return Err(exhausted(&err, attempt + 1));
            }

            let delay = wait.unwrap_or_else(|| retry_delay(&self.backoff, attempt));
            #[cfg(feature = "tracing")]
            tracing::debug!(
                source = self.rest.name(),
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "retrying REST call"
            );
            attempt += 1;
            self.metrics.rest_retry();

            // 429 waits are enforced by the limiter penalty at the next acquire.
            if wait.is_none() {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(CollectorError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    fn classify<T>(
        &self,
        reply: Result<RestReply<T>, CollectorError>,
        attempt: u32,
    ) -> Outcome<T> {
        let reply = match reply {
            Ok(reply) => reply,
            Err(err) if err.is_retryable() => return Outcome::Retry { err, wait: None },
            Err(err) => return Outcome::Fatal(err),
        };

        if let Some(header) = reply.remaining_req.as_deref() {
            self.limiter.update_from_response(&self.limit_key, header);
        }

        let status = reply.status;
        if reply.is_success() {
            return match reply.data {
                Some(data) => Outcome::Done(data),
                None => Outcome::Fatal(CollectorError::Data(format!(
                    "{} returned status {status} without a body",
                    self.rest.name()
                ))),
            };
        }

        let msg = reply
            .message
            .unwrap_or_else(|| format!("HTTP status {status}"));
        let err = CollectorError::channel_status(CHANNEL, status, msg);
        match status {
            429 => {
                let after = reply
                    .retry_after
                    .unwrap_or_else(|| retry_delay(&self.backoff, attempt));
                self.limiter.penalize(&self.limit_key, after);
                Outcome::Retry {
                    err,
                    wait: Some(after),
                }
            }
            500..=599 => {
                if let Some(after) = reply.retry_after {
                    self.limiter.penalize(&self.limit_key, after);
                }
                Outcome::Retry {
                    err,
                    wait: reply.retry_after,
                }
            }
            _ => Outcome::Fatal(err),
        }
    }
}

fn exhausted(last: &CollectorError, attempts: u32) -> CollectorError {
    let status = match last {
        CollectorError::Channel { status, .. } => *status,
        _ => None,
    };
    let msg = format!("retries exhausted after {attempts} attempts: {last}");
    match status {
        Some(code) => CollectorError::channel_status(CHANNEL, code, msg),
        None => CollectorError::channel(CHANNEL, msg),
    }
}

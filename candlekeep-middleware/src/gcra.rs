//! Dual-window GCRA admission control.
//!
//! Each limit key carries two windows (per-second and per-minute). A window
//! tracks a theoretical arrival time (TAT); a request of cost `c` moves it to
//! `max(tat, now) + c * increment` and conforms while that stays within
//! `now + burst * increment`. A request must conform to both windows, and a
//! denied request leaves both untouched.
//!
//! Once the per-minute burst is spent its TAT runs ahead of the per-second
//! one and becomes the binding constraint, so no separate fixed-window
//! counter is kept.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use candlekeep_core::{CollectorError, RateLimitConfig};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::header::{QuotaHeader, parse_remaining};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request conforms and was counted.
    Allowed,
    /// The request does not conform yet; nothing was counted.
    Denied {
        /// Time until the request would conform.
        retry_after: Duration,
    },
}

impl Decision {
    /// True for `Allowed`.
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    increment: Duration,
    allowance: Duration,
    tat: Option<Instant>,
}

impl Window {
    fn new(per: Duration, rate: u32, burst: u32) -> Self {
        let increment = per / rate.max(1);
        Self {
            increment,
            allowance: increment * burst.max(1),
            tat: None,
        }
    }

    /// Candidate TAT for `cost`, or the wait until it would conform.
    fn check(&self, now: Instant, cost: u32) -> Result<Instant, Duration> {
        let inc = self.increment * cost;
        let allowance = self.allowance.max(inc);
        let base = self.tat.map_or(now, |tat| tat.max(now));
        let candidate = base + inc;
        let limit = now + allowance;
        if candidate <= limit {
            Ok(candidate)
        } else {
            Err(candidate - limit)
        }
    }

    /// Raise the TAT to at least `floor`. Never lowers it.
    fn tighten(&mut self, floor: Instant) {
        self.tat = Some(self.tat.map_or(floor, |tat| tat.max(floor)));
    }

    /// Model `used` requests already spent in the current window.
    fn sync_used(&mut self, now: Instant, used: u32) {
        self.tighten(now + self.increment * used);
    }

    /// Model an exhausted window that reopens after `reset`.
    fn sync_exhausted(&mut self, now: Instant, reset: Option<Duration>) {
        let reopen = reset.unwrap_or_default();
        self.tighten(now + reopen + self.allowance.saturating_sub(self.increment));
        if reset.is_none() {
            self.tighten(now + self.allowance);
        }
    }

    fn headroom(&self, now: Instant) -> f64 {
        let used = self
            .tat
            .map_or(Duration::ZERO, |tat| tat.saturating_duration_since(now));
        if self.allowance.is_zero() {
            return 1.0;
        }
        (1.0 - used.as_secs_f64() / self.allowance.as_secs_f64()).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct KeyState {
    config: RateLimitConfig,
    rps: Window,
    rpm: Window,
}

impl KeyState {
    fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            rps: Window::new(Duration::from_secs(1), config.rps, config.rps_burst),
            rpm: Window::new(Duration::from_secs(60), config.rpm, config.rpm_burst),
        }
    }
}

/// Process-wide admission controller shared by every network call.
///
/// State per key is created lazily from the default configuration and lives
/// until [`RateLimiter::reset`] or [`RateLimiter::reset_all`].
#[derive(Debug)]
pub struct RateLimiter {
    default: RateLimitConfig,
    max_wait: Duration,
    configured: Mutex<HashMap<String, RateLimitConfig>>,
    state: Mutex<HashMap<String, KeyState>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default(), Duration::from_secs(60))
    }
}

impl RateLimiter {
    /// Create a limiter whose unconfigured keys use `default`.
    ///
    /// `max_wait` bounds any single wait inside [`RateLimiter::acquire`].
    #[must_use]
    pub fn new(default: RateLimitConfig, max_wait: Duration) -> Self {
        Self {
            default,
            max_wait,
            configured: Mutex::new(HashMap::new()),
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Set window parameters for `key`.
    ///
    /// Any accumulated TAT is kept so reconfiguring cannot be used to
    /// bypass an exhausted window.
    pub fn configure(&self, key: &str, config: RateLimitConfig) {
        self.configured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), config);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = state.get_mut(key) {
            let mut next = KeyState::new(config);
            next.rps.tat = existing.rps.tat;
            next.rpm.tat = existing.rpm.tat;
            *existing = next;
        }
    }

    /// Parameters in effect for `key`.
    #[must_use]
    pub fn config_for(&self, key: &str) -> RateLimitConfig {
        self.configured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(self.default)
    }

    /// Longest single wait `acquire` accepts.
    #[must_use]
    pub const fn max_wait(&self) -> Duration {
        self.max_wait
    }

    fn with_state<R>(&self, key: &str, f: impl FnOnce(&mut KeyState) -> R) -> R {
        let config = self.config_for(key);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = state
            .entry(key.to_string())
            .or_insert_with(|| KeyState::new(config));
        f(entry)
    }

    /// Check and count a request of `cost` units against both windows of `key`.
    pub fn admit(&self, key: &str, cost: u32) -> Decision {
        self.admit_at(key, cost, Instant::now())
    }

    /// [`RateLimiter::admit`] evaluated at an explicit instant.
    pub fn admit_at(&self, key: &str, cost: u32, now: Instant) -> Decision {
        let cost = cost.max(1);
        let decision = self.with_state(key, |st| {
            match (st.rps.check(now, cost), st.rpm.check(now, cost)) {
                (Ok(rps_tat), Ok(rpm_tat)) => {
                    st.rps.tat = Some(rps_tat);
                    st.rpm.tat = Some(rpm_tat);
                    Decision::Allowed
                }
                (rps, rpm) => {
                    let rps_wait = rps.err().unwrap_or_default();
                    let rpm_wait = rpm.err().unwrap_or_default();
                    Decision::Denied {
                        retry_after: rps_wait.max(rpm_wait),
                    }
                }
            }
        });
        #[cfg(feature = "tracing")]
        if let Decision::Denied { retry_after } = decision {
            tracing::trace!(
                key,
                cost,
                retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                "rate limiter denied request"
            );
        }
        decision
    }

    /// Wait until `key` admits a request of `cost` units.
    ///
    /// # Errors
    /// Returns `CollectorError::Cancelled` when `cancel` fires while waiting
    /// and `CollectorError::RateLimitExceeded` when a reported wait exceeds
    /// the configured maximum.
    pub async fn acquire(
        &self,
        key: &str,
        cost: u32,
        cancel: &CancellationToken,
    ) -> Result<(), CollectorError> {
        loop {
            if cancel.is_cancelled() {
                return Err(CollectorError::Cancelled);
            }
            let retry_after = match self.admit(key, cost) {
                Decision::Allowed => return Ok(()),
                Decision::Denied { retry_after } => retry_after,
            };
            if retry_after > self.max_wait {
                return Err(CollectorError::RateLimitExceeded {
                    key: key.to_string(),
                    retry_after_ms: u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                });
            }
            #[cfg(feature = "tracing")]
            tracing::debug!(
                key,
                wait_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                "waiting for rate limiter"
            );
            tokio::select! {
                () = cancel.cancelled() => return Err(CollectorError::Cancelled),
                () = tokio::time::sleep(retry_after) => {}
            }
        }
    }

    /// Resynchronize `key` from a server remaining-quota header.
    ///
    /// Only ever tightens local state. Returns `false` when the header could
    /// not be parsed.
    pub fn update_from_response(&self, key: &str, header: &str) -> bool {
        self.update_from_response_at(key, header, Instant::now())
    }

    /// [`RateLimiter::update_from_response`] evaluated at an explicit instant.
    pub fn update_from_response_at(&self, key: &str, header: &str, now: Instant) -> bool {
        let Some(parsed) = parse_remaining(header) else {
            #[cfg(feature = "tracing")]
            tracing::debug!(key, header, "ignoring unparseable quota header");
            return false;
        };
        self.with_state(key, |st| match parsed {
            QuotaHeader::Window {
                limit,
                remaining,
                reset,
            } => {
                let window = if limit == st.config.rpm {
                    &mut st.rpm
                } else {
                    &mut st.rps
                };
                if remaining == 0 {
                    window.sync_exhausted(now, reset);
                } else {
                    window.sync_used(now, limit.saturating_sub(remaining));
                }
            }
            QuotaHeader::Grouped {
                per_minute,
                per_second,
                ..
            } => {
                if let Some(left) = per_second {
                    if left == 0 {
                        st.rps.sync_exhausted(now, None);
                    } else {
                        st.rps.sync_used(now, st.config.rps_burst.saturating_sub(left));
                    }
                }
                if let Some(left) = per_minute {
                    if left == 0 {
                        st.rpm.sync_exhausted(now, None);
                    } else {
                        st.rpm.sync_used(now, st.config.rpm_burst.saturating_sub(left));
                    }
                }
            }
        });
        true
    }

    /// Block `key` entirely for `after`, as instructed by a `Retry-After` hint.
    pub fn penalize(&self, key: &str, after: Duration) {
        let now = Instant::now();
        self.with_state(key, |st| {
            st.rps.sync_exhausted(now, Some(after));
            st.rpm.sync_exhausted(now, Some(after));
        });
    }

    /// Unused fraction of the per-minute window of `key`, in `[0, 1]`.
    #[must_use]
    pub fn headroom(&self, key: &str) -> f64 {
        let now = Instant::now();
        self.with_state(key, |st| st.rpm.headroom(now).min(st.rps.headroom(now)))
    }

    /// Forget the state of `key`.
    pub fn reset(&self, key: &str) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Forget the state of every key.
    pub fn reset_all(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

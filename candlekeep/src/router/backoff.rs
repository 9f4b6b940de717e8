//! Reconnect and retry delays.

use std::time::Duration;

use candlekeep_core::BackoffConfig;
use rand::Rng;

/// `base_ms` plus a uniformly drawn jitter of up to `jitter_percent` of it.
#[must_use]
pub fn jitter_wait(base_ms: u64, jitter_percent: u32) -> u64 {
    let jitter_range = if jitter_percent == 0 {
        1
    } else {
        std::cmp::max(1, (base_ms.saturating_mul(u64::from(jitter_percent))) / 100)
    };
    let mut rng = rand::rng();
    base_ms + rng.random_range(0..jitter_range)
}

/// Capped exponential delay before retry number `attempt` (0-based), without jitter.
#[must_use]
pub fn exponential_delay_ms(cfg: &BackoffConfig, attempt: u32) -> u64 {
    let factor = u64::from(cfg.factor.max(1));
    let mut delay = cfg.min_backoff_ms;
    for _ in 0..attempt {
        delay = delay.saturating_mul(factor);
        if delay >= cfg.max_backoff_ms {
            return cfg.max_backoff_ms;
        }
    }
    delay.min(cfg.max_backoff_ms)
}

/// Jittered delay before retry number `attempt`.
#[must_use]
pub fn retry_delay(cfg: &BackoffConfig, attempt: u32) -> Duration {
    Duration::from_millis(jitter_wait(
        exponential_delay_ms(cfg, attempt),
        u32::from(cfg.jitter_percent),
    ))
}

use candlekeep::router::backoff::{exponential_delay_ms, jitter_wait, retry_delay};
use candlekeep::BackoffConfig;

#[test]
fn jitter_wait_within_bounds() {
    let base_ms = 1000;
    let jitter_percent = 10; // 10%
    for _ in 0..100 {
        let v = jitter_wait(base_ms, jitter_percent);
        assert!(v >= base_ms);
        assert!(v < base_ms + (base_ms * u64::from(jitter_percent)) / 100 + 1);
    }
}

#[test]
fn jitter_wait_zero_percent_is_identity() {
    let base_ms = 500;
    for _ in 0..10 {
        let v = jitter_wait(base_ms, 0);
        assert_eq!(v, base_ms);
    }
}

#[test]
fn retry_delay_grows_and_caps() {
    let cfg = BackoffConfig {
        min_backoff_ms: 250,
        max_backoff_ms: 2_000,
        factor: 3,
        jitter_percent: 20,
        max_attempts: None,
    };
    assert_eq!(exponential_delay_ms(&cfg, 0), 250);
    assert_eq!(exponential_delay_ms(&cfg, 1), 750);
    assert_eq!(exponential_delay_ms(&cfg, 2), 2_000);
    for attempt in 0..5 {
        let base = exponential_delay_ms(&cfg, attempt);
        let d = u64::try_from(retry_delay(&cfg, attempt).as_millis()).unwrap();
        assert!(d >= base && d <= base + base / 5, "attempt {attempt}: {d}");
    }
}

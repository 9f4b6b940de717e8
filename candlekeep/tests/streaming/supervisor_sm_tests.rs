use candlekeep::BackoffConfig;
use candlekeep::router::supervisor::{Action, Event, Phase, Supervisor};

fn cfg(max_attempts: Option<u32>) -> BackoffConfig {
    BackoffConfig {
        min_backoff_ms: 100,
        max_backoff_ms: 1_000,
        factor: 2,
        jitter_percent: 0,
        max_attempts,
    }
}

fn connected() -> Supervisor {
    let sup = Supervisor::new(&cfg(None));
    let (sup, _) = sup.handle(Event::DesiredChanged { wanted: true });
    let (sup, _) = sup.handle(Event::ConnectSucceeded);
    assert_eq!(sup.phase, Phase::Connected);
    sup
}

#[test]
fn first_interest_connects_then_subscribes() {
    let sup = Supervisor::new(&cfg(None));
    assert_eq!(sup.phase, Phase::Idle);

    let (sup, actions) = sup.handle(Event::DesiredChanged { wanted: true });
    assert_eq!(sup.phase, Phase::Connecting);
    assert_eq!(actions, vec![Action::Connect]);

    let (sup, actions) = sup.handle(Event::ConnectSucceeded);
    assert_eq!(sup.phase, Phase::Connected);
    assert_eq!(actions, vec![Action::SendSubscription]);
}

#[test]
fn empty_interest_while_idle_does_nothing() {
    let (sup, actions) = Supervisor::new(&cfg(None)).handle(Event::DesiredChanged { wanted: false });
    assert_eq!(sup.phase, Phase::Idle);
    assert!(actions.is_empty());
}

#[test]
fn changed_interest_resends_whole_subscription() {
    let (sup, actions) = connected().handle(Event::DesiredChanged { wanted: true });
    assert_eq!(sup.phase, Phase::Connected);
    assert_eq!(actions, vec![Action::SendSubscription]);
}

#[test]
fn losing_all_interest_closes_session() {
    let (sup, actions) = connected().handle(Event::DesiredChanged { wanted: false });
    assert_eq!(sup.phase, Phase::Idle);
    assert_eq!(actions, vec![Action::CloseSession]);
}

#[test]
fn session_end_schedules_reconnect_with_growing_delay() {
    let (sup, actions) = connected().handle(Event::SessionEnded);
    assert_eq!(sup.phase, Phase::Backoff);
    assert_eq!(actions, vec![Action::ScheduleReconnect { delay_ms: 100 }]);

    let (sup, actions) = sup.handle(Event::BackoffElapsed);
    assert_eq!(sup.phase, Phase::Connecting);
    assert_eq!(actions, vec![Action::Connect]);

    let mut sup = sup;
    let mut delays = Vec::new();
    for _ in 0..5 {
        let (next, actions) = sup.handle(Event::ConnectFailed);
        match actions.as_slice() {
            [Action::ScheduleReconnect { delay_ms }] => delays.push(*delay_ms),
            other => panic!("unexpected actions: {other:?}"),
        }
        let (next, _) = next.handle(Event::BackoffElapsed);
        sup = next;
    }
    assert_eq!(delays, vec![200, 400, 800, 1_000, 1_000]);
    assert_eq!(sup.failures, 5);
}

#[test]
fn successful_connect_resets_backoff() {
    let (sup, _) = connected().handle(Event::SessionEnded);
    let (sup, _) = sup.handle(Event::BackoffElapsed);
    let (sup, _) = sup.handle(Event::ConnectFailed);
    assert!(sup.backoff_ms > sup.min_backoff_ms);
    let (sup, _) = sup.handle(Event::BackoffElapsed);
    let (sup, _) = sup.handle(Event::ConnectSucceeded);
    assert_eq!(sup.failures, 0);
    assert_eq!(sup.backoff_ms, sup.min_backoff_ms);
}

#[test]
fn gives_up_after_max_attempts() {
    let sup = Supervisor::new(&cfg(Some(2)));
    let (sup, _) = sup.handle(Event::DesiredChanged { wanted: true });
    let (sup, actions) = sup.handle(Event::ConnectFailed);
    assert!(matches!(actions.as_slice(), [Action::ScheduleReconnect { .. }]));
    let (sup, _) = sup.handle(Event::BackoffElapsed);
    let (sup, actions) = sup.handle(Event::ConnectFailed);
    assert_eq!(sup.phase, Phase::Stopped);
    assert_eq!(actions, vec![Action::Terminate]);
}

#[test]
fn interest_dropped_during_backoff_returns_to_idle() {
    let (sup, _) = connected().handle(Event::SessionEnded);
    let (sup, actions) = sup.handle(Event::DesiredChanged { wanted: false });
    assert!(actions.is_empty());
    let (sup, actions) = sup.handle(Event::BackoffElapsed);
    assert_eq!(sup.phase, Phase::Idle);
    assert!(actions.is_empty());
}

#[test]
fn connect_finishing_after_interest_left_is_closed() {
    let sup = Supervisor::new(&cfg(None));
    let (sup, _) = sup.handle(Event::DesiredChanged { wanted: true });
    let (sup, _) = sup.handle(Event::DesiredChanged { wanted: false });
    let (sup, actions) = sup.handle(Event::ConnectSucceeded);
    assert_eq!(sup.phase, Phase::Idle);
    assert_eq!(actions, vec![Action::CloseSession]);
}

#[test]
fn shutdown_is_terminal() {
    let (sup, actions) = connected().handle(Event::Shutdown);
    assert_eq!(sup.phase, Phase::Stopped);
    assert_eq!(actions, vec![Action::CloseSession, Action::Terminate]);

    let (sup, actions) = sup.handle(Event::DesiredChanged { wanted: true });
    assert_eq!(sup.phase, Phase::Stopped);
    assert!(actions.is_empty());
}

#[test]
fn stale_notifications_are_ignored() {
    let sup = Supervisor::new(&cfg(None));
    let (sup, actions) = sup.handle(Event::SessionEnded);
    assert_eq!(sup.phase, Phase::Idle);
    assert!(actions.is_empty());
    let (sup, actions) = connected().handle(Event::BackoffElapsed);
    assert_eq!(sup.phase, Phase::Connected);
    assert!(actions.is_empty());
}

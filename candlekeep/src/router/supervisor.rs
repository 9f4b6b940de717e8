//! Connection supervisor for the push feed, as a pure state machine.
//!
//! The hub task feeds [`Event`]s in and executes the returned [`Action`]s;
//! nothing here touches the network or the clock.

use candlekeep_core::BackoffConfig;

/// Connection phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Nothing to subscribe; no connection held.
    Idle,
    /// A connect attempt is in flight.
    Connecting,
    /// The session is up and carries the consolidated subscription.
    Connected,
    /// Waiting out a reconnect delay.
    Backoff,
    /// Shut down, or gave up after `max_attempts` failures.
    Stopped,
}

/// Input to the supervisor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// The consolidated subscription changed; `wanted` is false when it became empty.
    DesiredChanged {
        /// At least one topic is wanted.
        wanted: bool,
    },
    /// The connect attempt produced a session.
    ConnectSucceeded,
    /// The connect attempt failed.
    ConnectFailed,
    /// The live session's events channel closed.
    SessionEnded,
    /// The reconnect delay is over.
    BackoffElapsed,
    /// Stop for good.
    Shutdown,
}

/// Side effect requested from the hub task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Open a new session.
    Connect,
    /// Send the current consolidated subscription on the live session.
    SendSubscription,
    /// Stop the live session, if any.
    CloseSession,
    /// Start the reconnect timer.
    ScheduleReconnect {
        /// Base delay before jitter.
        delay_ms: u64,
    },
    /// Exit the hub task.
    Terminate,
}

/// Reconnect supervisor state.
#[derive(Clone, Debug)]
pub struct Supervisor {
    /// Current phase.
    pub phase: Phase,
    /// The consolidated subscription is non-empty.
    pub wanted: bool,
    /// Consecutive failed connects since the last success.
    pub failures: u32,
    /// Delay of the next scheduled reconnect.
    pub backoff_ms: u64,
    /// Delay after a successful connect.
    pub min_backoff_ms: u64,
    /// Delay cap.
    pub max_backoff_ms: u64,
    /// Growth per failure.
    pub factor: u32,
    /// Failures tolerated before giving up.
    pub max_attempts: Option<u32>,
}

impl Supervisor {
    /// Idle supervisor using `cfg` for reconnect delays.
    #[must_use]
    pub fn new(cfg: &BackoffConfig) -> Self {
        Self {
            phase: Phase::Idle,
            wanted: false,
            failures: 0,
            backoff_ms: cfg.min_backoff_ms,
            min_backoff_ms: cfg.min_backoff_ms,
            max_backoff_ms: cfg.max_backoff_ms.max(cfg.min_backoff_ms),
            factor: cfg.factor.max(1),
            max_attempts: cfg.max_attempts,
        }
    }

    /// Apply `event`, returning the next state and the actions to run in order.
    #[must_use]
    pub fn handle(mut self, event: Event) -> (Self, Vec<Action>) {
        match (self.phase, event) {
            (Phase::Stopped, _) => (self, Vec::new()),
            (_, Event::Shutdown) => {
                self.phase = Phase::Stopped;
                (self, vec![Action::CloseSession, Action::Terminate])
            }

            (Phase::Idle, Event::DesiredChanged { wanted }) => {
                self.wanted = wanted;
                if wanted {
                    self.phase = Phase::Connecting;
                    (self, vec![Action::Connect])
                } else {
                    (self, Vec::new())
                }
            }
            (Phase::Connecting | Phase::Backoff, Event::DesiredChanged { wanted }) => {
                self.wanted = wanted;
                (self, Vec::new())
            }
            (Phase::Connected, Event::DesiredChanged { wanted }) => {
                self.wanted = wanted;
                if wanted {
                    (self, vec![Action::SendSubscription])
                } else {
                    self.phase = Phase::Idle;
                    (self, vec![Action::CloseSession])
                }
            }

            (Phase::Connecting, Event::ConnectSucceeded) => {
                self.failures = 0;
                self.backoff_ms = self.min_backoff_ms;
                if self.wanted {
                    self.phase = Phase::Connected;
                    (self, vec![Action::SendSubscription])
                } else {
                    self.phase = Phase::Idle;
                    (self, vec![Action::CloseSession])
                }
            }
            (Phase::Connecting, Event::ConnectFailed) => {
                self.failures = self.failures.saturating_add(1);
                if self.max_attempts.is_some_and(|max| self.failures >= max) {
                    self.phase = Phase::Stopped;
                    return (self, vec![Action::Terminate]);
                }
                self.schedule_reconnect()
            }

            (Phase::Connected, Event::SessionEnded) => {
                if self.wanted {
                    self.schedule_reconnect()
                } else {
                    self.phase = Phase::Idle;
                    (self, Vec::new())
                }
            }

            (Phase::Backoff, Event::BackoffElapsed) => {
                if self.wanted {
                    self.phase = Phase::Connecting;
                    (self, vec![Action::Connect])
                } else {
                    self.phase = Phase::Idle;
                    (self, Vec::new())
                }
            }

            // Stale notifications from a previous session or timer.
            (_, _) => (self, Vec::new()),
        }
    }

    fn schedule_reconnect(mut self) -> (Self, Vec<Action>) {
        let delay_ms = self.backoff_ms;
        self.backoff_ms = self
            .backoff_ms
            .saturating_mul(u64::from(self.factor))
            .min(self.max_backoff_ms);
        self.phase = Phase::Backoff;
        (self, vec![Action::ScheduleReconnect { delay_ms }])
    }
}

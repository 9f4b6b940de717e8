//! One multiplexed push-feed connection per venue.
//!
//! Listeners register interest per `(kind, symbols)`; the hub folds every
//! registration into one consolidated [`Subscription`] and sends it whole
//! whenever it changes, since the venue replaces the previous set on each
//! message. A single supervisor task owns the session, reconnects with
//! jittered exponential backoff, and resubscribes after every reconnect.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use candlekeep_core::{
    BackoffConfig, CollectorError, MarketEvent, StreamKind, StreamSession, StreamSource,
    Subscription, Ticker, Timeframe,
};
use rand::Rng;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep};
use tokio_util::sync::CancellationToken;

use super::backoff::jitter_wait;
use super::supervisor::{Action, Event, Supervisor};

/// Settings for a [`StreamHub`].
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Ticket sent with every subscription; generated when `None`.
    pub ticket: Option<String>,
    /// Candle unit requested for `StreamKind::Candle` topics.
    pub candle_timeframe: Timeframe,
    /// Reconnect policy.
    pub backoff: BackoffConfig,
    /// Capacity of each listener queue.
    pub listener_queue: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            ticket: None,
            candle_timeframe: Timeframe::M1,
            backoff: BackoffConfig::default(),
            listener_queue: 256,
        }
    }
}

enum Sink {
    /// Drop-oldest queue for staleness-tolerant kinds.
    Latest(broadcast::Sender<MarketEvent>),
    /// Bounded queue that applies backpressure instead of dropping.
    Ordered(mpsc::Sender<MarketEvent>),
}

struct ListenerEntry {
    id: u64,
    kind: StreamKind,
    symbols: BTreeSet<String>,
    sink: Sink,
}

#[derive(Default)]
struct HubState {
    listeners: Vec<ListenerEntry>,
    next_id: u64,
    last_seen: HashMap<(StreamKind, String), Instant>,
    last_ticker: HashMap<String, Ticker>,
    connected: bool,
    connects: u64,
}

struct HubShared {
    ticket: String,
    candle_timeframe: Timeframe,
    listener_queue: usize,
    state: Mutex<HubState>,
    desired: watch::Sender<Subscription>,
}

impl HubShared {
    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn consolidated(&self, state: &HubState) -> Subscription {
        let mut sub = Subscription::new(self.ticket.clone());
        sub.candle_timeframe = self.candle_timeframe;
        for l in &state.listeners {
            sub.topics
                .entry(l.kind)
                .or_default()
                .extend(l.symbols.iter().cloned());
        }
        sub
    }

    /// Push the consolidated set to the supervisor if it changed.
    fn publish(&self) {
        let next = {
            let state = self.lock();
            self.consolidated(&state)
        };
        self.desired.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn remove_listener(&self, id: u64) {
        self.lock().listeners.retain(|l| l.id != id);
        self.publish();
    }

    /// Record freshness and collect the queues `ev` must reach.
    fn route(&self, ev: &MarketEvent) -> Vec<mpsc::Sender<MarketEvent>> {
        let kind = ev.kind();
        let symbol = ev.symbol().to_string();
        let mut state = self.lock();
        state.last_seen.insert((kind, symbol.clone()), Instant::now());
        if let MarketEvent::Ticker(t) = ev {
            state.last_ticker.insert(symbol.clone(), t.clone());
        }
        let mut ordered = Vec::new();
        for l in &state.listeners {
            if l.kind != kind || !l.symbols.contains(&symbol) {
                continue;
            }
            match &l.sink {
                Sink::Latest(tx) => {
                    let _ = tx.send(ev.clone());
                }
                Sink::Ordered(tx) => ordered.push(tx.clone()),
            }
        }
        ordered
    }
}

enum ListenerRx {
    Latest(broadcast::Receiver<MarketEvent>),
    Ordered(mpsc::Receiver<MarketEvent>),
}

/// Registration on a [`StreamHub`]; dropping it unsubscribes.
pub struct Listener {
    id: u64,
    kind: StreamKind,
    shared: Arc<HubShared>,
    rx: ListenerRx,
    dropped: u64,
}

impl Listener {
    /// Next message for this listener, or `None` once the hub shut down.
    ///
    /// Ticker and orderbook listeners skip messages they fell behind on.
    pub async fn recv(&mut self) -> Option<MarketEvent> {
        let Self { rx, dropped, .. } = self;
        match rx {
            ListenerRx::Ordered(rx) => rx.recv().await,
            ListenerRx::Latest(rx) => loop {
                match rx.recv().await {
                    Ok(ev) => return Some(ev),
                    Err(RecvError::Lagged(n)) => *dropped = dropped.saturating_add(n),
                    Err(RecvError::Closed) => return None,
                }
            },
        }
    }

    /// Messages skipped because this listener fell behind.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Stream kind this listener receives.
    #[must_use]
    pub const fn kind(&self) -> StreamKind {
        self.kind
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shared.remove_listener(self.id);
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("dropped", &self.dropped)
            .finish_non_exhaustive()
    }
}

/// Multiplexed push-feed connection shared by every live consumer.
///
/// The supervisor task starts with the first subscription, so constructing
/// a hub needs no runtime.
pub struct StreamHub {
    shared: Arc<HubShared>,
    source: Arc<dyn StreamSource>,
    backoff: BackoffConfig,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StreamHub {
    /// Create a hub over `source`.
    #[must_use]
    pub fn new(source: Arc<dyn StreamSource>, cfg: HubConfig) -> Self {
        let ticket = cfg
            .ticket
            .unwrap_or_else(|| format!("candlekeep-{:016x}", rand::rng().random::<u64>()));
        let mut initial = Subscription::new(ticket.clone());
        initial.candle_timeframe = cfg.candle_timeframe;
        let (desired, _) = watch::channel(initial);
        Self {
            shared: Arc::new(HubShared {
                ticket,
                candle_timeframe: cfg.candle_timeframe,
                listener_queue: cfg.listener_queue.max(1),
                state: Mutex::new(HubState::default()),
                desired,
            }),
            source,
            backoff: cfg.backoff,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Register a listener for `kind` messages of `symbols`.
    ///
    /// # Errors
    /// Returns `CollectorError::InvalidArg` for an empty symbol list and
    /// `CollectorError::Cancelled` after [`StreamHub::shutdown`].
    pub fn subscribe<S: AsRef<str>>(
        &self,
        kind: StreamKind,
        symbols: &[S],
    ) -> Result<Listener, CollectorError> {
        if self.cancel.is_cancelled() {
            return Err(CollectorError::Cancelled);
        }
        let symbols: BTreeSet<String> = symbols
            .iter()
            .map(|s| s.as_ref().trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() {
            return Err(CollectorError::InvalidArg(
                "subscribe needs at least one symbol".into(),
            ));
        }

        let cap = self.shared.listener_queue;
        let (sink, rx) = if kind.tolerates_drops() {
            let (tx, rx) = broadcast::channel(cap);
            (Sink::Latest(tx), ListenerRx::Latest(rx))
        } else {
            let (tx, rx) = mpsc::channel(cap);
            (Sink::Ordered(tx), ListenerRx::Ordered(rx))
        };

        let id = {
            let mut state = self.shared.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.listeners.push(ListenerEntry {
                id,
                kind,
                symbols,
                sink,
            });
            id
        };
        self.shared.publish();
        self.ensure_started();

        Ok(Listener {
            id,
            kind,
            shared: Arc::clone(&self.shared),
            rx,
            dropped: 0,
        })
    }

    fn ensure_started(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        // A supervisor that gave up after `max_attempts` is restarted by new interest.
        if task.as_ref().is_none_or(JoinHandle::is_finished) {
            *task = Some(tokio::spawn(run(
                Arc::clone(&self.shared),
                Arc::clone(&self.source),
                self.backoff,
                self.shared.desired.subscribe(),
                self.cancel.clone(),
            )));
        }
    }

    /// True when a message for `(kind, symbol)` arrived within `within` on a live session.
    #[must_use]
    pub fn is_fresh(&self, kind: StreamKind, symbol: &str, within: Duration) -> bool {
        let state = self.shared.lock();
        state.connected
            && state
                .last_seen
                .get(&(kind, symbol.to_uppercase()))
                .is_some_and(|at| at.elapsed() <= within)
    }

    /// Latest ticker for `symbol` if it is fresh.
    #[must_use]
    pub fn latest_ticker(&self, symbol: &str, within: Duration) -> Option<Ticker> {
        let symbol = symbol.to_uppercase();
        if !self.is_fresh(StreamKind::Ticker, &symbol, within) {
            return None;
        }
        self.shared.lock().last_ticker.get(&symbol).cloned()
    }

    /// True when some listener currently wants `(kind, symbol)`.
    #[must_use]
    pub fn is_subscribed(&self, kind: StreamKind, symbol: &str) -> bool {
        self.shared
            .desired
            .borrow()
            .contains(kind, &symbol.to_uppercase())
    }

    /// The consolidated subscription currently requested from the venue.
    #[must_use]
    pub fn subscription(&self) -> Subscription {
        self.shared.desired.borrow().clone()
    }

    /// True while a session is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }

    /// Successful connects so far, including reconnects.
    #[must_use]
    pub fn connect_count(&self) -> u64 {
        self.shared.lock().connects
    }

    /// Stop the supervisor and close every listener.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.shared.lock().listeners.clear();
    }
}

impl Drop for StreamHub {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for StreamHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHub")
            .field("source", &self.source.name())
            .field("ticket", &self.shared.ticket)
            .finish_non_exhaustive()
    }
}

async fn next_message(session: &mut Option<StreamSession>) -> Option<MarketEvent> {
    match session {
        Some(s) => s.events.recv().await,
        None => std::future::pending().await,
    }
}

async fn timer_elapsed(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(t) => t.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn dispatch(shared: &HubShared, ev: MarketEvent, cancel: &CancellationToken) {
    for tx in shared.route(&ev) {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            _ = tx.send(ev.clone()) => {}
        }
    }
}

async fn run(
    shared: Arc<HubShared>,
    source: Arc<dyn StreamSource>,
    backoff: BackoffConfig,
    mut desired: watch::Receiver<Subscription>,
    cancel: CancellationToken,
) {
    let jitter_percent = u32::from(backoff.jitter_percent);
    let mut sm = Supervisor::new(&backoff);
    let mut session: Option<StreamSession> = None;
    let mut timer: Option<Pin<Box<Sleep>>> = None;
    let mut pending: VecDeque<Event> = VecDeque::new();
    pending.push_back(Event::DesiredChanged {
        wanted: !desired.borrow_and_update().is_empty(),
    });

    loop {
        let event = if let Some(ev) = pending.pop_front() {
            ev
        } else {
            tokio::select! {
                biased;
                () = cancel.cancelled() => Event::Shutdown,
                changed = desired.changed() => match changed {
                    Ok(()) => Event::DesiredChanged {
                        wanted: !desired.borrow_and_update().is_empty(),
                    },
                    Err(_) => Event::Shutdown,
                },
                msg = next_message(&mut session) => match msg {
                    Some(ev) => {
                        dispatch(&shared, ev, &cancel).await;
                        continue;
                    }
                    None => {
                        if let Some(s) = session.take() {
                            s.handle.abort();
                        }
                        shared.lock().connected = false;
                        #[cfg(feature = "tracing")]
                        tracing::warn!(source = source.name(), "stream session ended");
                        Event::SessionEnded
                    }
                },
                () = timer_elapsed(&mut timer) => {
                    timer = None;
                    Event::BackoffElapsed
                }
            }
        };

        let (next, actions) = sm.handle(event);
        sm = next;

        for action in actions {
            match action {
                Action::Connect => {
                    let attempt = tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        res = source.connect() => Some(res),
                    };
                    pending.push_back(match attempt {
                        None => Event::Shutdown,
                        Some(Ok(s)) => {
                            session = Some(s);
                            let mut state = shared.lock();
                            state.connected = true;
                            state.connects += 1;
                            Event::ConnectSucceeded
                        }
                        Some(Err(_e)) => {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(source = source.name(), error = %_e, "stream connect failed");
                            Event::ConnectFailed
                        }
                    });
                }
                Action::SendSubscription => {
                    let sub = desired.borrow().clone();
                    if let Some(s) = &session {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(ticket = %sub.ticket, "sending consolidated subscription");
                        // A failed send means the session is gone; its events
                        // channel closing reports that.
                        let _ = s.commands.send(sub).await;
                    }
                }
                Action::CloseSession => {
                    if let Some(s) = session.take() {
                        s.handle.stop().await;
                    }
                    shared.lock().connected = false;
                }
                Action::ScheduleReconnect { delay_ms } => {
                    let wait = jitter_wait(delay_ms, jitter_percent);
                    #[cfg(feature = "tracing")]
                    tracing::info!(delay_ms = wait, failures = sm.failures, "scheduling stream reconnect");
                    timer = Some(Box::pin(tokio::time::sleep(Duration::from_millis(wait))));
                }
                Action::Terminate => {
                    {
                        let mut state = shared.lock();
                        state.connected = false;
                        state.listeners.clear();
                    }
                    // Routing reads the published set.
                    shared.publish();
                    return;
                }
            }
        }
    }
}

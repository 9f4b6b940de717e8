use std::sync::Arc;

use async_trait::async_trait;
use candlekeep_core::{
    CollectorError, MarketEvent, StreamHandle, StreamSession, StreamSource, Subscription,
};
use tokio::sync::{Mutex, mpsc, oneshot};

struct ActiveSession {
    inbound: mpsc::Sender<MarketEvent>,
    kill_switch: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
struct StreamState {
    connects: usize,
    refuse_connects: usize,
    subscriptions: Vec<Subscription>,
    active: Option<ActiveSession>,
}

/// Controller handle used by tests to drive a [`MockStream`] from the outside.
#[derive(Clone)]
pub struct MockStreamController {
    state: Arc<Mutex<StreamState>>,
}

impl MockStreamController {
    /// Push an event into the live session.
    ///
    /// Returns `true` if the event was queued, `false` if no session is active
    /// or the session is gone. Events for topics the session has not
    /// subscribed to are dropped by the session.
    pub async fn push(&self, event: MarketEvent) -> bool {
        let tx = {
            let guard = self.state.lock().await;
            guard.active.as_ref().map(|s| s.inbound.clone())
        };
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Drop the live connection as if the venue closed it.
    pub async fn disconnect(&self) {
        let mut guard = self.state.lock().await;
        if let Some(mut session) = guard.active.take()
            && let Some(kill) = session.kill_switch.take()
        {
            let _ = kill.send(());
        }
    }

    /// Refuse the next `n` connection attempts.
    pub async fn refuse_next_connects(&self, n: usize) {
        self.state.lock().await.refuse_connects = n;
    }

    /// Connection attempts so far, including refused ones.
    pub async fn connect_count(&self) -> usize {
        self.state.lock().await.connects
    }

    /// Every subscription message received across all sessions, in order.
    pub async fn subscriptions(&self) -> Vec<Subscription> {
        self.state.lock().await.subscriptions.clone()
    }

    /// True while a session is connected.
    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.active.is_some()
    }
}

/// Push-feed source whose sessions are driven by a [`MockStreamController`].
pub struct MockStream {
    state: Arc<Mutex<StreamState>>,
}

impl MockStream {
    /// Create a mock stream source and its controller.
    #[must_use]
    pub fn new_with_controller() -> (Arc<Self>, MockStreamController) {
        let state = Arc::new(Mutex::new(StreamState::default()));
        let controller = MockStreamController {
            state: Arc::clone(&state),
        };
        (Arc::new(Self { state }), controller)
    }
}

#[async_trait]
impl StreamSource for MockStream {
    fn name(&self) -> &'static str {
        "mock-stream"
    }

    async fn connect(&self) -> Result<StreamSession, CollectorError> {
        let (in_tx, mut in_rx) = mpsc::channel::<MarketEvent>(1024);
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        {
            let mut guard = self.state.lock().await;
            guard.connects += 1;
            if guard.refuse_connects > 0 {
                guard.refuse_connects -= 1;
                return Err(CollectorError::channel("websocket", "connection refused"));
            }
            guard.active = Some(ActiveSession {
                inbound: in_tx,
                kill_switch: Some(kill_tx),
            });
        }

        let (events_tx, events_rx) = mpsc::channel::<MarketEvent>(1024);
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<Subscription>(16);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let state = Arc::clone(&self.state);

        let join = tokio::spawn(async move {
            let mut current: Option<Subscription> = None;
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = &mut kill_rx => break,
                    cmd = cmd_rx.recv() => {
                        let Some(sub) = cmd else { break };
                        state.lock().await.subscriptions.push(sub.clone());
                        current = Some(sub);
                    }
                    ev = in_rx.recv() => {
                        let Some(ev) = ev else { break };
                        let wanted = current
                            .as_ref()
                            .is_some_and(|s| s.contains(ev.kind(), ev.symbol()));
                        if wanted && events_tx.send(ev).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(StreamSession {
            handle: StreamHandle::new(join, stop_tx),
            commands: cmd_tx,
            events: events_rx,
        })
    }
}

use async_trait::async_trait;
use candlekeep_core::{
    CollectorError, MarketEvent, StreamHandle, StreamSession, StreamSource, Subscription,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::UpbitConnector;
use crate::convert;

const EVENT_QUEUE: usize = 1024;
const COMMAND_QUEUE: usize = 16;

/// Decode a text or binary payload and forward it. Returns `false` once the
/// consumer is gone.
async fn forward(payload: &str, events: &mpsc::Sender<MarketEvent>) -> bool {
    match convert::parse_event(payload) {
        Ok(Some(ev)) => events.send(ev).await.is_ok(),
        Ok(None) => true,
        Err(_e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %_e, "dropping undecodable upbit frame");
            true
        }
    }
}

#[async_trait]
impl StreamSource for UpbitConnector {
    fn name(&self) -> &'static str {
        "upbit"
    }

    async fn connect(&self) -> Result<StreamSession, CollectorError> {
        let (socket, _resp) =
            tokio::time::timeout(self.connect_timeout, connect_async(self.ws_url.as_str()))
                .await
                .map_err(|_| CollectorError::Timeout("websocket connect".into()))?
                .map_err(|e| CollectorError::channel("websocket", e.to_string()))?;
        let (mut write, mut read) = socket.split();

        let (events_tx, events_rx) = mpsc::channel::<MarketEvent>(EVENT_QUEUE);
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<Subscription>(COMMAND_QUEUE);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let ping_every = self.ping_interval;

        let join = tokio::spawn(async move {
            let mut ping = tokio::time::interval(ping_every);
            ping.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    cmd = cmd_rx.recv() => {
                        let Some(sub) = cmd else { break };
                        let frame = convert::subscribe_message(&sub);
                        #[cfg(feature = "tracing")]
                        tracing::debug!(ticket = %sub.ticket, "sending upbit subscription");
                        if write.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(txt))) => {
                                if !forward(txt.as_str(), &events_tx).await {
                                    break;
                                }
                            }
                            Some(Ok(Message::Binary(bin))) => {
                                if let Ok(txt) = std::str::from_utf8(&bin)
                                    && !forward(txt, &events_tx).await
                                {
                                    break;
                                }
                            }
                            Some(Ok(Message::Ping(payload))) => {
                                let _ = write.send(Message::Pong(payload)).await;
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(_e)) => {
                                #[cfg(feature = "tracing")]
                                tracing::warn!(error = %_e, "upbit websocket read error");
                                break;
                            }
                        }
                    }
                    _ = ping.tick() => {
                        if write.send(Message::Text("PING".into())).await.is_err() {
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

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;
use uuid::Uuid;

use super::provider::{ChannelProvider, ChannelSpec, ProviderFrame, Subscription, SubscriptionId};
use super::wire::WireMessage;
use crate::error::ReconnectPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Reconnect attempts exhausted; channels stay silent
    GaveUp,
}

struct Route {
    spec: ChannelSpec,
    tx: mpsc::UnboundedSender<ProviderFrame>,
}

type Routes = Arc<DashMap<SubscriptionId, Route>>;

/// Channel provider backed by a WebSocket connection to the relay server.
///
/// The connection runs on a background task which reconnects according to
/// its [`ReconnectPolicy`] and rejoins every live channel after a reconnect.
/// Traffic sent while disconnected is dropped.
pub struct RemoteProvider {
    outbound: mpsc::UnboundedSender<WireMessage>,
    routes: Routes,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl RemoteProvider {
    /// Start connecting to `url` in the background
    pub fn spawn(url: &str, policy: ReconnectPolicy) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| anyhow!("invalid relay url: {e}"))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            bail!("invalid relay url scheme '{}', expected ws or wss", url.scheme());
        }

        let routes: Routes = Arc::new(DashMap::new());
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Connecting);

        let task = tokio::spawn(run_connection(
            url,
            policy,
            routes.clone(),
            outbound_rx,
            state_tx,
        ));

        Ok(Self {
            outbound,
            routes,
            state,
            task,
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the relay connection is up. Returns false on timeout or
    /// when the provider gave up reconnecting.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut state = self.state.clone();
        let waited = tokio::time::timeout(
            timeout,
            state.wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::GaveUp)),
        )
        .await;
        matches!(waited, Ok(Ok(s)) if *s == ConnectionState::Connected)
    }

    fn send(&self, message: WireMessage) {
        // fails only once the connection task has ended
        let _ = self.outbound.send(message);
    }
}

impl Drop for RemoteProvider {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl ChannelProvider for RemoteProvider {
    fn join(&self, spec: ChannelSpec) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, frames) = mpsc::unbounded_channel();
        let join = WireMessage::Join {
            subscription: id,
            channel: spec.name.clone(),
            bindings: spec.bindings.clone(),
        };
        // route first, so a reconnect that drains the queue still rejoins it
        self.routes.insert(id, Route { spec, tx });
        self.send(join);
        Subscription { id, frames }
    }

    fn leave(&self, id: SubscriptionId) {
        if self.routes.remove(&id).is_some() {
            self.send(WireMessage::Leave { subscription: id });
        }
    }

    fn broadcast(&self, channel: &str, event: &str, payload: Value) {
        self.send(WireMessage::Broadcast {
            channel: channel.to_string(),
            event: event.to_string(),
            payload,
        });
    }
}

enum PumpExit {
    Disconnected,
    Shutdown,
}

async fn run_connection(
    url: Url,
    policy: ReconnectPolicy,
    routes: Routes,
    mut outbound: mpsc::UnboundedReceiver<WireMessage>,
    state: watch::Sender<ConnectionState>,
) {
    let mut failures: u32 = 0;

    loop {
        let _ = state.send(ConnectionState::Connecting);

        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws, _)) => {
                failures = 0;
                let _ = state.send(ConnectionState::Connected);
                tracing::info!(relay = %url, "relay connected");

                match pump(ws, &routes, &mut outbound).await {
                    PumpExit::Shutdown => return,
                    PumpExit::Disconnected => {
                        tracing::warn!(relay = %url, "relay connection lost, reconnecting");
                    }
                }
            }
            Err(err) => {
                failures += 1;
                if !policy.allows(failures) {
                    tracing::error!(relay = %url, attempts = failures, %err, "giving up on relay");
                    let _ = state.send(ConnectionState::GaveUp);
                    return;
                }
                let delay = policy.delay_for(failures);
                tracing::warn!(relay = %url, attempt = failures, ?delay, %err, "relay connection failed");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn pump(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    routes: &Routes,
    outbound: &mut mpsc::UnboundedReceiver<WireMessage>,
) -> PumpExit {
    let (mut sink, mut stream) = ws.split();

    // Joins and leaves queued while offline are covered by the rejoin
    // below; stale broadcasts are dropped.
    while outbound.try_recv().is_ok() {}

    let rejoin: Vec<WireMessage> = routes
        .iter()
        .map(|entry| WireMessage::Join {
            subscription: *entry.key(),
            channel: entry.spec.name.clone(),
            bindings: entry.spec.bindings.clone(),
        })
        .collect();
    for message in rejoin {
        if send_wire(&mut sink, &message).await.is_err() {
            return PumpExit::Disconnected;
        }
    }

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => route_incoming(routes, WireMessage::from_text(text.as_str())),
                Some(Ok(Message::Binary(bin))) => route_incoming(routes, WireMessage::from_binary(&bin)),
                Some(Ok(Message::Close(_))) | None => return PumpExit::Disconnected,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::warn!(%err, "relay read failed");
                    return PumpExit::Disconnected;
                }
            },
            outgoing = outbound.recv() => match outgoing {
                Some(message) => {
                    if send_wire(&mut sink, &message).await.is_err() {
                        return PumpExit::Disconnected;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    return PumpExit::Shutdown;
                }
            },
        }
    }
}

async fn send_wire<S>(sink: &mut S, message: &WireMessage) -> Result<()>
where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let text = message.to_text()?;
    sink.send(Message::Text(text.into())).await?;
    Ok(())
}

fn route_incoming(routes: &Routes, message: Result<WireMessage>) {
    let message = match message {
        Ok(message) => message,
        Err(err) => {
            tracing::warn!(%err, "dropping malformed relay frame");
            return;
        }
    };

    match message {
        WireMessage::Frame {
            subscription,
            frame,
        } => {
            let delivered = match routes.get(&subscription) {
                Some(route) => route.tx.send(frame).is_ok(),
                None => {
                    tracing::debug!(%subscription, "frame for unknown subscription");
                    return;
                }
            };
            if !delivered {
                routes.remove(&subscription);
            }
        }
        other => tracing::debug!(?other, "ignoring unexpected relay message"),
    }
}

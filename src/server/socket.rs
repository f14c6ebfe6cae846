//! One relay WebSocket connection.
//!
//! Each connection gets its own origin id in the broker, so its broadcasts
//! skip its own subscriptions. Client-chosen subscription ids map to broker
//! subscriptions plus a forwarder task that wraps frames for the wire.

use std::collections::HashMap;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::api::AppState;
use crate::realtime::broker::OriginId;
use crate::realtime::provider::SubscriptionId;
use crate::realtime::wire::WireMessage;
use crate::realtime::{ChannelProvider, ChannelSpec, LocalBroker};

struct Joined {
    broker_id: SubscriptionId,
    forwarder: JoinHandle<()>,
}

pub(super) async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state.broker, socket))
}

async fn handle_socket(broker: LocalBroker, socket: WebSocket) {
    let origin: OriginId = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    tracing::info!(%origin, "relay client connected");

    // Forwarders push here; a single task owns the socket sink
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<WireMessage>();
    let send_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let text = match message.to_text() {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(%err, "dropping unencodable frame");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut joined: HashMap<SubscriptionId, Joined> = HashMap::new();

    while let Some(msg) = receiver.next().await {
        let decoded = match msg {
            Ok(Message::Text(text)) => WireMessage::from_text(text.as_str()),
            Ok(Message::Binary(bin)) => WireMessage::from_binary(&bin),
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Err(err) => {
                tracing::debug!(%origin, %err, "relay socket error");
                break;
            }
        };

        match decoded {
            Ok(message) => handle_client_message(&broker, origin, &outbound, &mut joined, message),
            Err(err) => tracing::warn!(%origin, "dropping malformed client frame: {err:#}"),
        }
    }

    for (_, entry) in joined.drain() {
        entry.forwarder.abort();
    }
    broker.leave_origin(origin);
    send_task.abort();
    tracing::info!(%origin, "relay client disconnected");
}

fn handle_client_message(
    broker: &LocalBroker,
    origin: OriginId,
    outbound: &mpsc::UnboundedSender<WireMessage>,
    joined: &mut HashMap<SubscriptionId, Joined>,
    message: WireMessage,
) {
    match message {
        WireMessage::Join {
            subscription,
            channel,
            bindings,
        } => {
            // A rejoin after reconnect reuses the id; replace the old route
            if let Some(previous) = joined.remove(&subscription) {
                previous.forwarder.abort();
                broker.leave(previous.broker_id);
            }

            let spec = ChannelSpec {
                name: channel,
                bindings,
            };
            let mut joined_sub = broker.join_from(Some(origin), spec);
            let broker_id = joined_sub.id;
            let outbound = outbound.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(frame) = joined_sub.frames.recv().await {
                    if outbound.send(WireMessage::Frame { subscription, frame }).is_err() {
                        break;
                    }
                }
            });
            joined.insert(
                subscription,
                Joined {
                    broker_id,
                    forwarder,
                },
            );
        }
        WireMessage::Leave { subscription } => {
            if let Some(entry) = joined.remove(&subscription) {
                entry.forwarder.abort();
                broker.leave(entry.broker_id);
            }
        }
        WireMessage::Broadcast {
            channel,
            event,
            payload,
        } => {
            broker.broadcast_from(Some(origin), &channel, &event, payload);
        }
        WireMessage::Frame { .. } => {
            tracing::warn!(%origin, "client sent a relay-only frame, ignoring");
        }
    }
}

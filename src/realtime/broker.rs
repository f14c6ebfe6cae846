//! In-process channel provider.
//!
//! Routes change events and broadcasts to joined channels over unbounded
//! tokio channels. The relay server hosts one broker for all WebSocket
//! connections; tests use it directly as the provider.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::envelope::RawChange;
use super::provider::{ChannelProvider, ChannelSpec, ProviderFrame, Subscription, SubscriptionId};

/// Identifies the party a subscription or broadcast belongs to, so a
/// broadcast is not echoed back to its sender.
pub type OriginId = Uuid;

struct Registration {
    spec: ChannelSpec,
    origin: Option<OriginId>,
    tx: mpsc::UnboundedSender<ProviderFrame>,
}

#[derive(Clone, Default)]
pub struct LocalBroker {
    subscriptions: Arc<DashMap<SubscriptionId, Registration>>,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a channel on behalf of `origin`
    pub fn join_from(&self, origin: Option<OriginId>, spec: ChannelSpec) -> Subscription {
        let (tx, frames) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        tracing::debug!(channel = %spec.name, subscription = %id, "channel joined");
        self.subscriptions.insert(id, Registration { spec, origin, tx });
        Subscription { id, frames }
    }

    /// Remove every subscription held by `origin`
    pub fn leave_origin(&self, origin: OriginId) {
        self.subscriptions
            .retain(|_, reg| reg.origin != Some(origin));
    }

    /// Deliver a change event to every channel whose bindings match.
    /// Returns the number of subscriptions it reached.
    pub fn publish_change(&self, change: RawChange) -> usize {
        let frame = ProviderFrame::Change(change.clone());
        self.deliver(None, |reg| reg.spec.wants(&change), &frame)
    }

    /// Broadcast to subscribers of `channel`, skipping those owned by `origin`.
    pub fn broadcast_from(
        &self,
        origin: Option<OriginId>,
        channel: &str,
        event: &str,
        payload: Value,
    ) -> usize {
        let frame = ProviderFrame::Broadcast {
            event: event.to_string(),
            payload,
        };
        self.deliver(origin, |reg| reg.spec.name == channel, &frame)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }

    fn deliver(
        &self,
        skip_origin: Option<OriginId>,
        wants: impl Fn(&Registration) -> bool,
        frame: &ProviderFrame,
    ) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();

        for entry in self.subscriptions.iter() {
            let reg = entry.value();
            if skip_origin.is_some() && reg.origin == skip_origin {
                continue;
            }
            if !wants(reg) {
                continue;
            }
            if reg.tx.send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*entry.key());
            }
        }

        // Receivers dropped without leaving
        for id in dead {
            self.subscriptions.remove(&id);
        }

        delivered
    }
}

impl ChannelProvider for LocalBroker {
    fn join(&self, spec: ChannelSpec) -> Subscription {
        self.join_from(None, spec)
    }

    fn leave(&self, id: SubscriptionId) {
        if let Some((_, reg)) = self.subscriptions.remove(&id) {
            tracing::debug!(channel = %reg.spec.name, subscription = %id, "channel left");
        }
    }

    fn broadcast(&self, channel: &str, event: &str, payload: Value) {
        self.broadcast_from(None, channel, event, payload);
    }
}

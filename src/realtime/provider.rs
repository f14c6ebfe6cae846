//! The pub/sub channel provider seam.
//!
//! A provider delivers two kinds of traffic on named channels: change-feed
//! events matching a channel's bindings, and ad-hoc broadcasts. Delivery is
//! best-effort. Providers never report network failures to subscribers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::envelope::RawChange;

pub type SubscriptionId = Uuid;

/// Equality filter on one column of one table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Binding {
    pub table: String,
    pub column: String,
    pub value: String,
}

impl Binding {
    pub fn new(table: impl Into<String>, column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, change: &RawChange) -> bool {
        if change.table != self.table {
            return false;
        }
        match change.row_image().get(&self.column) {
            Some(Value::String(s)) => *s == self.value,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == self.value,
        }
    }
}

/// A named channel and the change bindings it listens to.
/// Broadcast-only channels have no bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub name: String,
    #[serde(default)]
    pub bindings: Vec<Binding>,
}

impl ChannelSpec {
    pub fn broadcast(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: Vec::new(),
        }
    }

    pub fn changes(name: impl Into<String>, binding: Binding) -> Self {
        Self {
            name: name.into(),
            bindings: vec![binding],
        }
    }

    pub fn wants(&self, change: &RawChange) -> bool {
        self.bindings.iter().any(|b| b.matches(change))
    }
}

/// One unit of traffic delivered on a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderFrame {
    Change(RawChange),
    Broadcast { event: String, payload: Value },
}

/// A joined channel. Dropping the receiver does not leave the channel;
/// call [`ChannelProvider::leave`].
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub frames: mpsc::UnboundedReceiver<ProviderFrame>,
}

/// Injected pub/sub dependency of the realtime client
pub trait ChannelProvider: Send + Sync + 'static {
    /// Join a channel. Frames arrive on the returned subscription until
    /// [`leave`](Self::leave) is called.
    fn join(&self, spec: ChannelSpec) -> Subscription;

    /// Leave a channel. Unknown ids are ignored.
    fn leave(&self, id: SubscriptionId);

    /// Fire-and-forget broadcast to the other subscribers of `channel`
    fn broadcast(&self, channel: &str, event: &str, payload: Value);
}

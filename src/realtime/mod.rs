//! Realtime layer: typed subscriptions over an injected pub/sub provider.
//!
//! [`LocalBroker`] serves in-process and behind the relay server;
//! [`RemoteProvider`] talks to that relay over WebSocket.

pub mod broker;
pub mod client;
pub mod envelope;
pub mod provider;
pub mod remote;
pub mod wire;

pub use broker::LocalBroker;
pub use client::{ChannelHandle, RealtimeClient};
pub use envelope::{ChangeEnvelope, EventType, RawChange, RowKey};
pub use provider::{Binding, ChannelProvider, ChannelSpec, ProviderFrame};
pub use remote::{ConnectionState, RemoteProvider};

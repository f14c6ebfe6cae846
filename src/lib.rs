//! # Beam - realtime core of the Pink Beam client portal
//!
//! Live conversation feeds, typing presence and capacity-aware task
//! assignment, over a pluggable pub/sub provider and the portal REST API.
//!
//! ## Features
//!
//! - **Scoped subscriptions**: one channel per conversation, typed change events
//! - **Typing presence**: per-user expiry on receive, throttled sends
//! - **Paginated history**: cursor-based, with in-flight load suppression
//! - **Capacity guard**: advisory accept / warn / discourage for assignments
//! - **Relay server**: WebSocket provider plus HTTP ingest for development
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use beam_realtime::{ConversationFeed, LocalBroker, RealtimeClient};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = RealtimeClient::new(Arc::new(LocalBroker::new()));
//!     let mut feed = ConversationFeed::new(client)
//!         .on_new_message(|m| println!("{}: {}", m.sender_type, m.content));
//!     feed.attach(Some("conversation-1"), true);
//! }
//! ```

pub mod api;
pub mod config;
pub mod conversation;
pub mod error;
pub mod logging;
pub mod model;
pub mod realtime;
pub mod server;
pub mod workload;

// Re-export main types for library consumers
pub use api::{MessageBackend, PortalClient, WorkloadBackend};
pub use config::Config;
pub use conversation::{ConversationFeed, MessageHistory, TypingTracker};
pub use error::{PortalError, ReconnectPolicy};
pub use model::{Conversation, Message, Task, TeamMember, TypingSignal};
pub use realtime::{ChangeEnvelope, ChannelProvider, LocalBroker, RealtimeClient, RemoteProvider};
pub use workload::{AssignmentBoard, CapacityPolicy, CapacityVerdict};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

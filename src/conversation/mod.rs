//! Conversation view-models
//!
//! - [`ConversationFeed`]: live message list for one conversation
//! - [`TypingTracker`]: who else is typing, with per-user expiry
//! - [`MessageHistory`]: cursor-paginated message history
//!
//! Each instance owns its state exclusively. Two instances watching the same
//! conversation keep independent copies.

pub mod feed;
pub mod history;
pub mod typing;

pub use feed::{apply_change, Applied, ConversationFeed};
pub use history::{LoadOutcome, MessageHistory};
pub use typing::{TypingOptions, TypingTracker, TypingUser};

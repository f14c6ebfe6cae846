pub mod message;
pub mod work;

pub use message::{ContentType, Conversation, Message, Metadata, SenderType, TypingSignal};
pub use work::{Task, TaskPriority, TaskStatus, TeamMember};

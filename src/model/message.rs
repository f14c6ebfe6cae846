use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Open-ended key-value metadata attached to messages and conversations
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    #[serde(alias = "user")]
    Human,
    #[serde(alias = "ai", alias = "assistant")]
    Agent,
    System,
}

impl fmt::Display for SenderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SenderType::Human => "human",
            SenderType::Agent => "agent",
            SenderType::System => "system",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    #[serde(alias = "json", alias = "rich")]
    Structured,
}

/// One unit of conversation content, as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    /// Absent for system and agent messages
    #[serde(default)]
    pub sender_id: Option<String>,
    pub sender_type: SenderType,
    pub content: String,
    #[serde(default)]
    pub content_type: ContentType,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Message {
    /// Render order: creation time ascending, ties broken by identifier
    pub fn render_order(a: &Message, b: &Message) -> Ordering {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// A conversation owned by exactly one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Ephemeral "user is typing" broadcast payload. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    pub user_id: String,
    pub user_name: String,
    /// Sender wall-clock time
    pub timestamp: DateTime<Utc>,
}

impl TypingSignal {
    pub fn now(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_message_row_decodes_with_defaults() {
        let row = json!({
            "id": "m1",
            "conversation_id": "c1",
            "sender_type": "ai",
            "content": "Hello from the agent",
            "created_at": "2026-03-01T10:00:00Z"
        });
        let message: Message = serde_json::from_value(row).unwrap();
        assert_eq!(message.sender_type, SenderType::Agent);
        assert_eq!(message.sender_id, None);
        assert_eq!(message.content_type, ContentType::Text);
        assert!(message.metadata.is_empty());
    }

    #[test]
    fn test_render_order_breaks_ties_by_id() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let make = |id: &str| Message {
            id: id.into(),
            conversation_id: "c1".into(),
            sender_id: None,
            sender_type: SenderType::System,
            content: String::new(),
            content_type: ContentType::Text,
            created_at: at,
            metadata: Metadata::new(),
        };
        let mut list = vec![make("b"), make("a")];
        list.sort_by(Message::render_order);
        assert_eq!(list[0].id, "a");
    }

    #[test]
    fn test_typing_signal_uses_camel_case() {
        let signal = TypingSignal::now("u1", "Ada");
        let value = serde_json::to_value(&signal).unwrap();
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["userName"], "Ada");
    }
}

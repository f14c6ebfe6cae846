//! Change-feed events: the raw shape the provider delivers and the typed
//! envelope subscribers receive.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::{Conversation, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Insert,
    Update,
    Delete,
}

/// A change-data-capture event as delivered by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChange {
    pub table: String,
    pub event_type: EventType,
    #[serde(default)]
    pub new: Value,
    #[serde(default)]
    pub old: Value,
}

impl RawChange {
    pub fn insert(table: impl Into<String>, new: Value) -> Self {
        Self {
            table: table.into(),
            event_type: EventType::Insert,
            new,
            old: Value::Null,
        }
    }

    pub fn update(table: impl Into<String>, new: Value, old: Value) -> Self {
        Self {
            table: table.into(),
            event_type: EventType::Update,
            new,
            old,
        }
    }

    pub fn delete(table: impl Into<String>, old: Value) -> Self {
        Self {
            table: table.into(),
            event_type: EventType::Delete,
            new: Value::Null,
            old,
        }
    }

    /// The row image filters are evaluated against: `old` for deletes,
    /// otherwise `new` unless it is null or `{}`
    pub fn row_image(&self) -> &Value {
        let new_missing = match &self.new {
            Value::Null => true,
            Value::Object(fields) => fields.is_empty(),
            _ => false,
        };
        if self.event_type == EventType::Delete || new_missing {
            &self.old
        } else {
            &self.new
        }
    }
}

/// A table row type that can travel through the change feed
pub trait Row: DeserializeOwned + Send + 'static {
    const TABLE: &'static str;

    fn row_id(&self) -> &str;
}

impl Row for Message {
    const TABLE: &'static str = "messages";

    fn row_id(&self) -> &str {
        &self.id
    }
}

impl Row for Conversation {
    const TABLE: &'static str = "conversations";

    fn row_id(&self) -> &str {
        &self.id
    }
}

/// Primary key of a row whose full image may not be available
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowKey {
    pub id: String,
}

/// Normalized change envelope, validated at the deserialization boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEnvelope<T> {
    Insert { new: T },
    Update { new: T, old: Option<RowKey> },
    Delete { old: RowKey },
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("event for table '{actual}' delivered to a '{expected}' subscription")]
    WrongTable {
        expected: &'static str,
        actual: String,
    },

    #[error("malformed {event:?} row: {source}")]
    Malformed {
        event: EventType,
        #[source]
        source: serde_json::Error,
    },
}

impl<T: Row> ChangeEnvelope<T> {
    pub fn decode(raw: &RawChange) -> Result<Self, EnvelopeError> {
        if raw.table != T::TABLE {
            return Err(EnvelopeError::WrongTable {
                expected: T::TABLE,
                actual: raw.table.clone(),
            });
        }
        let malformed = |source| EnvelopeError::Malformed {
            event: raw.event_type,
            source,
        };

        Ok(match raw.event_type {
            EventType::Insert => ChangeEnvelope::Insert {
                new: T::deserialize(&raw.new).map_err(malformed)?,
            },
            EventType::Update => ChangeEnvelope::Update {
                new: T::deserialize(&raw.new).map_err(malformed)?,
                old: RowKey::deserialize(&raw.old).ok(),
            },
            EventType::Delete => ChangeEnvelope::Delete {
                old: RowKey::deserialize(&raw.old).map_err(malformed)?,
            },
        })
    }
}

impl<T> ChangeEnvelope<T> {
    pub fn event_type(&self) -> EventType {
        match self {
            ChangeEnvelope::Insert { .. } => EventType::Insert,
            ChangeEnvelope::Update { .. } => EventType::Update,
            ChangeEnvelope::Delete { .. } => EventType::Delete,
        }
    }

    pub fn new_row(&self) -> Option<&T> {
        match self {
            ChangeEnvelope::Insert { new } | ChangeEnvelope::Update { new, .. } => Some(new),
            ChangeEnvelope::Delete { .. } => None,
        }
    }
}

//! Frames exchanged between [`RemoteProvider`](super::remote::RemoteProvider)
//! and the relay server. JSON in text frames; CBOR is accepted in binary frames.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::provider::{Binding, ProviderFrame, SubscriptionId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// client -> relay: join a channel under a client-chosen subscription id
    Join {
        subscription: SubscriptionId,
        channel: String,
        #[serde(default)]
        bindings: Vec<Binding>,
    },
    /// client -> relay
    Leave { subscription: SubscriptionId },
    /// client -> relay: broadcast to the other subscribers of `channel`
    Broadcast {
        channel: String,
        event: String,
        payload: Value,
    },
    /// relay -> client: traffic for one of the client's subscriptions
    Frame {
        subscription: SubscriptionId,
        frame: ProviderFrame,
    },
}

impl WireMessage {
    pub fn to_text(&self) -> Result<String> {
        serde_json::to_string(self).context("encoding wire message")
    }

    pub fn from_text(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("decoding wire message")
    }

    pub fn from_binary(bytes: &[u8]) -> Result<Self> {
        serde_cbor::from_slice(bytes).context("decoding binary wire message")
    }

    pub fn to_binary(&self) -> Result<Vec<u8>> {
        serde_cbor::to_vec(self).context("encoding binary wire message")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::envelope::RawChange;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_frame_text_shape() {
        let subscription = Uuid::new_v4();
        let message = WireMessage::Frame {
            subscription,
            frame: ProviderFrame::Change(RawChange::delete("messages", json!({ "id": "m1" }))),
        };
        let value: Value = serde_json::from_str(&message.to_text().unwrap()).unwrap();
        assert_eq!(value["type"], "frame");
        assert_eq!(value["frame"]["kind"], "change");
        assert_eq!(value["frame"]["eventType"], "DELETE");
        assert_eq!(WireMessage::from_text(&value.to_string()).unwrap(), message);
    }

    #[test]
    fn test_binary_frames_decode() {
        let message = WireMessage::Broadcast {
            channel: "typing:c1".into(),
            event: "typing".into(),
            payload: json!({ "userId": "u1" }),
        };
        let bytes = message.to_binary().unwrap();
        assert_eq!(WireMessage::from_binary(&bytes).unwrap(), message);
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        assert!(WireMessage::from_text(r#"{"type":"ping"}"#).is_err());
    }
}

//! Realtime subscription client
//!
//! Turns provider channels into typed callbacks. Every subscribe call opens
//! exactly one channel and returns a [`ChannelHandle`]; the channel stays
//! live until the handle is passed to [`RealtimeClient::unsubscribe_channel`]
//! or [`RealtimeClient::unsubscribe_all_channels`] is called.
//!
//! Callbacks run on a tokio task per channel, one frame at a time. Nothing
//! here reports network failures: a dead provider shows up only as silence.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::envelope::{ChangeEnvelope, Row};
use super::provider::{Binding, ChannelProvider, ChannelSpec, ProviderFrame, SubscriptionId};
use crate::model::{Conversation, Message, TypingSignal};

/// Broadcast event name used for typing signals
pub const TYPING_EVENT: &str = "typing";

pub fn conversation_channel(conversation_id: &str) -> String {
    format!("conversation:{conversation_id}")
}

pub fn user_conversations_channel(user_id: &str) -> String {
    format!("user-conversations:{user_id}")
}

pub fn typing_channel(conversation_id: &str) -> String {
    format!("typing:{conversation_id}")
}

/// Handle to one open channel. Closing is idempotent.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    id: Uuid,
    name: String,
    closed: Arc<AtomicBool>,
}

impl ChannelHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct OpenChannel {
    name: String,
    subscription: SubscriptionId,
    closed: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

#[derive(Clone)]
pub struct RealtimeClient {
    provider: Arc<dyn ChannelProvider>,
    channels: Arc<DashMap<Uuid, OpenChannel>>,
}

impl RealtimeClient {
    pub fn new(provider: Arc<dyn ChannelProvider>) -> Self {
        Self {
            provider,
            channels: Arc::new(DashMap::new()),
        }
    }

    /// Stream message changes for one conversation.
    pub fn subscribe_to_conversation<F>(&self, conversation_id: &str, on_message: F) -> ChannelHandle
    where
        F: FnMut(ChangeEnvelope<Message>) + Send + 'static,
    {
        let spec = ChannelSpec::changes(
            conversation_channel(conversation_id),
            Binding::new(Message::TABLE, "conversation_id", conversation_id),
        );
        self.open_changes(spec, on_message)
    }

    /// Stream changes to every conversation owned by `user_id`.
    pub fn subscribe_to_user_conversations<F>(&self, user_id: &str, on_update: F) -> ChannelHandle
    where
        F: FnMut(ChangeEnvelope<Conversation>) + Send + 'static,
    {
        let spec = ChannelSpec::changes(
            user_conversations_channel(user_id),
            Binding::new(Conversation::TABLE, "user_id", user_id),
        );
        self.open_changes(spec, on_update)
    }

    /// Fire-and-forget typing broadcast. No acknowledgement, no ordering.
    pub fn send_typing_indicator(&self, conversation_id: &str, user_id: &str, user_name: &str) {
        let signal = TypingSignal::now(user_id, user_name);
        match serde_json::to_value(&signal) {
            Ok(payload) => {
                self.provider
                    .broadcast(&typing_channel(conversation_id), TYPING_EVENT, payload)
            }
            Err(err) => tracing::warn!(%err, "could not encode typing signal"),
        }
    }

    pub fn subscribe_to_typing_indicators<F>(&self, conversation_id: &str, mut on_typing: F) -> ChannelHandle
    where
        F: FnMut(TypingSignal) + Send + 'static,
    {
        let spec = ChannelSpec::broadcast(typing_channel(conversation_id));
        self.open_channel(spec, move |frame| {
            if let ProviderFrame::Broadcast { event, payload } = frame {
                if event != TYPING_EVENT {
                    return;
                }
                match serde_json::from_value::<TypingSignal>(payload) {
                    Ok(signal) => on_typing(signal),
                    Err(err) => tracing::warn!(%err, "dropping malformed typing signal"),
                }
            }
        })
    }

    /// Close one channel. Closing an already-closed handle is a no-op.
    pub fn unsubscribe_channel(&self, handle: &ChannelHandle) {
        handle.closed.store(true, Ordering::Release);
        if let Some((_, channel)) = self.channels.remove(&handle.id) {
            self.close(channel);
        }
    }

    pub fn unsubscribe_all_channels(&self) {
        let ids: Vec<Uuid> = self.channels.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, channel)) = self.channels.remove(&id) {
                channel.closed.store(true, Ordering::Release);
                self.close(channel);
            }
        }
    }

    pub fn open_channel_count(&self) -> usize {
        self.channels.len()
    }

    fn open_changes<T, F>(&self, spec: ChannelSpec, mut on_change: F) -> ChannelHandle
    where
        T: Row,
        F: FnMut(ChangeEnvelope<T>) + Send + 'static,
    {
        self.open_channel(spec, move |frame| {
            if let ProviderFrame::Change(raw) = frame {
                match ChangeEnvelope::<T>::decode(&raw) {
                    Ok(envelope) => on_change(envelope),
                    Err(err) => tracing::warn!(%err, "dropping change event"),
                }
            }
        })
    }

    fn open_channel<F>(&self, spec: ChannelSpec, mut dispatch: F) -> ChannelHandle
    where
        F: FnMut(ProviderFrame) + Send + 'static,
    {
        let name = spec.name.clone();
        let subscription = self.provider.join(spec);
        let subscription_id = subscription.id;
        let mut frames = subscription.frames;
        let closed = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn({
            let closed = closed.clone();
            async move {
                while let Some(frame) = frames.recv().await {
                    if closed.load(Ordering::Acquire) {
                        break;
                    }
                    dispatch(frame);
                }
            }
        });

        let id = Uuid::new_v4();
        tracing::info!(channel = %name, "channel opened");
        self.channels.insert(
            id,
            OpenChannel {
                name: name.clone(),
                subscription: subscription_id,
                closed: closed.clone(),
                task,
            },
        );

        ChannelHandle { id, name, closed }
    }

    fn close(&self, channel: OpenChannel) {
        channel.task.abort();
        self.provider.leave(channel.subscription);
        tracing::info!(channel = %channel.name, "channel closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::broker::LocalBroker;
    use crate::realtime::envelope::RawChange;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    fn message_row(id: &str, conversation_id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "conversation_id": conversation_id,
            "sender_id": "u1",
            "sender_type": "human",
            "content": "hello",
            "created_at": "2026-03-01T10:00:00Z"
        })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_conversation_events_are_scoped() {
        let broker = LocalBroker::new();
        let client = RealtimeClient::new(Arc::new(broker.clone()));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let handle = client.subscribe_to_conversation("c1", {
            let seen = seen.clone();
            move |envelope| seen.lock().push(envelope)
        });

        broker.publish_change(RawChange::insert("messages", message_row("m1", "c1")));
        broker.publish_change(RawChange::insert("messages", message_row("m2", "c2")));
        settle().await;

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].new_row().map(|m| m.id.as_str()), Some("m1"));
        assert_eq!(handle.name(), "conversation:c1");
    }

    #[tokio::test]
    async fn test_no_callbacks_after_unsubscribe() {
        let broker = LocalBroker::new();
        let client = RealtimeClient::new(Arc::new(broker.clone()));
        let count = Arc::new(Mutex::new(0usize));

        let handle = client.subscribe_to_conversation("c1", {
            let count = count.clone();
            move |_| *count.lock() += 1
        });

        broker.publish_change(RawChange::insert("messages", message_row("m1", "c1")));
        settle().await;
        assert_eq!(*count.lock(), 1);

        client.unsubscribe_channel(&handle);
        assert!(handle.is_closed());
        assert_eq!(client.open_channel_count(), 0);
        assert_eq!(broker.subscriber_count(), 0);

        broker.publish_change(RawChange::insert("messages", message_row("m2", "c1")));
        settle().await;
        assert_eq!(*count.lock(), 1);

        // closing twice is harmless
        client.unsubscribe_channel(&handle);
    }

    #[tokio::test]
    async fn test_malformed_events_do_not_end_the_channel() {
        let broker = LocalBroker::new();
        let client = RealtimeClient::new(Arc::new(broker.clone()));
        let count = Arc::new(Mutex::new(0usize));

        let _handle = client.subscribe_to_conversation("c1", {
            let count = count.clone();
            move |_| *count.lock() += 1
        });

        broker.publish_change(RawChange::insert(
            "messages",
            json!({ "id": "bad", "conversation_id": "c1" }),
        ));
        broker.publish_change(RawChange::insert("messages", message_row("m1", "c1")));
        settle().await;

        assert_eq!(*count.lock(), 1);
    }

    #[tokio::test]
    async fn test_typing_round_trip_and_unsubscribe_all() {
        let broker = LocalBroker::new();
        let client = RealtimeClient::new(Arc::new(broker.clone()));
        let signals = Arc::new(Mutex::new(Vec::new()));

        client.subscribe_to_typing_indicators("c1", {
            let signals = signals.clone();
            move |signal| signals.lock().push(signal)
        });
        client.subscribe_to_user_conversations("u1", |_| {});
        assert_eq!(client.open_channel_count(), 2);

        client.send_typing_indicator("c1", "u2", "Grace");
        broker.broadcast("typing:c1", "presence", json!({}));
        settle().await;

        {
            let signals = signals.lock();
            assert_eq!(signals.len(), 1);
            assert_eq!(signals[0].user_id, "u2");
            assert_eq!(signals[0].user_name, "Grace");
        }

        client.unsubscribe_all_channels();
        assert_eq!(client.open_channel_count(), 0);
        assert_eq!(broker.subscriber_count(), 0);
    }
}

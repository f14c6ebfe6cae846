use parking_lot::Mutex;
use std::sync::Arc;

use crate::api::MessageBackend;
use crate::error::PortalError;
use crate::model::{Message, Metadata};
use crate::realtime::{ChangeEnvelope, ChannelHandle, RealtimeClient};

/// What a change did to the list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Updated,
    Deleted,
    /// UPDATE or DELETE for a message not in the list
    Ignored,
}

/// Merge one change into `messages`.
///
/// INSERT appends without checking for an existing id, so a duplicated
/// INSERT yields a duplicate entry. UPDATE replaces in place and DELETE
/// removes by id; both are no-ops when the id is unknown. An UPDATE that
/// overtakes its INSERT is therefore dropped; the INSERT still arrives.
pub fn apply_change(messages: &mut Vec<Message>, change: ChangeEnvelope<Message>) -> Applied {
    match change {
        ChangeEnvelope::Insert { new } => {
            messages.push(new);
            Applied::Inserted
        }
        ChangeEnvelope::Update { new, .. } => match messages.iter_mut().find(|m| m.id == new.id) {
            Some(slot) => {
                *slot = new;
                Applied::Updated
            }
            None => Applied::Ignored,
        },
        ChangeEnvelope::Delete { old } => match messages.iter().position(|m| m.id == old.id) {
            Some(index) => {
                messages.remove(index);
                Applied::Deleted
            }
            None => Applied::Ignored,
        },
    }
}

type NewMessageHook = Arc<dyn Fn(&Message) + Send + Sync>;

/// Live message list for one conversation.
///
/// The list keeps arrival order; [`ordered`](Self::ordered) gives render order.
/// Sent messages are not appended locally, they come back through the
/// subscription.
pub struct ConversationFeed {
    client: RealtimeClient,
    messages: Arc<Mutex<Vec<Message>>>,
    on_new_message: Option<NewMessageHook>,
    conversation_id: Option<String>,
    enabled: bool,
    handle: Option<ChannelHandle>,
}

impl ConversationFeed {
    pub fn new(client: RealtimeClient) -> Self {
        Self {
            client,
            messages: Arc::new(Mutex::new(Vec::new())),
            on_new_message: None,
            conversation_id: None,
            enabled: true,
            handle: None,
        }
    }

    /// Called for every INSERT, after it is merged
    pub fn on_new_message(mut self, hook: impl Fn(&Message) + Send + Sync + 'static) -> Self {
        self.on_new_message = Some(Arc::new(hook));
        self
    }

    /// Point the feed at a conversation. The previous subscription is closed
    /// before the new one opens. Switching to another conversation clears
    /// the list; re-attaching to the same one keeps it.
    pub fn attach(&mut self, conversation_id: Option<&str>, enabled: bool) {
        let same = self.conversation_id.as_deref() == conversation_id;
        if same && self.enabled == enabled && (self.handle.is_some() || !enabled) {
            return;
        }

        self.detach();
        if !same {
            self.messages.lock().clear();
        }
        self.conversation_id = conversation_id.map(str::to_string);
        self.enabled = enabled;

        let Some(conversation_id) = conversation_id.filter(|_| enabled) else {
            return;
        };

        let messages = self.messages.clone();
        let hook = self.on_new_message.clone();
        let handle = self.client.subscribe_to_conversation(conversation_id, move |change| {
            let inserted = match &change {
                ChangeEnvelope::Insert { new } => Some(new.clone()),
                _ => None,
            };
            let applied = apply_change(&mut messages.lock(), change);
            if applied == Applied::Ignored {
                tracing::debug!("change for unknown message ignored");
            }
            if let (Some(hook), Some(message)) = (&hook, inserted) {
                hook(&message);
            }
        });
        self.handle = Some(handle);
    }

    /// Close the subscription, keeping the current list
    pub fn detach(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.client.unsubscribe_channel(&handle);
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn is_subscribed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_closed())
    }

    /// Snapshot in arrival order
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Snapshot in render order: creation time, then id
    pub fn ordered(&self) -> Vec<Message> {
        let mut messages = self.messages();
        messages.sort_by(Message::render_order);
        messages
    }

    /// Replace the list, e.g. with a page of history
    pub fn set_messages(&self, messages: Vec<Message>) {
        *self.messages.lock() = messages;
    }

    /// Send through the backend. The list is not touched; the message
    /// arrives through the subscription.
    pub async fn send_message<B: MessageBackend>(
        &self,
        backend: &B,
        content: &str,
        metadata: Option<Metadata>,
    ) -> Result<Option<Message>, PortalError> {
        let conversation_id = self
            .conversation_id
            .as_deref()
            .ok_or(PortalError::NoConversation)?;
        backend.send_message(conversation_id, content, metadata).await
    }
}

impl Drop for ConversationFeed {
    fn drop(&mut self) {
        self.detach();
    }
}

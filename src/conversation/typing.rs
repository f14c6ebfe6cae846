//! Typing presence
//!
//! Receiving side: each signal replaces the sender's previous entry and
//! restarts that sender's expiry timer. Reads filter by age again, so an
//! entry past its timeout is never returned even if its timer is late.
//!
//! Sending side: [`TypingTracker::notify_typing`] sends at most once per
//! throttle window. The throttle must stay shorter than the receive timeout
//! so a user who keeps typing never expires on other screens.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::model::TypingSignal;
use crate::realtime::{ChannelHandle, RealtimeClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingOptions {
    /// Presence lifetime measured from receipt
    pub timeout: Duration,
    /// Minimum spacing between outgoing signals
    pub throttle: Duration,
}

impl Default for TypingOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(3_000),
            throttle: Duration::from_millis(2_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingUser {
    pub user_id: String,
    pub user_name: String,
    /// Sender wall-clock time of the latest signal
    pub timestamp: DateTime<Utc>,
    received_at: Instant,
}

impl TypingUser {
    pub fn received_at(&self) -> Instant {
        self.received_at
    }
}

#[derive(Default)]
struct PresenceState {
    users: HashMap<String, TypingUser>,
    timers: HashMap<String, JoinHandle<()>>,
}

impl PresenceState {
    fn clear(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        self.users.clear();
    }
}

/// Entries younger than `timeout` at `now`, ordered by user id
pub fn visible_typing<'a>(
    users: impl IntoIterator<Item = &'a TypingUser>,
    now: Instant,
    timeout: Duration,
) -> Vec<TypingUser> {
    let mut visible: Vec<TypingUser> = users
        .into_iter()
        .filter(|u| now.saturating_duration_since(u.received_at) < timeout)
        .cloned()
        .collect();
    visible.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    visible
}

pub struct TypingTracker {
    client: RealtimeClient,
    options: TypingOptions,
    current_user_id: String,
    current_user_name: String,
    conversation_id: Option<String>,
    enabled: bool,
    state: Arc<Mutex<PresenceState>>,
    last_sent: Mutex<Option<Instant>>,
    handle: Option<ChannelHandle>,
}

impl TypingTracker {
    pub fn new(
        client: RealtimeClient,
        current_user_id: impl Into<String>,
        current_user_name: impl Into<String>,
        options: TypingOptions,
    ) -> Self {
        Self {
            client,
            options,
            current_user_id: current_user_id.into(),
            current_user_name: current_user_name.into(),
            conversation_id: None,
            enabled: true,
            state: Arc::new(Mutex::new(PresenceState::default())),
            last_sent: Mutex::new(None),
            handle: None,
        }
    }

    /// Watch typing in a conversation. Switching conversations clears all
    /// entries and timers and closes the previous subscription first.
    pub fn attach(&mut self, conversation_id: Option<&str>, enabled: bool) {
        self.detach();
        self.conversation_id = conversation_id.map(str::to_string);
        self.enabled = enabled;
        *self.last_sent.lock() = None;

        let Some(conversation_id) = conversation_id.filter(|_| enabled) else {
            return;
        };

        let state = self.state.clone();
        let self_id = self.current_user_id.clone();
        let timeout = self.options.timeout;
        let handle = self.client.subscribe_to_typing_indicators(conversation_id, move |signal| {
            if signal.user_id == self_id {
                return;
            }
            record_signal(&state, signal, timeout);
        });
        self.handle = Some(handle);
    }

    /// Close the subscription and cancel every pending expiry
    pub fn detach(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.client.unsubscribe_channel(&handle);
        }
        self.state.lock().clear();
    }

    /// Announce that the current user is typing. Sends immediately unless a
    /// signal went out within the throttle window. Returns whether one was sent.
    pub fn notify_typing(&self) -> bool {
        let attached = self.enabled && self.handle.is_some();
        let Some(conversation_id) = self.conversation_id.as_deref().filter(|_| attached) else {
            return false;
        };

        let now = Instant::now();
        {
            let mut last_sent = self.last_sent.lock();
            if let Some(sent) = *last_sent {
                if now.saturating_duration_since(sent) < self.options.throttle {
                    return false;
                }
            }
            *last_sent = Some(now);
        }

        self.client
            .send_typing_indicator(conversation_id, &self.current_user_id, &self.current_user_name);
        true
    }

    /// Users currently typing, excluding the current user
    pub fn typing_users(&self) -> Vec<TypingUser> {
        let state = self.state.lock();
        visible_typing(state.users.values(), Instant::now(), self.options.timeout)
    }

    pub fn pending_timers(&self) -> usize {
        self.state.lock().timers.len()
    }
}

impl Drop for TypingTracker {
    fn drop(&mut self) {
        self.detach();
    }
}

fn record_signal(state: &Arc<Mutex<PresenceState>>, signal: TypingSignal, timeout: Duration) {
    let received_at = Instant::now();
    let user_id = signal.user_id.clone();

    let mut guard = state.lock();
    if let Some(previous) = guard.timers.remove(&user_id) {
        previous.abort();
    }
    guard.users.insert(
        user_id.clone(),
        TypingUser {
            user_id: signal.user_id,
            user_name: signal.user_name,
            timestamp: signal.timestamp,
            received_at,
        },
    );

    let timer = tokio::spawn({
        let state = state.clone();
        let user_id = user_id.clone();
        async move {
            tokio::time::sleep(timeout).await;
            let mut guard = state.lock();
            // A newer signal may have landed after this timer was due
            let expired = guard
                .users
                .get(&user_id)
                .is_some_and(|u| u.received_at == received_at);
            if expired {
                guard.users.remove(&user_id);
                guard.timers.remove(&user_id);
            }
        }
    });
    guard.timers.insert(user_id, timer);
}

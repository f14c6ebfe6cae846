//! Cursor-paginated message history.
//!
//! Pages are fetched backwards: the oldest loaded message id is the cursor
//! for the next page. A page shorter than the page size means the start of
//! the conversation was reached.

use parking_lot::Mutex;

use crate::api::{HistoryQuery, MessageBackend};
use crate::error::PortalError;
use crate::model::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page was fetched and merged
    Loaded { count: usize },
    /// Another load was in flight
    Busy,
    /// Nothing to do: no conversation, empty list or no more history
    Skipped,
    /// The conversation changed while the page was in flight
    Stale,
}

struct HistoryState {
    conversation_id: Option<String>,
    messages: Vec<Message>,
    has_more: bool,
    is_loading: bool,
    last_error: Option<String>,
    // bumped on conversation switch so late pages are discarded
    generation: u64,
}

pub struct MessageHistory<B> {
    backend: B,
    page_size: usize,
    state: Mutex<HistoryState>,
}

impl<B: MessageBackend> MessageHistory<B> {
    pub fn new(backend: B, page_size: usize) -> Self {
        Self {
            backend,
            page_size: page_size.max(1),
            state: Mutex::new(HistoryState {
                conversation_id: None,
                messages: Vec::new(),
                has_more: true,
                is_loading: false,
                last_error: None,
                generation: 0,
            }),
        }
    }

    /// Switch conversations: reset the list and load the newest page
    pub async fn set_conversation(&self, conversation_id: Option<&str>) -> Result<LoadOutcome, PortalError> {
        {
            let mut state = self.state.lock();
            state.conversation_id = conversation_id.map(str::to_string);
            state.messages.clear();
            state.has_more = true;
            state.is_loading = false;
            state.last_error = None;
            state.generation += 1;
        }
        self.load_messages(None).await
    }

    /// Fetch one page. With `before`, the page is prepended (older history);
    /// without it, the page replaces the list.
    pub async fn load_messages(&self, before: Option<&str>) -> Result<LoadOutcome, PortalError> {
        let (conversation_id, generation) = {
            let mut state = self.state.lock();
            let Some(conversation_id) = state.conversation_id.clone() else {
                return Ok(LoadOutcome::Skipped);
            };
            if state.is_loading {
                return Ok(LoadOutcome::Busy);
            }
            state.is_loading = true;
            (conversation_id, state.generation)
        };

        let query = HistoryQuery {
            limit: self.page_size,
            before: before.map(str::to_string),
        };
        let result = self.backend.fetch_messages(&conversation_id, &query).await;

        let mut state = self.state.lock();
        if state.generation != generation {
            return Ok(LoadOutcome::Stale);
        }
        state.is_loading = false;

        match result {
            Ok(page) => {
                let count = page.len();
                state.has_more = count == self.page_size;
                state.last_error = None;
                if before.is_some() {
                    let older = std::mem::take(&mut state.messages);
                    state.messages = page;
                    state.messages.extend(older);
                } else {
                    state.messages = page;
                }
                tracing::debug!(conversation = %conversation_id, count, has_more = state.has_more, "history page loaded");
                Ok(LoadOutcome::Loaded { count })
            }
            Err(err) => {
                tracing::warn!(conversation = %conversation_id, %err, "history load failed");
                state.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Load the page before the oldest loaded message
    pub async fn load_more(&self) -> Result<LoadOutcome, PortalError> {
        let cursor = {
            let state = self.state.lock();
            if !state.has_more || state.is_loading {
                return Ok(LoadOutcome::Skipped);
            }
            match state.messages.first() {
                Some(oldest) => oldest.id.clone(),
                None => return Ok(LoadOutcome::Skipped),
            }
        };
        self.load_messages(Some(&cursor)).await
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().messages.clone()
    }

    pub fn has_more(&self) -> bool {
        self.state.lock().has_more
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().is_loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.state.lock().conversation_id.clone()
    }
}

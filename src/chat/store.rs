use crate::types::ChatMessage;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

pub const GREETING: &str = "Привет! Я Gemini, твой AI асистент. Чем я могу помочь вам сегодня?";

/// Owned copy of the conversation, handed to renderers.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationSnapshot {
    pub messages: Vec<ChatMessage>,
    pub awaiting_response: bool,
}

#[derive(Default)]
struct State {
    messages: Vec<ChatMessage>,
    outstanding: usize,
}

/// Append-only conversation plus the "assistant is responding" flag.
///
/// Every change bumps a revision on a watch channel; subscribers re-render and scroll.
pub struct ConversationStore {
    state: Mutex<State>,
    revision: watch::Sender<u64>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    /// Start a conversation seeded with the assistant greeting.
    pub fn new() -> Self {
        Self::with_messages(vec![ChatMessage::assistant(GREETING)])
    }

    pub fn with_messages(messages: Vec<ChatMessage>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: Mutex::new(State {
                messages,
                outstanding: 0,
            }),
            revision,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    pub fn append(&self, message: ChatMessage) {
        self.lock().messages.push(message);
        self.notify();
    }

    /// `true` registers one more outstanding response, `false` releases one.
    /// The flag stays raised until every outstanding response is released.
    pub fn set_awaiting(&self, awaiting: bool) {
        {
            let mut state = self.lock();
            if awaiting {
                state.outstanding += 1;
            } else {
                state.outstanding = state.outstanding.saturating_sub(1);
            }
        }
        self.notify();
    }

    pub fn is_awaiting(&self) -> bool {
        self.lock().outstanding > 0
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        let state = self.lock();
        ConversationSnapshot {
            messages: state.messages.clone(),
            awaiting_response: state.outstanding > 0,
        }
    }

    /// Messages from `start` onwards; empty when `start` is past the end.
    pub fn messages_since(&self, start: usize) -> Vec<ChatMessage> {
        self.lock()
            .messages
            .get(start..)
            .map(<[ChatMessage]>::to_vec)
            .unwrap_or_default()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

/// Holds one outstanding-response reference on a store; released on drop,
/// whichever way the owning flow exits.
pub struct AwaitingGuard {
    store: Arc<ConversationStore>,
}

impl AwaitingGuard {
    pub fn acquire(store: Arc<ConversationStore>) -> Self {
        store.set_awaiting(true);
        Self { store }
    }
}

impl Drop for AwaitingGuard {
    fn drop(&mut self) {
        self.store.set_awaiting(false);
    }
}

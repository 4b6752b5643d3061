//! In-memory message store shared between the engine and consumers

use crate::error::ChatError;
use crate::models::ChatMessage;
use log::error;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct StoreInner {
    messages: Vec<ChatMessage>,
    epoch: u64,
}

/// Ordered, append-only sequence of chat messages.
///
/// Only the most recently appended message can be mutated, and only
/// through [`MessageStore::update_last`]. Clearing the store bumps an
/// epoch counter so that an in-flight turn can detect that its target
/// message is gone and abandon itself silently.
///
/// The handle is cheap to clone; all clones share the same sequence.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    inner: Arc<Mutex<StoreInner>>,
}

/// Partial update merged into the most recent message
#[derive(Debug, Clone, Default)]
pub struct MessageUpdate {
    pub content: Option<String>,
    pub thinking: Option<String>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with previously persisted history.
    pub fn with_history(messages: Vec<ChatMessage>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner { messages, epoch: 0 })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A poisoned lock only means another thread panicked mid-write;
        // the data itself is still a valid message list.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends a message at the end, preserving insertion order.
    pub fn append(&self, message: ChatMessage) {
        self.lock().messages.push(message);
    }

    /// Merges the given fields into the last message.
    ///
    /// Calling this on an empty store is a logic error on the caller's
    /// side and is reported rather than ignored.
    pub fn update_last(&self, update: MessageUpdate) -> Result<(), ChatError> {
        let mut inner = self.lock();
        match inner.messages.last_mut() {
            Some(last) => {
                if let Some(content) = update.content {
                    last.content = content;
                }
                if let Some(thinking) = update.thinking {
                    last.thinking = thinking;
                }
                Ok(())
            }
            None => {
                let err = ChatError::Logic("update_last called on an empty store".to_string());
                error!("{}", err);
                Err(err)
            }
        }
    }

    /// Empties the sequence and invalidates any in-flight turn.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.messages.clear();
        inner.epoch += 1;
    }

    /// Current epoch; changes whenever the store is cleared.
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }

    /// Snapshot of all messages in insertion order.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().messages.clone()
    }

    /// Snapshot of the most recent message, if any.
    pub fn last(&self) -> Option<ChatMessage> {
        self.lock().messages.last().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use pretty_assertions::assert_eq;

    #[test]
    fn append_preserves_order() {
        let store = MessageStore::new();
        store.append(ChatMessage::new(Role::User, "one"));
        store.append(ChatMessage::new(Role::Assistant, "two"));
        let messages = store.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "one");
        assert_eq!(messages[1].content, "two");
    }

    #[test]
    fn update_last_merges_only_given_fields() {
        let store = MessageStore::new();
        store.append(ChatMessage::new(Role::Assistant, ""));
        store
            .update_last(MessageUpdate {
                thinking: Some("hmm".to_string()),
                ..MessageUpdate::default()
            })
            .expect("update");
        store
            .update_last(MessageUpdate {
                content: Some("answer".to_string()),
                ..MessageUpdate::default()
            })
            .expect("update");

        let last = store.last().expect("last");
        assert_eq!(last.thinking, "hmm");
        assert_eq!(last.content, "answer");
    }

    #[test]
    fn update_last_only_touches_the_last_message() {
        let store = MessageStore::new();
        store.append(ChatMessage::new(Role::User, "question"));
        store.append(ChatMessage::new(Role::Assistant, ""));
        store
            .update_last(MessageUpdate {
                content: Some("answer".to_string()),
                ..MessageUpdate::default()
            })
            .expect("update");
        assert_eq!(store.messages()[0].content, "question");
    }

    #[test]
    fn update_last_on_empty_store_is_a_logic_error() {
        let store = MessageStore::new();
        let err = store.update_last(MessageUpdate::default()).unwrap_err();
        assert!(matches!(err, ChatError::Logic(_)));
    }

    #[test]
    fn clear_empties_and_bumps_epoch() {
        let store = MessageStore::new();
        store.append(ChatMessage::new(Role::User, "hi"));
        let before = store.epoch();
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.epoch(), before + 1);
    }

    #[test]
    fn clones_share_state() {
        let store = MessageStore::new();
        let other = store.clone();
        store.append(ChatMessage::new(Role::User, "hi"));
        assert_eq!(other.len(), 1);
        other.clear();
        assert!(store.is_empty());
    }
}

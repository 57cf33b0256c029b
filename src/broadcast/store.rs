use std::collections::HashSet;

use super::message::Message;

/// Every message this node has learned. Grows, never shrinks.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: HashSet<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        MessageStore {
            messages: HashSet::new(),
        }
    }

    /// Returns true iff `message` was not known before.
    pub fn insert(&mut self, message: Message) -> bool {
        self.messages.insert(message)
    }

    /// Copy of the current contents, in no particular order.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.iter().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

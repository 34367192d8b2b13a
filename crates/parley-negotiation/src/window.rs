//! Bounded per-agent conversation context

use std::collections::VecDeque;

use parley_llm::Message;
use serde::{Deserialize, Serialize};

/// Who produced an entry, from the owning agent's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryRole {
    Own,
    Counterpart,
    Instruction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowEntry {
    pub role: EntryRole,
    pub content: String,
}

impl WindowEntry {
    fn to_message(&self) -> Message {
        match self.role {
            EntryRole::Own => Message::assistant(self.content.clone()),
            EntryRole::Counterpart | EntryRole::Instruction => Message::user(self.content.clone()),
        }
    }
}

/// FIFO window holding at most `capacity` entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextWindow {
    entries: VecDeque<WindowEntry>,
    capacity: usize,
}

impl ContextWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest entry when full
    pub fn push(&mut self, role: EntryRole, content: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(WindowEntry {
            role,
            content: content.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entries(&self) -> impl Iterator<Item = &WindowEntry> {
        self.entries.iter()
    }

    /// Role-tagged messages, oldest first
    pub fn to_messages(&self) -> Vec<Message> {
        self.entries.iter().map(WindowEntry::to_message).collect()
    }
}

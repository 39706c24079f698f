#![forbid(unsafe_code)]

use std::collections::VecDeque;

use duochat_domain::{ChatMessage, MessageId};

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Bounded, insertion-ordered message history.
#[derive(Debug)]
pub struct MessageStore {
	messages: VecDeque<ChatMessage>,
	capacity: usize,
}

impl Default for MessageStore {
	fn default() -> Self {
		Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
	}
}

impl MessageStore {
	/// A zero capacity is raised to one.
	pub fn with_capacity(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		Self {
			messages: VecDeque::with_capacity(capacity),
			capacity,
		}
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn len(&self) -> usize {
		self.messages.len()
	}

	pub fn is_empty(&self) -> bool {
		self.messages.is_empty()
	}

	/// Push to the tail, returning whatever fell off the head.
	pub fn append(&mut self, message: ChatMessage) -> Vec<ChatMessage> {
		self.messages.push_back(message);

		let mut evicted = Vec::new();
		while self.messages.len() > self.capacity {
			if let Some(old) = self.messages.pop_front() {
				evicted.push(old);
			}
		}
		evicted
	}

	/// Remove the first message with `id`.
	pub fn remove(&mut self, id: MessageId) -> bool {
		let Some(pos) = self.messages.iter().position(|m| m.id == id) else {
			return false;
		};
		self.messages.remove(pos);
		true
	}

	pub fn contains(&self, id: MessageId) -> bool {
		self.messages.iter().any(|m| m.id == id)
	}

	/// Oldest first.
	pub fn snapshot(&self) -> Vec<ChatMessage> {
		self.messages.iter().cloned().collect()
	}
}

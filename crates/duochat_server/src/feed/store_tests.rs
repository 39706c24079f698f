#![forbid(unsafe_code)]

use duochat_domain::{ChatMessage, ChatUser, MessageId, Platform};
use proptest::prelude::*;

use crate::feed::store::MessageStore;

fn msg(n: usize) -> ChatMessage {
	ChatMessage {
		id: MessageId::new_v4(),
		text: format!("message {n}"),
		user: ChatUser::new(format!("user{n}")),
		timestamp_ms: n as i64,
		source: Platform::Twitch,
		fragments: Vec::new(),
		badges: Vec::new(),
	}
}

#[test]
fn default_capacity_is_one_hundred() {
	let store = MessageStore::default();
	assert_eq!(store.capacity(), 100);
	assert!(store.is_empty());
}

#[test]
fn append_evicts_oldest_past_capacity() {
	let mut store = MessageStore::with_capacity(3);
	let first = msg(0);
	let first_id = first.id;

	assert!(store.append(first).is_empty());
	assert!(store.append(msg(1)).is_empty());
	assert!(store.append(msg(2)).is_empty());

	let evicted = store.append(msg(3));
	assert_eq!(evicted.len(), 1);
	assert_eq!(evicted[0].id, first_id);
	assert_eq!(store.len(), 3);

	let texts: Vec<String> = store.snapshot().into_iter().map(|m| m.text).collect();
	assert_eq!(texts, vec!["message 1", "message 2", "message 3"]);
}

#[test]
fn remove_is_true_once_then_false() {
	let mut store = MessageStore::default();
	let m = msg(0);
	let id = m.id;
	store.append(m);
	store.append(msg(1));

	assert!(store.remove(id));
	assert!(!store.remove(id));
	assert!(!store.contains(id));
	assert_eq!(store.len(), 1);
}

#[test]
fn remove_unknown_id_leaves_store_untouched() {
	let mut store = MessageStore::default();
	store.append(msg(0));
	assert!(!store.remove(MessageId::new_v4()));
	assert_eq!(store.len(), 1);
}

#[test]
fn zero_capacity_keeps_latest_message() {
	let mut store = MessageStore::with_capacity(0);
	store.append(msg(0));
	store.append(msg(1));
	assert_eq!(store.snapshot().len(), 1);
	assert_eq!(store.snapshot()[0].text, "message 1");
}

proptest! {
	#[test]
	fn capacity_holds_and_order_is_preserved(capacity in 1usize..20, count in 0usize..80) {
		let mut store = MessageStore::with_capacity(capacity);
		let mut evicted_total = 0usize;

		for n in 0..count {
			evicted_total += store.append(msg(n)).len();
			prop_assert!(store.len() <= capacity);
		}

		prop_assert_eq!(evicted_total, count.saturating_sub(capacity));

		let stamps: Vec<i64> = store.snapshot().iter().map(|m| m.timestamp_ms).collect();
		let expected: Vec<i64> = (count.saturating_sub(capacity)..count).map(|n| n as i64).collect();
		prop_assert_eq!(stamps, expected);
	}
}

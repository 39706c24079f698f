#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use duochat_domain::{ChatMessage, ChatUser, MessageId, Platform};
use tokio::time::timeout;

use crate::feed::hub::{FeedHub, FeedItem};

fn item(text: &str) -> FeedItem {
	FeedItem::Message(Arc::new(ChatMessage {
		id: MessageId::new_v4(),
		text: text.to_string(),
		user: ChatUser::new("user"),
		timestamp_ms: 0,
		source: Platform::YouTube,
		fragments: Vec::new(),
		badges: Vec::new(),
	}))
}

#[tokio::test]
async fn every_subscriber_receives_published_items() {
	let mut hub = FeedHub::new(8);
	let mut a = hub.subscribe();
	let mut b = hub.subscribe();

	assert_eq!(hub.publish(item("hello")), 0);

	for rx in [&mut a, &mut b] {
		let got = timeout(Duration::from_millis(250), rx.recv())
			.await
			.expect("item within timeout")
			.expect("channel open");
		match got {
			FeedItem::Message(m) => assert_eq!(m.text, "hello"),
			other => panic!("expected message, got {other:?}"),
		}
	}
}

#[tokio::test]
async fn full_queue_reports_lag_before_queued_items() {
	let mut hub = FeedHub::new(1);
	let mut rx = hub.subscribe();

	assert_eq!(hub.publish(item("m1")), 0);
	assert_eq!(hub.publish(item("m2")), 1);
	assert_eq!(hub.publish(item("m3")), 1);

	match rx.recv().await.expect("lag marker") {
		FeedItem::Lagged { dropped } => assert_eq!(dropped, 2),
		other => panic!("expected lag marker, got {other:?}"),
	}
	match rx.recv().await.expect("m1") {
		FeedItem::Message(m) => assert_eq!(m.text, "m1"),
		other => panic!("expected m1, got {other:?}"),
	}
	assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn lag_is_reported_without_further_traffic() {
	let mut hub = FeedHub::new(4);
	let mut rx = hub.subscribe();
	for n in 0..4 {
		hub.publish(item(&format!("x{n}")));
	}
	assert_eq!(hub.publish(item("last")), 1);

	// Nothing is published after the drop; the subscriber still learns about it.
	let lagged = timeout(Duration::from_millis(250), rx.recv())
		.await
		.expect("item within timeout")
		.expect("channel open");
	assert!(matches!(lagged, FeedItem::Lagged { dropped: 1 }));

	for _ in 0..4 {
		assert!(matches!(rx.try_recv(), Ok(FeedItem::Message(_))));
	}
	assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn lag_count_resets_once_reported() {
	let mut hub = FeedHub::new(1);
	let mut rx = hub.subscribe();
	hub.publish(item("a"));
	hub.publish(item("b"));

	assert!(matches!(rx.try_recv(), Ok(FeedItem::Lagged { dropped: 1 })));
	assert!(matches!(rx.try_recv(), Ok(FeedItem::Message(_))));

	hub.publish(item("c"));
	match rx.try_recv() {
		Ok(FeedItem::Message(m)) => assert_eq!(m.text, "c"),
		other => panic!("expected c, got {other:?}"),
	}
}

#[tokio::test]
async fn closed_subscribers_are_pruned() {
	let mut hub = FeedHub::new(4);
	let rx = hub.subscribe();
	let _keep = hub.subscribe();
	assert_eq!(hub.subscriber_count(), 2);

	drop(rx);
	hub.publish(FeedItem::Removed(MessageId::new_v4()));
	assert_eq!(hub.subscriber_count(), 1);
}

#[tokio::test]
async fn publish_without_subscribers_is_a_no_op() {
	let mut hub = FeedHub::default();
	assert_eq!(hub.publish(item("nobody")), 0);
	assert_eq!(hub.subscriber_count(), 0);
}

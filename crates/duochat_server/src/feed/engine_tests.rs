#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::time::Duration;

use duochat_domain::{
	BadgeRef, BadgeSet, BadgeVersion, CheermoteSet, CheermoteTier, Fragment, MessageId, Platform, Rank, RawChatEvent,
	RawExtra, RawUser,
};
use tokio::time::timeout;

use crate::feed::sanitize::TrimSanitizer;
use crate::feed::{AggregationEngine, FeedConfig, FeedItem, FeedRx};

fn engine() -> AggregationEngine {
	AggregationEngine::new(FeedConfig::default())
}

fn raw(username: &str, text: &str) -> RawChatEvent {
	RawChatEvent::text(Platform::Twitch, username, text)
}

async fn next_item(rx: &mut FeedRx) -> FeedItem {
	timeout(Duration::from_millis(250), rx.recv())
		.await
		.expect("item within timeout")
		.expect("feed open")
}

#[tokio::test]
async fn first_message_is_committed_with_first_rank() {
	let engine = engine();
	let msg = engine.ingest(raw("alice", "hi")).await.expect("committed");

	assert_eq!(msg.text, "hi");
	assert_eq!(msg.user.username, "alice");
	assert_eq!(msg.user.rank, Some(Rank::First));
	assert_eq!(msg.source, Platform::Twitch);
	assert!(msg.timestamp_ms > 0);

	let snapshot = engine.snapshot().await;
	assert_eq!(snapshot.len(), 1);
	assert_eq!(snapshot[0].id, msg.id);
}

#[tokio::test]
async fn empty_or_absent_text_is_dropped_without_side_effects() {
	let engine = engine();
	engine.ingest(raw("alice", "hi")).await.expect("committed");

	assert!(engine.ingest(raw("bob", "")).await.is_none());

	let mut absent = raw("carol", "x");
	absent.message = None;
	assert!(engine.ingest(absent).await.is_none());

	assert!(engine.ingest(raw("dave", "<script>x</script>  ")).await.is_none());

	assert_eq!(engine.snapshot().await.len(), 1);

	// No rank was consumed by the dropped events.
	let next = engine.ingest(raw("erin", "hello")).await.expect("committed");
	assert_eq!(next.user.rank, Some(Rank::Second));
}

#[tokio::test]
async fn text_is_sanitized_before_commit() {
	let engine = engine();
	let msg = engine
		.ingest(raw("alice", "  <b>bold</b> move <script>steal()</script> "))
		.await
		.expect("committed");
	assert_eq!(msg.text, "bold move");
}

#[tokio::test]
async fn custom_sanitizer_is_used() {
	let engine = AggregationEngine::with_sanitizer(FeedConfig::default(), TrimSanitizer);
	let msg = engine.ingest(raw("alice", " <b>x</b> ")).await.expect("committed");
	assert_eq!(msg.text, "<b>x</b>");
}

#[tokio::test]
async fn history_keeps_latest_hundred() {
	let engine = engine();
	let first = engine.ingest(raw("u0", "m0")).await.expect("committed");
	for n in 1..101 {
		engine.ingest(raw(&format!("u{n}"), &format!("m{n}"))).await.expect("committed");
	}

	let snapshot = engine.snapshot().await;
	assert_eq!(snapshot.len(), 100);
	assert!(snapshot.iter().all(|m| m.id != first.id));
	assert_eq!(snapshot.first().map(|m| m.text.as_str()), Some("m1"));
	assert_eq!(snapshot.last().map(|m| m.text.as_str()), Some("m100"));
}

#[tokio::test]
async fn ranks_survive_deletion_and_exhaust_after_three_users() {
	let engine = engine();
	let a = engine.ingest(raw("alice", "1")).await.expect("committed");
	engine.ingest(raw("bob", "2")).await.expect("committed");
	engine.ingest(raw("carol", "3")).await.expect("committed");

	assert!(engine.delete_message(a.id).await);

	let d = engine.ingest(raw("dave", "4")).await.expect("committed");
	assert_eq!(d.user.rank, None);

	let again = engine.ingest(raw("alice", "5")).await.expect("committed");
	assert_eq!(again.user.rank, Some(Rank::First));
}

#[tokio::test]
async fn moderator_and_streamer_flags_follow_the_event() {
	let engine = engine();
	let mut ev = raw("owner", "welcome");
	ev.source = Platform::YouTube;
	ev.user = RawUser {
		username: "owner".to_string(),
		is_mod: true,
		is_streamer: true,
	};
	let msg = engine.ingest(ev).await.expect("committed");
	assert!(msg.user.is_moderator);
	assert!(msg.user.is_streamer);
	assert_eq!(msg.source, Platform::YouTube);

	let plain = engine.ingest(raw("viewer", "hi")).await.expect("committed");
	assert!(!plain.user.is_moderator);
	assert!(!plain.user.is_streamer);
}

#[tokio::test]
async fn cheermotes_and_badges_are_enriched_once_loaded() {
	let engine = engine();

	let ev = RawChatEvent {
		user: RawUser {
			username: "cheerer".to_string(),
			..RawUser::default()
		},
		source: Platform::Twitch,
		message: Some("Cheer250 nice".to_string()),
		extra: RawExtra {
			fragments: vec![Fragment::cheermote("Cheer250", "Cheer", 250), Fragment::text(" nice")],
			badges: vec![
				BadgeRef {
					set_id: "subscriber".to_string(),
					id: "0".to_string(),
				},
				BadgeRef {
					set_id: "unknown".to_string(),
					id: "1".to_string(),
				},
			],
		},
	};

	let before = engine.ingest(ev.clone()).await.expect("committed");
	assert!(matches!(&before.fragments[0], Fragment::Cheermote { text, resolved: None, .. } if text == "Cheer250"));
	assert!(before.badges.iter().all(|b| b.data.is_none()));

	engine.load_cheermotes(vec![CheermoteSet {
		prefix: "cheer".to_string(),
		tiers: [1u64, 100, 1000]
			.into_iter()
			.map(|min_bits| CheermoteTier {
				id: min_bits.to_string(),
				min_bits,
				..CheermoteTier::default()
			})
			.collect(),
	}]);
	engine.load_badges(
		vec![BadgeSet {
			set_id: "subscriber".to_string(),
			versions: vec![BadgeVersion {
				id: "0".to_string(),
				title: "Subscriber".to_string(),
				..BadgeVersion::default()
			}],
		}],
		Vec::new(),
	);

	let after = engine.ingest(ev).await.expect("committed");
	match &after.fragments[0] {
		Fragment::Cheermote { text, resolved, cheermote } => {
			assert_eq!(text, "Cheer100");
			assert_eq!(cheermote.bits, 250);
			assert_eq!(resolved.as_ref().map(|t| t.min_bits), Some(100));
		}
		other => panic!("expected cheermote, got {other:?}"),
	}
	assert_eq!(after.fragments[1], Fragment::text(" nice"));
	assert_eq!(
		after.badges[0].data.as_ref().map(|d| d.title.as_str()),
		Some("Subscriber")
	);
	assert!(after.badges[1].data.is_none());
	assert_eq!(after.badges[1].set_id, "unknown");
}

#[tokio::test]
async fn deletion_is_idempotent_and_broadcast_once() {
	let engine = engine();
	let msg = engine.ingest(raw("alice", "oops")).await.expect("committed");
	let (_, mut rx) = engine.subscribe().await;

	assert!(engine.delete_message(msg.id).await);
	assert!(!engine.delete_message(msg.id).await);
	assert!(!engine.delete_message(MessageId::new_v4()).await);

	match next_item(&mut rx).await {
		FeedItem::Removed(id) => assert_eq!(id, msg.id),
		other => panic!("expected removal, got {other:?}"),
	}
	assert!(rx.try_recv().is_err(), "unknown ids must not broadcast");
	assert!(engine.snapshot().await.is_empty());
}

#[tokio::test]
async fn subscribers_get_commits_after_their_snapshot() {
	let engine = engine();
	engine.ingest(raw("alice", "before")).await.expect("committed");

	let (snapshot, mut rx) = engine.subscribe().await;
	assert_eq!(snapshot.len(), 1);
	assert_eq!(snapshot[0].text, "before");

	let committed = engine.ingest(raw("bob", "after")).await.expect("committed");
	match next_item(&mut rx).await {
		FeedItem::Message(m) => assert_eq!(m.id, committed.id),
		other => panic!("expected message, got {other:?}"),
	}
	assert_eq!(engine.subscriber_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ingest_and_subscribe_never_duplicate_or_lose() {
	let engine = AggregationEngine::new(FeedConfig {
		history_capacity: 1_000,
		subscriber_queue_capacity: 1_000,
	});

	let mut producers = Vec::new();
	for p in 0..4 {
		let engine = engine.clone();
		producers.push(tokio::spawn(async move {
			for n in 0..50 {
				engine
					.ingest(raw(&format!("p{p}"), &format!("{p}-{n}")))
					.await
					.expect("committed");
			}
		}));
	}

	tokio::task::yield_now().await;
	let (snapshot, mut rx) = engine.subscribe().await;

	for p in producers {
		p.await.expect("producer");
	}

	let mut seen: HashSet<MessageId> = snapshot.iter().map(|m| m.id).collect();
	assert_eq!(seen.len(), snapshot.len());
	while let Ok(item) = rx.try_recv() {
		if let FeedItem::Message(m) = item {
			assert!(seen.insert(m.id), "message delivered twice");
		}
	}

	let all = engine.snapshot().await;
	assert_eq!(all.len(), 200);
	assert!(all.iter().all(|m| seen.contains(&m.id)));
}

#[tokio::test]
async fn configured_capacity_is_reported() {
	let engine = AggregationEngine::new(FeedConfig {
		history_capacity: 5,
		..FeedConfig::default()
	});
	assert_eq!(engine.history_capacity(), 5);
}

#![forbid(unsafe_code)]

use std::sync::Arc;

use duochat_domain::{
	Badge, BadgeRef, BadgeSet, ChatMessage, ChatUser, CheermoteSet, Fragment, MessageId, RawChatEvent,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::enrichment::EnrichmentCache;
use super::hub::{DEFAULT_SUBSCRIBER_QUEUE_CAPACITY, FeedHub, FeedItem, FeedRx};
use super::rank::RankAssigner;
use super::sanitize::{HtmlSanitizer, Sanitizer};
use super::store::{DEFAULT_HISTORY_CAPACITY, MessageStore};
use crate::util::time::unix_ms_now;

/// Feed sizing.
#[derive(Debug, Clone)]
pub struct FeedConfig {
	pub history_capacity: usize,
	pub subscriber_queue_capacity: usize,
}

impl Default for FeedConfig {
	fn default() -> Self {
		Self {
			history_capacity: DEFAULT_HISTORY_CAPACITY,
			subscriber_queue_capacity: DEFAULT_SUBSCRIBER_QUEUE_CAPACITY,
		}
	}
}

/// Owns the feed: ranks, enrichment tables, history and subscribers.
///
/// Cloning is cheap; every clone drives the same feed. Sanitizing, ranking and enrichment happen before the
/// commit lock is taken, so concurrent sources commit in the order they finish.
#[derive(Clone)]
pub struct AggregationEngine {
	inner: Arc<EngineInner>,
}

struct EngineInner {
	sanitizer: Box<dyn Sanitizer>,
	ranks: Mutex<RankAssigner>,
	enrichment: RwLock<EnrichmentCache>,
	committed: tokio::sync::Mutex<Committed>,
	history_capacity: usize,
}

/// Store and hub share one lock so a snapshot plus subscription never misses or repeats a commit.
struct Committed {
	store: MessageStore,
	hub: FeedHub,
}

impl AggregationEngine {
	pub fn new(cfg: FeedConfig) -> Self {
		Self::with_sanitizer(cfg, HtmlSanitizer::new())
	}

	pub fn with_sanitizer(cfg: FeedConfig, sanitizer: impl Sanitizer) -> Self {
		let store = MessageStore::with_capacity(cfg.history_capacity);
		let history_capacity = store.capacity();
		Self {
			inner: Arc::new(EngineInner {
				sanitizer: Box::new(sanitizer),
				ranks: Mutex::new(RankAssigner::new()),
				enrichment: RwLock::new(EnrichmentCache::new()),
				committed: tokio::sync::Mutex::new(Committed {
					store,
					hub: FeedHub::new(cfg.subscriber_queue_capacity),
				}),
				history_capacity,
			}),
		}
	}

	pub fn history_capacity(&self) -> usize {
		self.inner.history_capacity
	}

	/// Turn a raw event into a committed, broadcast message.
	///
	/// Returns `None` without touching any state when the text is absent or empty after sanitizing.
	pub async fn ingest(&self, raw: RawChatEvent) -> Option<ChatMessage> {
		let platform = raw.source;

		let Some(text) = raw.message.as_deref().filter(|t| !t.is_empty()) else {
			metrics::counter!("duochat_server_feed_rejected_total", "reason" => "empty").increment(1);
			return None;
		};

		let text = self.inner.sanitizer.sanitize(text);
		if text.is_empty() {
			metrics::counter!("duochat_server_feed_rejected_total", "reason" => "sanitized_empty").increment(1);
			debug!(%platform, username = %raw.user.username, "message empty after sanitizing; dropped");
			return None;
		}

		let timestamp_ms = unix_ms_now();
		let rank = self.inner.ranks.lock().assign_or_lookup(&raw.user.username);

		let (fragments, badges) = {
			let cache = self.inner.enrichment.read();
			(
				enrich_fragments(&cache, raw.extra.fragments),
				resolve_badges(&cache, raw.extra.badges),
			)
		};

		let message = ChatMessage {
			id: MessageId::new_v4(),
			text,
			user: ChatUser {
				username: raw.user.username,
				rank,
				is_moderator: raw.user.is_mod,
				is_streamer: raw.user.is_streamer,
			},
			timestamp_ms,
			source: platform,
			fragments,
			badges,
		};

		self.commit(message.clone()).await;
		metrics::counter!("duochat_server_feed_ingested_total", "platform" => platform.as_str()).increment(1);
		debug!(
			%platform,
			message_id = %message.id,
			username = %message.user.username,
			rank = ?message.user.rank,
			"message committed"
		);

		Some(message)
	}

	async fn commit(&self, message: ChatMessage) {
		let mut committed = self.inner.committed.lock().await;

		for old in committed.store.append(message.clone()) {
			metrics::counter!("duochat_server_feed_evictions_total").increment(1);
			warn!(
				message_id = %old.id,
				username = %old.user.username,
				capacity = committed.store.capacity(),
				"history full; evicted oldest message"
			);
		}

		committed.hub.publish(FeedItem::Message(Arc::new(message)));
	}

	/// Remove a message and tell every subscriber. Unknown ids change nothing.
	pub async fn delete_message(&self, id: MessageId) -> bool {
		let mut committed = self.inner.committed.lock().await;
		if !committed.store.remove(id) {
			debug!(message_id = %id, "delete requested for unknown message");
			return false;
		}

		committed.hub.publish(FeedItem::Removed(id));
		metrics::counter!("duochat_server_feed_deleted_total").increment(1);
		info!(message_id = %id, "message deleted");
		true
	}

	/// Oldest first.
	pub async fn snapshot(&self) -> Vec<ChatMessage> {
		self.inner.committed.lock().await.store.snapshot()
	}

	/// History and a live receiver taken together; the receiver sees exactly the commits after the snapshot.
	pub async fn subscribe(&self) -> (Vec<ChatMessage>, FeedRx) {
		let mut committed = self.inner.committed.lock().await;
		let snapshot = committed.store.snapshot();
		let rx = committed.hub.subscribe();
		(snapshot, rx)
	}

	pub async fn subscriber_count(&self) -> usize {
		self.inner.committed.lock().await.hub.subscriber_count()
	}

	pub fn load_badges(&self, channel: Vec<BadgeSet>, global: Vec<BadgeSet>) {
		let (channel_sets, global_sets) = (channel.len(), global.len());
		self.inner.enrichment.write().load_badges(channel, global);
		info!(channel_sets, global_sets, "badge table loaded");
	}

	pub fn load_cheermotes(&self, sets: Vec<CheermoteSet>) {
		let count = sets.len();
		self.inner.enrichment.write().load_cheermote_tiers(sets);
		info!(sets = count, "cheermote table loaded");
	}
}

fn enrich_fragments(cache: &EnrichmentCache, fragments: Vec<Fragment>) -> Vec<Fragment> {
	fragments
		.into_iter()
		.map(|fragment| match fragment {
			Fragment::Cheermote {
				text, cheermote, ..
			} => match cache.resolve_cheermote(&cheermote.prefix, cheermote.bits) {
				Some(tier) => Fragment::Cheermote {
					text: format!("{}{}", cheermote.prefix, tier.min_bits),
					cheermote,
					resolved: Some(tier),
				},
				None => Fragment::Cheermote {
					text,
					cheermote,
					resolved: None,
				},
			},
			other => other,
		})
		.collect()
}

fn resolve_badges(cache: &EnrichmentCache, refs: Vec<BadgeRef>) -> Vec<Badge> {
	refs.into_iter()
		.map(|r| {
			let data = cache.lookup_badge(&r.set_id, &r.id);
			Badge {
				set_id: r.set_id,
				id: r.id,
				data,
			}
		})
		.collect()
}

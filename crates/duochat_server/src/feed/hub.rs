#![forbid(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use duochat_domain::{ChatMessage, MessageId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tracing::debug;

pub const DEFAULT_SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

/// Items delivered to feed subscribers.
#[derive(Debug, Clone)]
pub enum FeedItem {
	Message(Arc<ChatMessage>),

	Removed(MessageId),

	/// The subscriber fell behind and `dropped` items never reached it.
	Lagged {
		dropped: u64,
	},
}

/// Receiving half of a feed subscription.
///
/// Items lost to a full queue are counted on the side; the count is handed out as a `Lagged` item before anything
/// else, so a subscriber learns it fell behind even when no further traffic arrives.
#[derive(Debug)]
pub struct FeedRx {
	rx: mpsc::Receiver<FeedItem>,
	lag: Arc<AtomicU64>,
}

impl FeedRx {
	fn take_lag(&self) -> Option<FeedItem> {
		match self.lag.swap(0, Ordering::AcqRel) {
			0 => None,
			dropped => Some(FeedItem::Lagged { dropped }),
		}
	}

	/// `None` once the hub is gone.
	pub async fn recv(&mut self) -> Option<FeedItem> {
		if let Some(lagged) = self.take_lag() {
			return Some(lagged);
		}
		self.rx.recv().await
	}

	pub fn try_recv(&mut self) -> Result<FeedItem, TryRecvError> {
		match self.take_lag() {
			Some(lagged) => Ok(lagged),
			None => self.rx.try_recv(),
		}
	}
}

#[derive(Debug)]
struct Subscriber {
	tx: mpsc::Sender<FeedItem>,
	lag: Arc<AtomicU64>,
}

/// Fan-out to connected clients.
///
/// Publishing never waits: a full subscriber queue loses the item and the loss is added to that subscriber's lag
/// count. Closed subscribers are pruned on every publish.
#[derive(Debug)]
pub struct FeedHub {
	queue_capacity: usize,
	subscribers: Vec<Subscriber>,
}

impl FeedHub {
	pub fn new(queue_capacity: usize) -> Self {
		Self {
			queue_capacity: queue_capacity.max(1),
			subscribers: Vec::new(),
		}
	}

	pub fn subscribe(&mut self) -> FeedRx {
		let (tx, rx) = mpsc::channel(self.queue_capacity);
		let lag = Arc::new(AtomicU64::new(0));
		self.prune_closed();
		self.subscribers.push(Subscriber {
			tx,
			lag: Arc::clone(&lag),
		});
		FeedRx { rx, lag }
	}

	/// Returns the number of subscribers that missed this item.
	pub fn publish(&mut self, item: FeedItem) -> u64 {
		self.prune_closed();

		let mut dropped_total: u64 = 0;
		for sub in &self.subscribers {
			match sub.tx.try_send(item.clone()) {
				Ok(()) | Err(TrySendError::Closed(_)) => {}
				Err(TrySendError::Full(_)) => {
					dropped_total += 1;
					sub.lag.fetch_add(1, Ordering::AcqRel);
				}
			}
		}

		if dropped_total > 0 {
			metrics::counter!("duochat_server_feed_lagged_total").increment(dropped_total);
			debug!(dropped = dropped_total, "feed hub: dropped due to full subscriber queues");
		}
		dropped_total
	}

	pub fn subscriber_count(&self) -> usize {
		self.subscribers.iter().filter(|s| !s.tx.is_closed()).count()
	}

	fn prune_closed(&mut self) {
		self.subscribers.retain(|s| !s.tx.is_closed());
	}
}

impl Default for FeedHub {
	fn default() -> Self {
		Self::new(DEFAULT_SUBSCRIBER_QUEUE_CAPACITY)
	}
}

#![forbid(unsafe_code)]

pub mod twitch;
pub mod youtube;

use std::fmt;
use std::time::{Duration, SystemTime};

use anyhow::anyhow;
use duochat_domain::{BadgeSet, CheermoteSet, Platform, RawChatEvent};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Server → adapter control message.
#[derive(Debug)]
pub enum AdapterControl {
	/// Request a graceful shutdown.
	Shutdown,
}

/// Adapter → server event message.
#[derive(Debug, Clone)]
pub enum AdapterEvent {
	/// A chat message ready for the feed.
	Chat(Box<RawChatEvent>),

	/// Metadata tables fetched after the source authenticated.
	Enrichment(EnrichmentLoad),

	/// Adapter status update.
	Status(AdapterStatus),
}

/// Metadata handed to the enrichment cache.
#[derive(Debug, Clone)]
pub enum EnrichmentLoad {
	Badges {
		channel: Vec<BadgeSet>,
		global: Vec<BadgeSet>,
	},
	Cheermotes(Vec<CheermoteSet>),
}

/// Adapter status event.
#[derive(Debug, Clone)]
pub struct AdapterStatus {
	pub platform: Platform,
	pub connected: bool,
	pub detail: String,
	pub last_error: Option<String>,
	pub time: SystemTime,
}

/// Wrapper that redacts in logs.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
	pub fn new(s: impl Into<String>) -> Self {
		Self(s.into())
	}

	/// Access the inner secret string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.trim().is_empty()
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SecretString(<redacted>)")
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("<redacted>")
	}
}

impl<'de> serde::Deserialize<'de> for SecretString {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Ok(SecretString::new(s))
	}
}

pub type AdapterControlTx = mpsc::Sender<AdapterControl>;
pub type AdapterControlRx = mpsc::Receiver<AdapterControl>;
pub type AdapterEventTx = mpsc::Sender<AdapterEvent>;
pub type AdapterEventRx = mpsc::Receiver<AdapterEvent>;

/// A runnable chat source.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync + 'static {
	fn platform(&self) -> Platform;

	/// Run until shutdown or a fatal bootstrap error.
	///
	/// Bootstrap failures are reported as a status event and end the adapter; they never stop the process.
	async fn run(self: Box<Self>, control_rx: AdapterControlRx, events_tx: AdapterEventTx) -> anyhow::Result<()>;
}

/// Build a standard bounded channel pair.
pub fn bounded_adapter_channels(
	control_capacity: usize,
	events_capacity: usize,
) -> (AdapterControlTx, AdapterControlRx, AdapterEventTx, AdapterEventRx) {
	let (control_tx, control_rx) = mpsc::channel(control_capacity);
	let (events_tx, events_rx) = mpsc::channel(events_capacity);
	(control_tx, control_rx, events_tx, events_rx)
}

/// Build a status event.
pub fn status(platform: Platform, connected: bool, detail: impl Into<String>) -> AdapterEvent {
	AdapterEvent::Status(AdapterStatus {
		platform,
		connected,
		detail: detail.into(),
		last_error: None,
		time: SystemTime::now(),
	})
}

/// Build an error status event.
pub fn status_error(platform: Platform, detail: impl Into<String>, err: impl fmt::Display) -> AdapterEvent {
	AdapterEvent::Status(AdapterStatus {
		platform,
		connected: false,
		detail: detail.into(),
		last_error: Some(err.to_string()),
		time: SystemTime::now(),
	})
}

/// Generate an opaque session id.
pub fn new_session_id() -> String {
	Uuid::new_v4().to_string()
}

/// Exponential backoff clamped to `[min, max]`. Attempt 1 waits `min`, each later attempt doubles it.
pub fn backoff_delay(attempt: u32, min: Duration, max: Duration) -> Duration {
	let pow = attempt.saturating_sub(1).min(16);
	let ms = min.as_millis().saturating_mul(1u128 << pow);
	let d = Duration::from_millis(ms.min(u64::MAX as u128) as u64);
	d.min(max).max(min)
}

/// Forward an event without blocking the adapter's socket loop.
///
/// Returns false when the server side is full or gone; the drop is counted.
pub fn try_emit(events_tx: &AdapterEventTx, ev: AdapterEvent) -> bool {
	match events_tx.try_send(ev) {
		Ok(()) => true,
		Err(_) => {
			metrics::counter!("duochat_platform_events_dropped_total").increment(1);
			false
		}
	}
}

/// Forward an event the server must not miss, waiting for queue room.
///
/// Returns false only when the server side is gone.
pub async fn emit(events_tx: &AdapterEventTx, ev: AdapterEvent) -> bool {
	if events_tx.send(ev).await.is_err() {
		metrics::counter!("duochat_platform_events_dropped_total").increment(1);
		return false;
	}
	true
}

/// Validate basic chat event invariants.
pub fn validate_chat_event(ev: &RawChatEvent) -> anyhow::Result<()> {
	if ev.user.username.trim().is_empty() {
		return Err(anyhow!("chat event username must be non-empty"));
	}
	Ok(())
}

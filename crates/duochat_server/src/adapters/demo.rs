#![forbid(unsafe_code)]

use std::time::Duration;

use async_trait::async_trait;
use duochat_domain::{
	BadgeRef, BadgeSet, BadgeVersion, CheermoteSet, CheermoteTier, Fragment, Platform, RawChatEvent, RawExtra, RawUser,
};
use duochat_platform::{
	AdapterControl, AdapterControlRx, AdapterEvent, AdapterEventTx, EnrichmentLoad, SourceAdapter, emit,
	new_session_id, status, try_emit,
};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info};

const USERS: &[&str] = &["DemoAlice", "DemoBob", "DemoCarol", "DemoDave"];

/// Synthetic chat source for local runs without credentials.
pub struct DemoAdapter {
	emit_interval: Duration,
}

impl Default for DemoAdapter {
	fn default() -> Self {
		Self::new()
	}
}

impl DemoAdapter {
	pub fn new() -> Self {
		Self {
			emit_interval: Duration::from_millis(750),
		}
	}

	pub fn with_emit_interval(mut self, interval: Duration) -> Self {
		self.emit_interval = interval;
		self
	}

	fn enrichment() -> [AdapterEvent; 2] {
		let cheer = CheermoteSet {
			prefix: "Cheer".to_string(),
			tiers: [(1u64, "#979797"), (100, "#9c3ee8"), (1000, "#1db2a5")]
				.into_iter()
				.map(|(min_bits, color)| CheermoteTier {
					id: min_bits.to_string(),
					min_bits,
					color: color.to_string(),
					can_cheer: true,
					images: Vec::new(),
				})
				.collect(),
		};

		let subscriber = BadgeSet {
			set_id: "subscriber".to_string(),
			versions: vec![BadgeVersion {
				id: "0".to_string(),
				title: "Demo Subscriber".to_string(),
				description: "Subscribed to the demo channel".to_string(),
				..BadgeVersion::default()
			}],
		};

		[
			AdapterEvent::Enrichment(EnrichmentLoad::Cheermotes(vec![cheer])),
			AdapterEvent::Enrichment(EnrichmentLoad::Badges {
				channel: vec![subscriber],
				global: Vec::new(),
			}),
		]
	}

	/// Every third message cheers; YouTube and Twitch alternate.
	fn make_event(n: u64) -> RawChatEvent {
		let username = USERS[(n as usize) % USERS.len()];
		let source = if n % 2 == 0 { Platform::Twitch } else { Platform::YouTube };

		let (message, fragments, badges) = if source == Platform::Twitch && n % 3 == 0 {
			let bits = 50 * (n % 25 + 1);
			let cheer = format!("Cheer{bits}");
			let text = format!("{cheer} demo message #{n}");
			(
				text,
				vec![Fragment::cheermote(cheer, "Cheer", bits), Fragment::text(format!(" demo message #{n}"))],
				vec![BadgeRef {
					set_id: "subscriber".to_string(),
					id: "0".to_string(),
				}],
			)
		} else {
			let text = format!("demo message #{n}");
			(text.clone(), vec![Fragment::text(text)], Vec::new())
		};

		RawChatEvent {
			user: RawUser {
				username: username.to_string(),
				is_mod: username == "DemoBob",
				is_streamer: username == "DemoAlice",
			},
			source,
			message: Some(message),
			extra: RawExtra { fragments, badges },
		}
	}
}

#[async_trait]
impl SourceAdapter for DemoAdapter {
	fn platform(&self) -> Platform {
		Platform::Twitch
	}

	async fn run(self: Box<Self>, mut control_rx: AdapterControlRx, events_tx: AdapterEventTx) -> anyhow::Result<()> {
		let platform = self.platform();
		let session_id = new_session_id();

		try_emit(&events_tx, status(platform, true, format!("demo adapter online (session_id={session_id})")));
		for ev in Self::enrichment() {
			emit(&events_tx, ev).await;
		}

		let mut interval: Interval = tokio::time::interval(self.emit_interval);
		interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

		info!(%platform, %session_id, "demo adapter started");
		debug!(%platform, interval_ms = self.emit_interval.as_millis(), "demo adapter tick interval configured");

		let mut tick: u64 = 0;
		loop {
			tokio::select! {
				_ = interval.tick() => {
					if !try_emit(&events_tx, AdapterEvent::Chat(Box::new(Self::make_event(tick)))) {
						debug!(%platform, "demo adapter events channel full; dropped message");
					}
					tick += 1;
				}

				cmd = control_rx.recv() => {
					match cmd {
						Some(AdapterControl::Shutdown) => info!(%platform, "demo adapter received Shutdown"),
						None => info!(%platform, "demo adapter control channel closed; shutting down"),
					}
					break;
				}
			}
		}

		try_emit(&events_tx, status(platform, false, "demo adapter offline"));
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn events_alternate_sources_and_cheer_on_twitch() {
		let first = DemoAdapter::make_event(0);
		assert_eq!(first.source, Platform::Twitch);
		assert!(matches!(first.extra.fragments[0], Fragment::Cheermote { .. }));
		assert_eq!(first.extra.badges.len(), 1);

		let second = DemoAdapter::make_event(1);
		assert_eq!(second.source, Platform::YouTube);
		assert_eq!(second.extra.fragments, vec![Fragment::text("demo message #1")]);
	}

	#[test]
	fn every_event_carries_text() {
		for n in 0..12 {
			let ev = DemoAdapter::make_event(n);
			assert!(ev.message.as_deref().is_some_and(|m| !m.is_empty()));
			assert!(!ev.user.username.is_empty());
		}
	}
}

#![forbid(unsafe_code)]

use std::time::Duration;

use duochat_domain::Platform;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::api::{Poll, YouTubeClient};
use crate::{
	AdapterControl, AdapterControlRx, AdapterEvent, AdapterEventTx, SecretString, SourceAdapter, backoff_delay,
	status, status_error, try_emit,
};

/// YouTube live chat adapter configuration.
#[derive(Clone, Debug)]
pub struct YouTubeConfig {
	pub api_key: SecretString,
	/// Channel searched by name; the first hit is used.
	pub channel_name: String,
	pub api_base_url: String,
	pub min_poll_interval: Duration,
	pub retry_min_delay: Duration,
	pub retry_max_delay: Duration,
}

impl YouTubeConfig {
	pub fn new(api_key: SecretString, channel_name: impl Into<String>) -> Self {
		Self {
			api_key,
			channel_name: channel_name.into(),
			api_base_url: "https://www.googleapis.com/youtube/v3".to_string(),
			min_poll_interval: Duration::from_secs(2),
			retry_min_delay: Duration::from_secs(1),
			retry_max_delay: Duration::from_secs(60),
		}
	}
}

/// Polls the live chat of a channel's current broadcast.
pub struct YouTubeLiveChatAdapter {
	cfg: YouTubeConfig,
}

struct LiveChat {
	owner_channel_id: String,
	live_chat_id: String,
}

impl YouTubeLiveChatAdapter {
	pub fn new(cfg: YouTubeConfig) -> Self {
		Self { cfg }
	}

	/// Resolve channel → live video → chat id. `Ok(Err(reason))` means the source cannot start.
	async fn locate_chat(&self, client: &YouTubeClient) -> anyhow::Result<Result<LiveChat, String>> {
		let Some(channel) = client.find_channel(&self.cfg.channel_name).await? else {
			return Ok(Err(format!("channel not found: {}", self.cfg.channel_name)));
		};
		info!(channel = %channel.title, channel_id = %channel.id, "youtube channel found");

		let Some(video) = client.find_live_video(&channel.id).await? else {
			return Ok(Err("no live stream found".to_string()));
		};

		let Some(live_chat_id) = client.active_live_chat_id(&video.id).await? else {
			return Ok(Err("no live chat available".to_string()));
		};
		info!(title = %video.title, video_id = %video.id, "youtube stream found");

		Ok(Ok(LiveChat {
			owner_channel_id: channel.id,
			live_chat_id,
		}))
	}

	/// Sleep for `delay`, returning false if shutdown was requested meanwhile.
	async fn wait(control_rx: &mut AdapterControlRx, delay: Duration) -> bool {
		tokio::select! {
			_ = sleep(delay) => true,
			cmd = control_rx.recv() => !matches!(cmd, Some(AdapterControl::Shutdown) | None),
		}
	}

	async fn run_loop(self, mut control_rx: AdapterControlRx, events_tx: AdapterEventTx) -> anyhow::Result<()> {
		let platform = Platform::YouTube;
		try_emit(&events_tx, status(platform, false, "youtube adapter starting"));

		let client = match YouTubeClient::new(&self.cfg.api_base_url, self.cfg.api_key.clone()) {
			Ok(c) => c,
			Err(e) => {
				try_emit(&events_tx, status_error(platform, "invalid youtube configuration", &e));
				return Ok(());
			}
		};

		let chat = match self.locate_chat(&client).await {
			Ok(Ok(chat)) => chat,
			Ok(Err(reason)) => {
				try_emit(
					&events_tx,
					status_error(platform, "youtube chat won't be connected", &reason),
				);
				return Ok(());
			}
			Err(e) => {
				try_emit(
					&events_tx,
					status_error(platform, "youtube lookup failed; chat won't be connected", &e),
				);
				return Ok(());
			}
		};

		try_emit(&events_tx, status(platform, true, "youtube live chat connected"));

		let mut page_token: Option<String> = None;
		let mut backlog = true;
		let mut failures: u32 = 0;

		loop {
			let delay = match client.poll_messages(&chat.live_chat_id, page_token.as_deref()).await {
				Ok(Poll::Page(page)) => {
					failures = 0;
					if backlog {
						debug!(skipped = page.items.len(), "skipping youtube chat backlog");
						backlog = false;
					} else {
						for ev in page.chat_events(&chat.owner_channel_id) {
							try_emit(&events_tx, AdapterEvent::Chat(Box::new(ev)));
						}
					}
					if page.next_page_token.is_some() {
						page_token = page.next_page_token.clone();
					}
					page.poll_delay(self.cfg.min_poll_interval)
				}
				Ok(Poll::Ended(reason)) => {
					try_emit(&events_tx, status_error(platform, "youtube live chat ended", &reason));
					return Ok(());
				}
				Err(e) => {
					failures = failures.saturating_add(1);
					warn!(error = %e, failures, "youtube poll failed");
					backoff_delay(failures, self.cfg.retry_min_delay, self.cfg.retry_max_delay)
				}
			};

			if !Self::wait(&mut control_rx, delay).await {
				info!(%platform, "youtube adapter received Shutdown");
				break;
			}
		}

		try_emit(&events_tx, status(platform, false, "youtube adapter stopped"));
		Ok(())
	}
}

#[async_trait::async_trait]
impl SourceAdapter for YouTubeLiveChatAdapter {
	fn platform(&self) -> Platform {
		Platform::YouTube
	}

	async fn run(self: Box<Self>, control_rx: AdapterControlRx, events_tx: AdapterEventTx) -> anyhow::Result<()> {
		self.run_loop(control_rx, events_tx).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn shutdown_interrupts_wait() {
		let (ctl_tx, mut ctl_rx, _ev_tx, _ev_rx) = crate::bounded_adapter_channels(1, 1);
		ctl_tx.send(AdapterControl::Shutdown).await.expect("send");
		assert!(!YouTubeLiveChatAdapter::wait(&mut ctl_rx, Duration::from_secs(30)).await);
	}

	#[tokio::test]
	async fn unreachable_api_ends_adapter_with_status() {
		let mut cfg = YouTubeConfig::new(SecretString::new("k"), "someone");
		cfg.api_base_url = "http://127.0.0.1:9/youtube/v3".to_string();

		let (_ctl_tx, ctl_rx, ev_tx, mut ev_rx) = crate::bounded_adapter_channels(1, 8);
		Box::new(YouTubeLiveChatAdapter::new(cfg))
			.run(ctl_rx, ev_tx)
			.await
			.expect("adapter returns Ok");

		let mut last_error = None;
		while let Ok(ev) = ev_rx.try_recv() {
			if let AdapterEvent::Status(s) = ev
				&& s.last_error.is_some()
			{
				last_error = s.last_error;
			}
		}
		assert!(last_error.is_some());
	}
}

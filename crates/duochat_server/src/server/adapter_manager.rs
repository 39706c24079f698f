#![forbid(unsafe_code)]

use std::time::Duration;

use duochat_domain::Platform;
use duochat_platform::{
	AdapterControl, AdapterEvent, AdapterStatus, EnrichmentLoad, SourceAdapter, bounded_adapter_channels,
	validate_chat_event,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::feed::AggregationEngine;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Adapter manager configuration.
#[derive(Debug, Clone)]
pub struct AdapterManagerConfig {
	pub control_channel_capacity: usize,
	pub adapter_events_channel_capacity: usize,
}

impl Default for AdapterManagerConfig {
	fn default() -> Self {
		Self {
			control_channel_capacity: 8,
			adapter_events_channel_capacity: 4_096,
		}
	}
}

struct RunningAdapter {
	platform: Platform,
	control_tx: mpsc::Sender<AdapterControl>,
	shutdown_tx: Option<oneshot::Sender<()>>,
	adapter_task: JoinHandle<()>,
	forwarder_task: JoinHandle<()>,
}

/// Runs every source adapter and feeds its events into the engine.
pub struct AdapterManager {
	adapters: Vec<RunningAdapter>,
}

impl AdapterManager {
	pub fn start(engine: AggregationEngine, adapters: Vec<Box<dyn SourceAdapter>>, cfg: AdapterManagerConfig) -> Self {
		let adapters = adapters
			.into_iter()
			.map(|adapter| {
				let platform = adapter.platform();
				let (control_tx, control_rx, events_tx, events_rx) =
					bounded_adapter_channels(cfg.control_channel_capacity, cfg.adapter_events_channel_capacity);

				let adapter_task = tokio::spawn(async move {
					if let Err(e) = adapter.run(control_rx, events_tx).await {
						warn!(%platform, error = %e, "source adapter exited with error");
					}
				});

				let (shutdown_tx, shutdown_rx) = oneshot::channel();
				let forwarder_task = tokio::spawn(forward_events(platform, engine.clone(), events_rx, shutdown_rx));

				info!(%platform, "source adapter started");
				RunningAdapter {
					platform,
					control_tx,
					shutdown_tx: Some(shutdown_tx),
					adapter_task,
					forwarder_task,
				}
			})
			.collect();

		Self { adapters }
	}

	pub fn len(&self) -> usize {
		self.adapters.len()
	}

	pub fn is_empty(&self) -> bool {
		self.adapters.is_empty()
	}

	/// Ask every adapter to stop, then wait for adapters and forwarders to finish.
	pub async fn shutdown(mut self) {
		for running in &mut self.adapters {
			if running.control_tx.send(AdapterControl::Shutdown).await.is_err() {
				debug!(platform = %running.platform, "adapter already stopped");
			}
		}

		for mut running in self.adapters.drain(..) {
			let platform = running.platform;
			if timeout(SHUTDOWN_GRACE, &mut running.adapter_task).await.is_err() {
				warn!(%platform, "adapter ignored Shutdown; aborting");
				running.adapter_task.abort();
			}

			// A stopped adapter closes its events channel, so the forwarder drains and exits on its own.
			if timeout(SHUTDOWN_GRACE, &mut running.forwarder_task).await.is_err() {
				if let Some(tx) = running.shutdown_tx.take() {
					let _ = tx.send(());
				}
				let _ = running.forwarder_task.await;
			}
			debug!(%platform, "adapter stopped");
		}
	}
}

async fn forward_events(
	platform: Platform,
	engine: AggregationEngine,
	mut events_rx: mpsc::Receiver<AdapterEvent>,
	mut shutdown_rx: oneshot::Receiver<()>,
) {
	loop {
		tokio::select! {
			ev = events_rx.recv() => {
				let Some(ev) = ev else {
					debug!(%platform, "adapter events channel closed; forwarder exiting");
					break;
				};
				handle_event(platform, &engine, ev).await;
			}

			_ = &mut shutdown_rx => {
				debug!(%platform, "adapter forwarder observed shutdown");
				break;
			}
		}
	}
}

async fn handle_event(platform: Platform, engine: &AggregationEngine, ev: AdapterEvent) {
	match ev {
		AdapterEvent::Chat(raw) => {
			if let Err(e) = validate_chat_event(&raw) {
				metrics::counter!("duochat_server_feed_rejected_total", "reason" => "invalid").increment(1);
				warn!(%platform, error = %e, "dropping invalid chat event");
				return;
			}
			engine.ingest(*raw).await;
		}
		AdapterEvent::Enrichment(EnrichmentLoad::Badges { channel, global }) => {
			engine.load_badges(channel, global);
		}
		AdapterEvent::Enrichment(EnrichmentLoad::Cheermotes(sets)) => {
			engine.load_cheermotes(sets);
		}
		AdapterEvent::Status(st) => record_status(&st),
	}
}

fn record_status(st: &AdapterStatus) {
	metrics::counter!(
		"duochat_server_adapter_status_total",
		"platform" => st.platform.as_str(),
		"connected" => if st.connected { "true" } else { "false" }
	)
	.increment(1);

	match &st.last_error {
		Some(err) => warn!(
			platform = %st.platform,
			connected = st.connected,
			detail = %st.detail,
			error = %err,
			"adapter status"
		),
		None => info!(
			platform = %st.platform,
			connected = st.connected,
			detail = %st.detail,
			"adapter status"
		),
	}
}

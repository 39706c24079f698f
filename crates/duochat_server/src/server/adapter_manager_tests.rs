#![forbid(unsafe_code)]

use std::time::Duration;

use duochat_domain::{CheermoteSet, CheermoteTier, Fragment, Platform, RawChatEvent};
use duochat_platform::{
	AdapterControl, AdapterControlRx, AdapterEvent, AdapterEventTx, EnrichmentLoad, SourceAdapter, status,
};
use tokio::time::timeout;

use crate::adapters::DemoAdapter;
use crate::feed::{AggregationEngine, FeedConfig, FeedItem, FeedRx};
use crate::server::adapter_manager::{AdapterManager, AdapterManagerConfig};

/// Emits a fixed script, then idles until told to stop.
struct ScriptedAdapter {
	script: Vec<AdapterEvent>,
}

#[async_trait::async_trait]
impl SourceAdapter for ScriptedAdapter {
	fn platform(&self) -> Platform {
		Platform::Twitch
	}

	async fn run(self: Box<Self>, mut control_rx: AdapterControlRx, events_tx: AdapterEventTx) -> anyhow::Result<()> {
		for ev in self.script {
			events_tx.send(ev).await?;
		}
		while let Some(cmd) = control_rx.recv().await {
			match cmd {
				AdapterControl::Shutdown => break,
			}
		}
		Ok(())
	}
}

/// Never reacts to Shutdown.
struct StubbornAdapter;

#[async_trait::async_trait]
impl SourceAdapter for StubbornAdapter {
	fn platform(&self) -> Platform {
		Platform::YouTube
	}

	async fn run(self: Box<Self>, _control_rx: AdapterControlRx, _events_tx: AdapterEventTx) -> anyhow::Result<()> {
		std::future::pending::<()>().await;
		Ok(())
	}
}

async fn next_message(rx: &mut FeedRx) -> duochat_domain::ChatMessage {
	loop {
		let item = timeout(Duration::from_secs(2), rx.recv())
			.await
			.expect("feed item within timeout")
			.expect("feed open");
		if let FeedItem::Message(m) = item {
			return (*m).clone();
		}
	}
}

fn cheer_set() -> CheermoteSet {
	CheermoteSet {
		prefix: "Cheer".to_string(),
		tiers: [1u64, 100]
			.into_iter()
			.map(|min_bits| CheermoteTier {
				id: min_bits.to_string(),
				min_bits,
				..CheermoteTier::default()
			})
			.collect(),
	}
}

#[tokio::test]
async fn scripted_events_reach_the_engine_in_order() {
	let engine = AggregationEngine::new(FeedConfig::default());
	let (_, mut rx) = engine.subscribe().await;

	let mut cheer = RawChatEvent::text(Platform::Twitch, "alice", "Cheer150 nice");
	cheer.extra.fragments = vec![Fragment::cheermote("Cheer150", "Cheer", 150), Fragment::text(" nice")];

	let script = vec![
		status(Platform::Twitch, true, "connected"),
		AdapterEvent::Enrichment(EnrichmentLoad::Cheermotes(vec![cheer_set()])),
		AdapterEvent::Chat(Box::new(RawChatEvent::text(Platform::Twitch, "   ", "ghost"))),
		AdapterEvent::Chat(Box::new(cheer)),
	];

	let manager = AdapterManager::start(
		engine.clone(),
		vec![Box::new(ScriptedAdapter { script })],
		AdapterManagerConfig::default(),
	);
	assert_eq!(manager.len(), 1);

	let msg = next_message(&mut rx).await;
	assert_eq!(msg.user.username, "alice");
	match &msg.fragments[0] {
		Fragment::Cheermote { text, resolved, .. } => {
			assert_eq!(text, "Cheer100");
			assert_eq!(resolved.as_ref().map(|t| t.min_bits), Some(100));
		}
		other => panic!("expected cheermote, got {other:?}"),
	}

	timeout(Duration::from_secs(2), manager.shutdown())
		.await
		.expect("shutdown completes");

	let history = engine.snapshot().await;
	assert_eq!(history.len(), 1, "blank username never reaches the feed");
}

#[tokio::test]
async fn demo_adapter_feeds_messages_until_shutdown() {
	let engine = AggregationEngine::new(FeedConfig::default());
	let (_, mut rx) = engine.subscribe().await;

	let demo = DemoAdapter::new().with_emit_interval(Duration::from_millis(10));
	let manager = AdapterManager::start(engine.clone(), vec![Box::new(demo)], AdapterManagerConfig::default());

	let first = next_message(&mut rx).await;
	assert_eq!(first.source, Platform::Twitch);
	assert!(
		matches!(&first.fragments[0], Fragment::Cheermote { resolved: Some(_), .. }),
		"demo enrichment loads before the first cheer"
	);
	assert_eq!(first.badges[0].data.as_ref().map(|b| b.title.as_str()), Some("Demo Subscriber"));

	let second = next_message(&mut rx).await;
	assert_eq!(second.source, Platform::YouTube);

	timeout(Duration::from_secs(2), manager.shutdown())
		.await
		.expect("shutdown completes");

	let settled = engine.snapshot().await.len();
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(engine.snapshot().await.len(), settled, "no messages after shutdown");
}

#[tokio::test(start_paused = true)]
async fn unresponsive_adapter_is_aborted_after_grace() {
	let engine = AggregationEngine::new(FeedConfig::default());
	let manager = AdapterManager::start(engine, vec![Box::new(StubbornAdapter)], AdapterManagerConfig::default());

	timeout(Duration::from_secs(30), manager.shutdown())
		.await
		.expect("shutdown gives up on the adapter");
}

#[tokio::test]
async fn empty_manager_shuts_down_immediately() {
	let engine = AggregationEngine::new(FeedConfig::default());
	let manager = AdapterManager::start(engine, Vec::new(), AdapterManagerConfig::default());
	assert!(manager.is_empty());
	manager.shutdown().await;
}

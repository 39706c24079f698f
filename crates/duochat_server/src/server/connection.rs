#![forbid(unsafe_code)]

use std::time::Duration;

use anyhow::{Context as _, anyhow};
use duochat_domain::{ChatMessage, MessageId, RawChatEvent};
use duochat_platform::validate_chat_event;
use duochat_protocol::convert::{self, envelope};
use duochat_protocol::version::{PROTOCOL_MAJOR, PROTOCOL_VERSION, major};
use duochat_protocol::{DEFAULT_MAX_FRAME_SIZE, FrameDecoder, FramingError, encode_frame, pb};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::feed::{AggregationEngine, FeedItem, FeedRx};

const FLUSH_GRACE: Duration = Duration::from_secs(1);

/// Per-connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
	pub server_name: String,
	pub max_frame_size: usize,
	/// How long a client may take to send Hello.
	pub hello_timeout: Duration,
}

impl Default for ConnectionSettings {
	fn default() -> Self {
		Self {
			server_name: "duochat".to_string(),
			max_frame_size: DEFAULT_MAX_FRAME_SIZE,
			hello_timeout: Duration::from_secs(10),
		}
	}
}

struct ConnectionGaugeGuard;

impl ConnectionGaugeGuard {
	fn new() -> Self {
		metrics::gauge!("duochat_server_connections_active").increment(1.0);
		Self
	}
}

impl Drop for ConnectionGaugeGuard {
	fn drop(&mut self) {
		metrics::gauge!("duochat_server_connections_active").decrement(1.0);
	}
}

/// Decode envelopes from `recv` on a background task.
///
/// The task ends when the peer finishes the stream, the receiver is dropped, or framing breaks.
pub fn spawn_frame_reader(
	mut recv: quinn::RecvStream,
	max_frame_size: usize,
) -> (mpsc::UnboundedReceiver<pb::Envelope>, JoinHandle<anyhow::Result<()>>) {
	let (tx, rx) = mpsc::unbounded_channel();
	let task = tokio::spawn(async move {
		let mut decoder = FrameDecoder::new(max_frame_size);
		let mut tmp = [0u8; 8192];

		loop {
			let n = match recv.read(&mut tmp).await {
				Ok(Some(n)) => n,
				Ok(None) => return Ok(()),
				Err(e) => return Err(anyhow!(e).context("control stream read failed")),
			};
			decoder.extend(&tmp[..n]);

			while let Some(env) = decoder
				.next_frame::<pb::Envelope>()
				.context("failed to decode control frame")?
			{
				if tx.send(env).is_err() {
					return Ok(());
				}
			}
		}
	});
	(rx, task)
}

pub async fn send_envelope(send: &mut quinn::SendStream, env: &pb::Envelope, max_frame_size: usize) -> anyhow::Result<()> {
	let frame = encode_frame(env, max_frame_size).map_err(|e| anyhow!(e))?;
	send.write_all(&frame).await.context("stream write")?;
	Ok(())
}

/// Send each envelope in order. An envelope too large for one frame is skipped so the rest of the feed keeps flowing.
async fn send_all(conn_id: u64, send: &mut quinn::SendStream, envs: &[pb::Envelope], max_frame_size: usize) -> anyhow::Result<()> {
	for env in envs {
		match encode_frame(env, max_frame_size) {
			Ok(frame) => send.write_all(&frame).await.context("stream write")?,
			Err(FramingError::FrameTooLarge { len, max }) => {
				warn!(conn_id, len, max, "skipping envelope larger than a frame");
				metrics::counter!("duochat_server_frames_skipped_total").increment(1);
			}
			Err(e) => return Err(anyhow!(e)),
		}
	}
	Ok(())
}

/// Split `history` into frames that each fit `max_frame_size`.
fn history_frames(conn_id: u64, history: &[ChatMessage], request_id: &str, max_frame_size: usize) -> Vec<pb::Envelope> {
	let chunked = convert::stream_messages_chunked(history, request_id, max_frame_size);
	if chunked.oversized > 0 {
		warn!(conn_id, oversized = chunked.oversized, "history messages too large for a frame were left out");
		metrics::counter!("duochat_server_history_oversized_total").increment(chunked.oversized as u64);
	}
	chunked.frames
}

fn reply(request_id: &str, mut env: pb::Envelope) -> pb::Envelope {
	env.request_id = request_id.to_string();
	env
}

fn bad_request(request_id: &str, message: impl Into<String>) -> pb::Envelope {
	reply(request_id, convert::error(pb::ErrorCode::BadRequest, message))
}

/// Serve one client: handshake, history, then live deltas until either side goes away.
pub async fn handle_connection(
	conn_id: u64,
	connection: quinn::Connection,
	engine: AggregationEngine,
	settings: ConnectionSettings,
) -> anyhow::Result<()> {
	let _gauge = ConnectionGaugeGuard::new();

	let (mut send, recv) = connection
		.accept_bi()
		.await
		.context("accept control bidirectional stream")?;
	let (mut ctrl_rx, reader_task) = spawn_frame_reader(recv, settings.max_frame_size);

	let result = serve(conn_id, &mut send, &mut ctrl_rx, &engine, &settings).await;

	// Let queued frames reach the peer before the connection drops.
	if send.finish().is_ok() {
		let _ = timeout(FLUSH_GRACE, send.stopped()).await;
	}
	drop(ctrl_rx);
	reader_task.abort();
	result
}

async fn serve(
	conn_id: u64,
	send: &mut quinn::SendStream,
	ctrl_rx: &mut mpsc::UnboundedReceiver<pb::Envelope>,
	engine: &AggregationEngine,
	settings: &ConnectionSettings,
) -> anyhow::Result<()> {
	let max = settings.max_frame_size;

	let (request_id, hello) = timeout(settings.hello_timeout, wait_for_hello(ctrl_rx))
		.await
		.map_err(|_| anyhow!("timed out waiting for Hello"))??;

	info!(conn_id, client_name = %hello.client_name, protocol_version = hello.protocol_version, "received Hello");

	if major(hello.protocol_version) != PROTOCOL_MAJOR {
		warn!(conn_id, protocol_version = hello.protocol_version, "unsupported protocol version");
		let env = reply(
			&request_id,
			convert::error(
				pb::ErrorCode::UnsupportedVersion,
				format!(
					"protocol major {} not supported (server speaks {PROTOCOL_MAJOR})",
					major(hello.protocol_version)
				),
			),
		);
		send_envelope(send, &env, max).await?;
		return Ok(());
	}

	let (history, mut feed_rx) = engine.subscribe().await;

	let welcome = envelope(pb::envelope::Msg::Welcome(pb::Welcome {
		server_name: settings.server_name.clone(),
		protocol_version: PROTOCOL_VERSION,
		history_capacity: u32::try_from(engine.history_capacity()).unwrap_or(u32::MAX),
		conn_id,
	}));
	send_envelope(send, &reply(&request_id, welcome), max).await?;
	let frames = history_frames(conn_id, &history, "", max);
	send_all(conn_id, send, &frames, max).await?;
	debug!(conn_id, history = history.len(), frames = frames.len(), "sent Welcome and history");

	loop {
		tokio::select! {
			env = ctrl_rx.recv() => {
				let Some(env) = env else {
					debug!(conn_id, "control stream closed by client");
					return Ok(());
				};
				let out = handle_control(conn_id, engine, env, max).await;
				send_all(conn_id, send, &out, max).await?;
			}

			item = feed_rx.recv() => {
				let Some(item) = item else {
					debug!(conn_id, "feed closed");
					return Ok(());
				};
				let out = feed_frames(conn_id, engine, item, &mut feed_rx, max).await;
				send_all(conn_id, send, &out, max).await?;
			}
		}
	}
}

/// Frames for one feed item. A lag marker swaps `feed_rx` for a fresh subscription and yields its full history.
pub(crate) async fn feed_frames(
	conn_id: u64,
	engine: &AggregationEngine,
	item: FeedItem,
	feed_rx: &mut FeedRx,
	max_frame_size: usize,
) -> Vec<pb::Envelope> {
	match item {
		FeedItem::Message(message) => vec![convert::stream_message(&message)],
		FeedItem::Removed(id) => vec![convert::message_removed(id)],
		FeedItem::Lagged { dropped } => {
			warn!(conn_id, dropped, "client fell behind, resending history");
			let (history, rx) = engine.subscribe().await;
			*feed_rx = rx;
			history_frames(conn_id, &history, "", max_frame_size)
		}
	}
}

async fn wait_for_hello(ctrl_rx: &mut mpsc::UnboundedReceiver<pb::Envelope>) -> anyhow::Result<(String, pb::Hello)> {
	while let Some(env) = ctrl_rx.recv().await {
		if let Some(pb::envelope::Msg::Hello(h)) = env.msg {
			return Ok((env.request_id, h));
		}
	}
	Err(anyhow!("connection closed before Hello"))
}

/// Apply one client request. Returns the direct reply frames, often none; feed changes reach the client through its subscription.
pub(crate) async fn handle_control(
	conn_id: u64,
	engine: &AggregationEngine,
	env: pb::Envelope,
	max_frame_size: usize,
) -> Vec<pb::Envelope> {
	let request_id = env.request_id;
	let Some(msg) = env.msg else {
		return vec![bad_request(&request_id, "envelope without message")];
	};

	match msg {
		pb::envelope::Msg::Sync(_) => history_frames(conn_id, &engine.snapshot().await, &request_id, max_frame_size),

		pb::envelope::Msg::AddMessage(add) => {
			let Some(event) = add.event else {
				return vec![bad_request(&request_id, "AddMessage without event")];
			};
			let raw = match RawChatEvent::try_from(event) {
				Ok(raw) => raw,
				Err(e) => return vec![bad_request(&request_id, format!("invalid event: {e}"))],
			};
			if let Err(e) = validate_chat_event(&raw) {
				return vec![bad_request(&request_id, e.to_string())];
			}
			if engine.ingest(raw).await.is_none() {
				debug!(conn_id, "client message dropped (empty)");
			}
			Vec::new()
		}

		pb::envelope::Msg::DeleteMessage(del) => {
			let id = match del.id.parse::<MessageId>() {
				Ok(id) => id,
				Err(e) => return vec![bad_request(&request_id, format!("invalid message id: {e}"))],
			};
			let removed = engine.delete_message(id).await;
			debug!(conn_id, message_id = %id, removed, "delete requested");
			Vec::new()
		}

		pb::envelope::Msg::Hello(_) => vec![bad_request(&request_id, "duplicate Hello")],

		pb::envelope::Msg::Welcome(_)
		| pb::envelope::Msg::StreamMessages(_)
		| pb::envelope::Msg::StreamMessage(_)
		| pb::envelope::Msg::MessageRemoved(_)
		| pb::envelope::Msg::Error(_) => vec![bad_request(&request_id, "unexpected server-to-client message")],
	}
}

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use duochat_platform::SourceAdapter;
use duochat_platform::twitch::TwitchEventSubAdapter;
use duochat_platform::youtube::YouTubeLiveChatAdapter;
use duochat_server::adapters::DemoAdapter;
use duochat_server::config::{self, ServerConfig, parse_env_bool};
use duochat_server::feed::AggregationEngine;
use duochat_server::quic::config::QuicServerConfig;
use duochat_server::server::adapter_manager::{AdapterManager, AdapterManagerConfig};
use duochat_server::server::connection::{ConnectionSettings, handle_connection};
use duochat_server::server::health::{HealthState, spawn_health_server};
use tokio::sync::Semaphore;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Synthetic chat source for local runs.
const DUOCHAT_ENABLE_DEMO_ADAPTER_ENV: &str = "DUOCHAT_ENABLE_DEMO_ADAPTER";

struct Args {
	config_path: Option<PathBuf>,
	bind: Option<String>,
}

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: duochat_server [--config path] [--bind host:port]\n\
\n\
Options:\n\
\t--config  Config file (default: ~/.duochat/config.toml)\n\
\t--bind    QUIC bind address (default: {})\n\
\t--help    Show this help\n\
",
		config::DEFAULT_BIND
	);
	std::process::exit(2)
}

fn parse_args() -> Args {
	let mut args = Args {
		config_path: None,
		bind: None,
	};

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--config" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				args.config_path = Some(PathBuf::from(v));
			}
			"--bind" | "--listen" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--bind must be non-empty (expected host:port)");
					usage_and_exit();
				}
				args.bind = Some(v);
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	args
}

fn init_rustls_crypto_provider() {
	let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,duochat_server=debug".to_string());

	let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
		.ok()
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty());
	let base = tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(tracing_subscriber::fmt::layer().with_target(false));

	if let Some(endpoint) = otlp_endpoint {
		use opentelemetry::global;
		use opentelemetry::trace::TracerProvider as _;
		use opentelemetry_otlp::WithExportConfig;

		match opentelemetry_otlp::SpanExporter::builder()
			.with_tonic()
			.with_endpoint(endpoint.clone())
			.build()
		{
			Ok(exporter) => {
				let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
					.with_batch_exporter(exporter)
					.build();
				let tracer = tracer_provider.tracer("duochat_server");
				global::set_tracer_provider(tracer_provider);

				base.with(tracing_opentelemetry::layer().with_tracer(tracer)).init();
				info!(endpoint = %endpoint, "otlp tracing enabled");
			}
			Err(e) => {
				base.init();
				warn!(error = %e, "failed to initialize otlp tracing");
			}
		}
	} else {
		base.init();
	}
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
				.with_http_listener(addr)
				.install()
			{
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)"),
	}
}

fn build_adapters(cfg: &ServerConfig) -> Vec<Box<dyn SourceAdapter>> {
	let mut adapters: Vec<Box<dyn SourceAdapter>> = Vec::new();

	if let Some(twitch_cfg) = cfg.twitch.adapter_config() {
		adapters.push(Box::new(TwitchEventSubAdapter::new(twitch_cfg)));
	}
	if let Some(youtube_cfg) = cfg.youtube.adapter_config() {
		adapters.push(Box::new(YouTubeLiveChatAdapter::new(youtube_cfg)));
	}

	let demo_enabled = std::env::var(DUOCHAT_ENABLE_DEMO_ADAPTER_ENV)
		.ok()
		.and_then(|v| parse_env_bool(&v))
		.unwrap_or(false);
	if demo_enabled {
		info!(env = DUOCHAT_ENABLE_DEMO_ADAPTER_ENV, "starting demo adapter (enabled by env)");
		adapters.push(Box::new(DemoAdapter::new()));
	}

	if adapters.is_empty() {
		warn!("no chat sources configured; the feed only receives client messages");
	}
	adapters
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_rustls_crypto_provider();
	init_tracing();

	let args = parse_args();

	let config_path = match args.config_path {
		Some(path) => path,
		None => config::default_config_path()?,
	};
	let mut server_cfg = config::load_server_config_from_path(&config_path)?;
	if let Some(bind) = args.bind {
		server_cfg.server.bind = bind;
	}
	info!(path = %config_path.display(), "loaded server config (toml + env overrides)");

	let bind_addr: SocketAddr = server_cfg
		.server
		.bind
		.parse()
		.with_context(|| format!("invalid bind address {:?} (expected host:port)", server_cfg.server.bind))?;

	init_metrics(server_cfg.server.metrics_bind.as_deref());

	let engine = AggregationEngine::new(server_cfg.feed.to_feed_config());

	let health_state = HealthState::new();
	if let Some(bind) = server_cfg.server.health_bind.as_deref() {
		match bind.parse::<SocketAddr>() {
			Ok(addr) => {
				if let Err(e) = spawn_health_server(addr, health_state.clone()).await {
					warn!(error = %e, %addr, "failed to start health server");
				}
			}
			Err(e) => warn!(error = %e, %bind, "invalid health bind address (expected host:port)"),
		}
	}

	let adapter_manager = AdapterManager::start(
		engine.clone(),
		build_adapters(&server_cfg),
		AdapterManagerConfig::default(),
	);

	let quic_cfg = QuicServerConfig::new(bind_addr);
	let endpoint = if let (Some(cert_path), Some(key_path)) = (
		server_cfg.server.tls_cert_path.as_deref(),
		server_cfg.server.tls_key_path.as_deref(),
	) {
		info!(cert = %cert_path.display(), key = %key_path.display(), "loading TLS cert/key");
		quic_cfg.bind_endpoint_with_tls(cert_path, key_path)?
	} else {
		let (endpoint, server_cert_der) = quic_cfg.bind_dev_endpoint()?;
		info!(
			bind = %bind_addr,
			cert_der_len = server_cert_der.len(),
			"QUIC endpoint ready (dev self-signed cert)"
		);
		endpoint
	};

	let limit = match server_cfg.server.max_connections {
		0 => None,
		n => Some(Arc::new(Semaphore::new(n))),
	};
	let conn_settings = ConnectionSettings::default();

	health_state.mark_ready();
	info!(bind = %bind_addr, adapters = adapter_manager.len(), "duochat_server ready");

	let mut next_conn_id: u64 = 1;
	let shutdown = tokio::signal::ctrl_c();
	tokio::pin!(shutdown);

	loop {
		let incoming = tokio::select! {
			incoming = endpoint.accept() => match incoming {
				Some(incoming) => incoming,
				None => break,
			},
			res = &mut shutdown => {
				if let Err(e) = res {
					warn!(error = %e, "failed to listen for ctrl-c");
				}
				info!("shutdown requested");
				break;
			}
		};

		let permit = match &limit {
			Some(sem) => match Arc::clone(sem).try_acquire_owned() {
				Ok(permit) => Some(permit),
				Err(_) => {
					metrics::counter!("duochat_server_connections_refused_total").increment(1);
					warn!(remote = %incoming.remote_address(), "connection limit reached; refusing");
					incoming.refuse();
					continue;
				}
			},
			None => None,
		};

		let conn_id = next_conn_id;
		next_conn_id += 1;
		metrics::counter!("duochat_server_connections_total").increment(1);

		let engine = engine.clone();
		let conn_settings = conn_settings.clone();
		tokio::spawn(async move {
			let _permit = permit;
			match incoming.await {
				Ok(connection) => {
					info!(conn_id, remote = %connection.remote_address(), "accepted connection");
					if let Err(e) = handle_connection(conn_id, connection, engine, conn_settings).await {
						warn!(conn_id, error = %e, "connection handler exited with error");
					}
				}
				Err(e) => warn!(conn_id, error = %e, "failed to establish QUIC connection"),
			}
		});
	}

	health_state.mark_not_ready();
	endpoint.close(0u32.into(), b"server shutting down");
	adapter_manager.shutdown().await;
	endpoint.wait_idle().await;
	info!("duochat_server stopped");
	Ok(())
}

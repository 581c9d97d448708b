#![forbid(unsafe_code)]

mod auth;
mod config;
mod http;
mod oauth;
mod push;
mod services;
mod state;
mod util;
mod ws;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use campus_cache::Cache;
use campus_realtime::{ConnectionRegistry, RouterConfig, spawn_event_router};
use campus_store::Store;

use crate::auth::{DEFAULT_TOKEN_TTL, TokenService};
use crate::config::ServerConfig;
use crate::oauth::{GoogleIdentityProvider, IdentityProvider};
use crate::push::{FcmGateway, PushService};
use crate::services::accounts::AccountService;
use crate::services::hashtags::HashtagService;
use crate::services::learning::LearningService;
use crate::services::messaging::MessagingService;
use crate::services::notes::NotesService;
use crate::services::notifications::NotificationService;
use crate::services::rankings::RankingService;
use crate::services::social::SocialService;
use crate::state::AppState;
use crate::util::secret::SecretString;

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: campus_server [--config path]\n\
\n\
Options:\n\
\t--config  Config file path (default: ~/.campus/config.toml)\n\
\t--help    Show this help\n\
"
	);
	std::process::exit(2)
}

fn parse_args() -> Option<PathBuf> {
	let mut config_path = None;

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--config" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--config must be non-empty");
					usage_and_exit();
				}
				config_path = Some(PathBuf::from(v));
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	config_path
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,campus_server=debug".to_string());

	tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(tracing_subscriber::fmt::layer().with_target(false))
		.init();
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
		Err(e) => {
			warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)");
		}
	}
}

async fn select_cache(cfg: &ServerConfig) -> Cache {
	if let Some(url) = cfg.cache.url.as_deref() {
		match Cache::connect_redis(url).await {
			Ok(cache) => {
				info!("cache: redis backend connected");
				return cache;
			}
			Err(e) => {
				// Unreachable at startup degrades to always-miss instead of
				// failing the process.
				warn!(error = %e, "cache: redis unreachable; degrading to always-miss");
				return Cache::disabled();
			}
		}
	}

	if cfg.cache.in_memory {
		info!("cache: in-memory stand-in enabled");
		return Cache::in_memory();
	}

	info!("cache: not configured; every read is a miss");
	Cache::disabled()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();

	let config_path = match parse_args() {
		Some(path) => path,
		None => config::default_config_path()?,
	};
	let cfg = config::load_server_config_from_path(&config_path)?;
	info!(path = %config_path.display(), "loaded server config (toml + env overrides)");

	init_metrics(cfg.server.metrics_bind.as_deref());

	let database_url = cfg
		.persistence
		.database_url
		.clone()
		.unwrap_or_else(|| "sqlite:campus.db".to_string());
	let store = Store::connect(&database_url).await?;
	info!("store connected and migrated");

	let cache = select_cache(&cfg).await;

	let token_secret = cfg.auth.token_secret.clone().unwrap_or_else(|| {
		warn!("auth: no token_secret configured; using a random per-process secret");
		SecretString::new(uuid::Uuid::new_v4().to_string())
	});
	let token_ttl = cfg
		.auth
		.token_ttl_secs
		.map(Duration::from_secs)
		.unwrap_or(DEFAULT_TOKEN_TTL);
	let tokens = TokenService::new(token_secret, token_ttl);

	let identity: Option<Arc<dyn IdentityProvider>> = match (&cfg.google.client_id, &cfg.google.client_secret) {
		(Some(client_id), Some(client_secret)) => {
			info!("federated sign-in enabled");
			Some(Arc::new(GoogleIdentityProvider::new(
				client_id.clone(),
				client_secret.clone(),
				cfg.google.redirect_uri.clone().unwrap_or_default(),
			)))
		}
		_ => None,
	};

	let push = match (&cfg.push.endpoint, &cfg.push.server_key) {
		(Some(endpoint), Some(server_key)) => {
			info!("push gateway enabled");
			PushService::new(
				Arc::new(FcmGateway::new(endpoint.clone(), server_key.clone())),
				store.clone(),
			)
		}
		_ => PushService::disabled(store.clone()),
	};

	let registry = Arc::new(ConnectionRegistry::new());
	let router = spawn_event_router(Arc::clone(&registry), RouterConfig::default());

	let notifications = NotificationService::new(store.clone(), cache.clone(), Arc::clone(&registry), push);
	let rankings = RankingService::new(store.clone(), cache.clone(), cfg.rankings.clone());
	let hashtags = HashtagService::new(store.clone());
	let social = SocialService::new(
		store.clone(),
		cache.clone(),
		Arc::clone(&registry),
		notifications.clone(),
		rankings.clone(),
		hashtags.clone(),
	);
	let learning = LearningService::new(store.clone(), rankings.clone());
	let notes = NotesService::new(store.clone());
	let messaging = MessagingService::new(store.clone());
	let accounts = AccountService::new(store.clone(), tokens.clone(), identity);

	let state = Arc::new(AppState::new(
		store,
		cache,
		registry,
		tokens,
		accounts,
		messaging,
		notifications,
		rankings,
		social,
		hashtags,
		learning,
		notes,
	));

	// Expired notes are invisible to reads; this reclaims the rows.
	{
		let store = state.store.clone();
		tokio::spawn(async move {
			let mut tick = tokio::time::interval(Duration::from_secs(60 * 60));
			loop {
				tick.tick().await;
				match store.purge_expired_notes(chrono::Utc::now()).await {
					Ok(0) => {}
					Ok(purged) => info!(purged, "purged expired notes"),
					Err(e) => warn!(error = %e, "failed to purge expired notes"),
				}
			}
		});
	}

	let ws_bind: SocketAddr = cfg
		.server
		.ws_bind
		.parse()
		.map_err(|e| anyhow::anyhow!("invalid ws_bind {:?}: {e}", cfg.server.ws_bind))?;
	ws::spawn_ws_listener(ws_bind, router, cfg.server.socket_queue_capacity);

	let api_bind: SocketAddr = cfg
		.server
		.api_bind
		.parse()
		.map_err(|e| anyhow::anyhow!("invalid api_bind {:?}: {e}", cfg.server.api_bind))?;

	state.mark_ready();
	http::run_api_server(api_bind, state).await
}

#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, anyhow};
use serde::Deserialize;
use tracing::info;

use crate::util::secret::SecretString;

/// Default config path: `~/.campus/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".campus").join("config.toml"))
}

/// Load the server config from TOML and env overrides.
pub fn load_server_config_from_path(path: &Path) -> anyhow::Result<ServerConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ServerConfig::from_file(file_cfg);

	apply_env_overrides(&mut cfg);

	Ok(cfg)
}

/// Server config (v1).
#[derive(Debug, Clone)]
pub struct ServerConfig {
	pub server: ServerSettings,
	pub auth: AuthSettings,
	pub persistence: PersistenceSettings,
	pub cache: CacheSettings,
	pub google: GoogleSettings,
	pub push: PushSettings,
	pub rankings: RankingSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
	/// REST API bind address (host:port).
	pub api_bind: String,
	/// WebSocket listener bind address (host:port).
	pub ws_bind: String,
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
	/// Per-connection outbound socket queue capacity.
	pub socket_queue_capacity: usize,
}

impl Default for ServerSettings {
	fn default() -> Self {
		Self {
			api_bind: "127.0.0.1:8800".to_string(),
			ws_bind: "127.0.0.1:8801".to_string(),
			metrics_bind: None,
			socket_queue_capacity: 256,
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct AuthSettings {
	/// HMAC secret for access tokens; a random per-process secret is
	/// generated when unset (tokens then die with the process).
	pub token_secret: Option<SecretString>,
	/// Access token lifetime in seconds.
	pub token_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct PersistenceSettings {
	/// Database URL (sqlite:).
	pub database_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CacheSettings {
	/// Redis URL; when unset the cache degrades to always-miss unless
	/// `in_memory` asks for the process-local stand-in.
	pub url: Option<String>,
	pub in_memory: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GoogleSettings {
	pub client_id: Option<String>,
	pub client_secret: Option<SecretString>,
	pub redirect_uri: Option<String>,
}

impl GoogleSettings {
	pub fn is_configured(&self) -> bool {
		self.client_id.is_some() && self.client_secret.is_some()
	}
}

#[derive(Debug, Clone, Default)]
pub struct PushSettings {
	/// Push gateway endpoint; unset disables push delivery.
	pub endpoint: Option<String>,
	pub server_key: Option<SecretString>,
}

#[derive(Debug, Clone)]
pub struct RankingSettings {
	/// Day-boundary offset (minutes east of UTC) for the like ranking.
	pub like_day_offset_minutes: i32,
	/// Expiry applied when reseeding a leaderboard after a cold read.
	pub reseed_ttl_secs: u64,
}

impl Default for RankingSettings {
	fn default() -> Self {
		Self {
			like_day_offset_minutes: 540,
			reseed_ttl_secs: 14 * 24 * 60 * 60,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	server: FileServerSettings,

	#[serde(default)]
	auth: FileAuthSettings,

	#[serde(default)]
	persistence: FilePersistenceSettings,

	#[serde(default)]
	cache: FileCacheSettings,

	#[serde(default)]
	google: FileGoogleSettings,

	#[serde(default)]
	push: FilePushSettings,

	#[serde(default)]
	rankings: FileRankingSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileServerSettings {
	api_bind: Option<String>,
	ws_bind: Option<String>,
	metrics_bind: Option<String>,
	socket_queue_capacity: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileAuthSettings {
	token_secret: Option<String>,
	token_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FilePersistenceSettings {
	database_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileCacheSettings {
	url: Option<String>,
	in_memory: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileGoogleSettings {
	client_id: Option<String>,
	client_secret: Option<String>,
	redirect_uri: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FilePushSettings {
	endpoint: Option<String>,
	server_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileRankingSettings {
	like_day_offset_minutes: Option<i32>,
	reseed_ttl_secs: Option<u64>,
}

impl ServerConfig {
	fn from_file(file: FileConfig) -> Self {
		let defaults = ServerSettings::default();
		Self {
			server: ServerSettings {
				api_bind: file
					.server
					.api_bind
					.filter(|s| !s.trim().is_empty())
					.unwrap_or(defaults.api_bind),
				ws_bind: file
					.server
					.ws_bind
					.filter(|s| !s.trim().is_empty())
					.unwrap_or(defaults.ws_bind),
				metrics_bind: file.server.metrics_bind.filter(|s| !s.trim().is_empty()),
				socket_queue_capacity: file
					.server
					.socket_queue_capacity
					.filter(|v| *v > 0)
					.unwrap_or(defaults.socket_queue_capacity),
			},
			auth: AuthSettings {
				token_secret: file
					.auth
					.token_secret
					.filter(|s| !s.trim().is_empty())
					.map(SecretString::new),
				token_ttl_secs: file.auth.token_ttl_secs.filter(|v| *v > 0),
			},
			persistence: PersistenceSettings {
				database_url: file.persistence.database_url.filter(|s| !s.trim().is_empty()),
			},
			cache: CacheSettings {
				url: file.cache.url.filter(|s| !s.trim().is_empty()),
				in_memory: file.cache.in_memory.unwrap_or(false),
			},
			google: GoogleSettings {
				client_id: file.google.client_id.filter(|s| !s.trim().is_empty()),
				client_secret: file
					.google
					.client_secret
					.filter(|s| !s.trim().is_empty())
					.map(SecretString::new),
				redirect_uri: file.google.redirect_uri.filter(|s| !s.trim().is_empty()),
			},
			push: PushSettings {
				endpoint: file.push.endpoint.filter(|s| !s.trim().is_empty()),
				server_key: file
					.push
					.server_key
					.filter(|s| !s.trim().is_empty())
					.map(SecretString::new),
			},
			rankings: RankingSettings {
				like_day_offset_minutes: file
					.rankings
					.like_day_offset_minutes
					.unwrap_or(RankingSettings::default().like_day_offset_minutes),
				reseed_ttl_secs: file
					.rankings
					.reseed_ttl_secs
					.filter(|v| *v > 0)
					.unwrap_or(RankingSettings::default().reseed_ttl_secs),
			},
		}
	}
}

fn parse_env_bool(v: &str) -> Option<bool> {
	match v.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn apply_env_overrides(cfg: &mut ServerConfig) {
	if let Ok(v) = std::env::var("CAMPUS_API_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.api_bind = v;
			info!("server config: api_bind overridden by env");
		}
	}

	if let Ok(v) = std::env::var("CAMPUS_WS_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.ws_bind = v;
			info!("server config: ws_bind overridden by env");
		}
	}

	if let Ok(v) = std::env::var("CAMPUS_METRICS_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.metrics_bind = Some(v);
			info!("server config: metrics_bind overridden by env");
		}
	}

	if let Ok(v) = std::env::var("CAMPUS_SOCKET_QUEUE_CAPACITY")
		&& let Ok(capacity) = v.trim().parse::<usize>()
		&& capacity > 0
	{
		cfg.server.socket_queue_capacity = capacity;
		info!(capacity, "server config: socket_queue_capacity overridden by env");
	}

	if let Ok(v) = std::env::var("CAMPUS_AUTH_TOKEN_SECRET") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.auth.token_secret = Some(SecretString::new(v));
			info!("auth config: token_secret overridden by env");
		}
	}

	if let Ok(v) = std::env::var("CAMPUS_AUTH_TOKEN_TTL_SECS")
		&& let Ok(ttl) = v.trim().parse::<u64>()
		&& ttl > 0
	{
		cfg.auth.token_ttl_secs = Some(ttl);
		info!(ttl, "auth config: token_ttl_secs overridden by env");
	}

	if let Ok(v) = std::env::var("CAMPUS_DATABASE_URL") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.persistence.database_url = Some(v);
			info!("persistence: database_url overridden by env");
		}
	}

	if let Ok(v) = std::env::var("CAMPUS_CACHE_URL") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.cache.url = Some(v);
			info!("cache config: url overridden by env");
		}
	}

	if let Ok(v) = std::env::var("CAMPUS_CACHE_IN_MEMORY")
		&& let Some(in_memory) = parse_env_bool(&v)
	{
		cfg.cache.in_memory = in_memory;
		info!(in_memory, "cache config: in_memory overridden by env");
	}

	if let Ok(v) = std::env::var("CAMPUS_GOOGLE_CLIENT_ID") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.google.client_id = Some(v);
			info!("google config: client_id overridden by env");
		}
	}

	if let Ok(v) = std::env::var("CAMPUS_GOOGLE_CLIENT_SECRET") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.google.client_secret = Some(SecretString::new(v));
			info!("google config: client_secret overridden by env");
		}
	}

	if let Ok(v) = std::env::var("CAMPUS_GOOGLE_REDIRECT_URI") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.google.redirect_uri = Some(v);
			info!("google config: redirect_uri overridden by env");
		}
	}

	if let Ok(v) = std::env::var("CAMPUS_PUSH_ENDPOINT") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.push.endpoint = Some(v);
			info!("push config: endpoint overridden by env");
		}
	}

	if let Ok(v) = std::env::var("CAMPUS_PUSH_SERVER_KEY") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.push.server_key = Some(SecretString::new(v));
			info!("push config: server_key overridden by env");
		}
	}

	if let Ok(v) = std::env::var("CAMPUS_LIKE_DAY_OFFSET_MINUTES")
		&& let Ok(offset) = v.trim().parse::<i32>()
	{
		cfg.rankings.like_day_offset_minutes = offset;
		info!(offset, "rankings config: like_day_offset_minutes overridden by env");
	}

	if let Ok(v) = std::env::var("CAMPUS_RANKING_RESEED_TTL_SECS")
		&& let Ok(ttl) = v.trim().parse::<u64>()
		&& ttl > 0
	{
		cfg.rankings.reseed_ttl_secs = ttl;
		info!(ttl, "rankings config: reseed_ttl_secs overridden by env");
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_apply_when_file_is_empty() {
		let cfg = ServerConfig::from_file(FileConfig::default());
		assert_eq!(cfg.server.api_bind, "127.0.0.1:8800");
		assert_eq!(cfg.server.ws_bind, "127.0.0.1:8801");
		assert_eq!(cfg.rankings.like_day_offset_minutes, 540);
		assert!(cfg.cache.url.is_none());
		assert!(!cfg.google.is_configured());
	}

	#[test]
	fn file_values_override_defaults() {
		let file: FileConfig = toml::from_str(
			r#"
			[server]
			api_bind = "0.0.0.0:9000"

			[cache]
			url = "redis://127.0.0.1:6379"

			[rankings]
			like_day_offset_minutes = 0
			"#,
		)
		.unwrap();
		let cfg = ServerConfig::from_file(file);
		assert_eq!(cfg.server.api_bind, "0.0.0.0:9000");
		assert_eq!(cfg.cache.url.as_deref(), Some("redis://127.0.0.1:6379"));
		assert_eq!(cfg.rankings.like_day_offset_minutes, 0);
	}

	#[test]
	fn blank_strings_count_as_unset() {
		let file: FileConfig = toml::from_str(
			r#"
			[auth]
			token_secret = "  "

			[google]
			client_id = ""
			"#,
		)
		.unwrap();
		let cfg = ServerConfig::from_file(file);
		assert!(cfg.auth.token_secret.is_none());
		assert!(cfg.google.client_id.is_none());
	}
}

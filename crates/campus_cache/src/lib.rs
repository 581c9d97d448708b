#![forbid(unsafe_code)]

mod memory;
mod redis_backend;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;

/// One operation of a best-effort pipelined batch.
#[derive(Debug, Clone)]
pub enum CacheOp {
	Set { key: String, value: String },
	Del { key: String },
	Lpush { key: String, value: String },
	Ltrim { key: String, start: i64, stop: i64 },
	Sadd { key: String, member: String },
	Zadd { key: String, score: f64, member: String },
	Expire { key: String, ttl_secs: u64 },
}

/// Backend contract for the fast cache.
///
/// Operations mirror the minimum command surface the read paths need:
/// scalars, lists, sets, sorted sets, expiry, and a pipelined batch. The
/// batch is best-effort, not transactional.
#[async_trait]
pub trait CacheBackend: Send + Sync {
	async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
	async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
	async fn del(&self, key: &str) -> anyhow::Result<()>;

	async fn lpush(&self, key: &str, value: &str) -> anyhow::Result<()>;
	async fn lrange(&self, key: &str, start: i64, stop: i64) -> anyhow::Result<Vec<String>>;
	async fn ltrim(&self, key: &str, start: i64, stop: i64) -> anyhow::Result<()>;

	async fn sadd(&self, key: &str, member: &str) -> anyhow::Result<()>;
	async fn srem(&self, key: &str, member: &str) -> anyhow::Result<()>;
	async fn smembers(&self, key: &str) -> anyhow::Result<Vec<String>>;

	async fn zincrby(&self, key: &str, delta: f64, member: &str) -> anyhow::Result<f64>;
	async fn zrevrange_withscores(&self, key: &str, start: i64, stop: i64) -> anyhow::Result<Vec<(String, f64)>>;

	async fn expire(&self, key: &str, ttl_secs: u64) -> anyhow::Result<()>;

	async fn pipeline(&self, ops: Vec<CacheOp>) -> anyhow::Result<()>;
}

/// Degrading facade over an optional backend.
///
/// When no backend is configured every operation returns a harmless
/// default, and when a configured backend errors the failure is logged,
/// counted, and mapped to the same default. Call sites never branch on
/// cache availability and never observe an error.
#[derive(Clone)]
pub struct Cache {
	backend: Option<Arc<dyn CacheBackend>>,
}

impl Cache {
	pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
		Self {
			backend: Some(backend),
		}
	}

	/// Connect to a Redis backend.
	pub async fn connect_redis(url: &str) -> anyhow::Result<Self> {
		let backend = RedisBackend::connect(url).await?;
		Ok(Self::new(Arc::new(backend)))
	}

	/// Process-local stand-in (tests, single-node deployments).
	pub fn in_memory() -> Self {
		Self::new(Arc::new(MemoryBackend::default()))
	}

	/// Always-miss facade used when no cache is configured.
	pub fn disabled() -> Self {
		Self { backend: None }
	}

	pub fn is_enabled(&self) -> bool {
		self.backend.is_some()
	}

	fn degraded(op: &'static str, key: &str, err: &anyhow::Error) {
		metrics::counter!("campus_cache_errors_total").increment(1);
		warn!(op, key, error = %err, "cache operation failed; degrading to miss");
	}

	pub async fn get(&self, key: &str) -> Option<String> {
		let backend = self.backend.as_ref()?;
		match backend.get(key).await {
			Ok(v) => v,
			Err(e) => {
				Self::degraded("get", key, &e);
				None
			}
		}
	}

	pub async fn set(&self, key: &str, value: &str) {
		let Some(backend) = self.backend.as_ref() else { return };
		if let Err(e) = backend.set(key, value).await {
			Self::degraded("set", key, &e);
		}
	}

	pub async fn del(&self, key: &str) {
		let Some(backend) = self.backend.as_ref() else { return };
		if let Err(e) = backend.del(key).await {
			Self::degraded("del", key, &e);
		}
	}

	pub async fn lpush(&self, key: &str, value: &str) {
		let Some(backend) = self.backend.as_ref() else { return };
		if let Err(e) = backend.lpush(key, value).await {
			Self::degraded("lpush", key, &e);
		}
	}

	pub async fn lrange(&self, key: &str, start: i64, stop: i64) -> Vec<String> {
		let Some(backend) = self.backend.as_ref() else {
			return Vec::new();
		};
		match backend.lrange(key, start, stop).await {
			Ok(v) => v,
			Err(e) => {
				Self::degraded("lrange", key, &e);
				Vec::new()
			}
		}
	}

	pub async fn ltrim(&self, key: &str, start: i64, stop: i64) {
		let Some(backend) = self.backend.as_ref() else { return };
		if let Err(e) = backend.ltrim(key, start, stop).await {
			Self::degraded("ltrim", key, &e);
		}
	}

	pub async fn sadd(&self, key: &str, member: &str) {
		let Some(backend) = self.backend.as_ref() else { return };
		if let Err(e) = backend.sadd(key, member).await {
			Self::degraded("sadd", key, &e);
		}
	}

	pub async fn srem(&self, key: &str, member: &str) {
		let Some(backend) = self.backend.as_ref() else { return };
		if let Err(e) = backend.srem(key, member).await {
			Self::degraded("srem", key, &e);
		}
	}

	pub async fn smembers(&self, key: &str) -> Vec<String> {
		let Some(backend) = self.backend.as_ref() else {
			return Vec::new();
		};
		match backend.smembers(key).await {
			Ok(v) => v,
			Err(e) => {
				Self::degraded("smembers", key, &e);
				Vec::new()
			}
		}
	}

	pub async fn zincrby(&self, key: &str, delta: f64, member: &str) -> f64 {
		let Some(backend) = self.backend.as_ref() else {
			return 0.0;
		};
		match backend.zincrby(key, delta, member).await {
			Ok(v) => v,
			Err(e) => {
				Self::degraded("zincrby", key, &e);
				0.0
			}
		}
	}

	pub async fn zrevrange_withscores(&self, key: &str, start: i64, stop: i64) -> Vec<(String, f64)> {
		let Some(backend) = self.backend.as_ref() else {
			return Vec::new();
		};
		match backend.zrevrange_withscores(key, start, stop).await {
			Ok(v) => v,
			Err(e) => {
				Self::degraded("zrevrange", key, &e);
				Vec::new()
			}
		}
	}

	pub async fn expire(&self, key: &str, ttl_secs: u64) {
		let Some(backend) = self.backend.as_ref() else { return };
		if let Err(e) = backend.expire(key, ttl_secs).await {
			Self::degraded("expire", key, &e);
		}
	}

	pub async fn pipeline(&self, ops: Vec<CacheOp>) {
		let Some(backend) = self.backend.as_ref() else { return };
		if let Err(e) = backend.pipeline(ops).await {
			Self::degraded("pipeline", "<batch>", &e);
		}
	}
}

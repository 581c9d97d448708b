#![forbid(unsafe_code)]

use anyhow::Context as _;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;

use crate::{CacheBackend, CacheOp};

/// Redis-backed cache adapter over a multiplexed async connection.
pub struct RedisBackend {
	conn: Mutex<MultiplexedConnection>,
}

impl RedisBackend {
	pub async fn connect(url: &str) -> anyhow::Result<Self> {
		let client = redis::Client::open(url).context("open redis client")?;
		let conn = client
			.get_multiplexed_async_connection()
			.await
			.context("connect redis")?;
		Ok(Self { conn: Mutex::new(conn) })
	}
}

#[async_trait]
impl CacheBackend for RedisBackend {
	async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
		let mut conn = self.conn.lock().await;
		let value: Option<String> = redis::cmd("GET")
			.arg(key)
			.query_async(&mut *conn)
			.await
			.context("GET")?;
		Ok(value)
	}

	async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
		let mut conn = self.conn.lock().await;
		redis::cmd("SET")
			.arg(key)
			.arg(value)
			.query_async::<()>(&mut *conn)
			.await
			.context("SET")?;
		Ok(())
	}

	async fn del(&self, key: &str) -> anyhow::Result<()> {
		let mut conn = self.conn.lock().await;
		redis::cmd("DEL").arg(key).query_async::<()>(&mut *conn).await.context("DEL")?;
		Ok(())
	}

	async fn lpush(&self, key: &str, value: &str) -> anyhow::Result<()> {
		let mut conn = self.conn.lock().await;
		redis::cmd("LPUSH")
			.arg(key)
			.arg(value)
			.query_async::<()>(&mut *conn)
			.await
			.context("LPUSH")?;
		Ok(())
	}

	async fn lrange(&self, key: &str, start: i64, stop: i64) -> anyhow::Result<Vec<String>> {
		let mut conn = self.conn.lock().await;
		let items: Vec<String> = redis::cmd("LRANGE")
			.arg(key)
			.arg(start)
			.arg(stop)
			.query_async(&mut *conn)
			.await
			.context("LRANGE")?;
		Ok(items)
	}

	async fn ltrim(&self, key: &str, start: i64, stop: i64) -> anyhow::Result<()> {
		let mut conn = self.conn.lock().await;
		redis::cmd("LTRIM")
			.arg(key)
			.arg(start)
			.arg(stop)
			.query_async::<()>(&mut *conn)
			.await
			.context("LTRIM")?;
		Ok(())
	}

	async fn sadd(&self, key: &str, member: &str) -> anyhow::Result<()> {
		let mut conn = self.conn.lock().await;
		redis::cmd("SADD")
			.arg(key)
			.arg(member)
			.query_async::<()>(&mut *conn)
			.await
			.context("SADD")?;
		Ok(())
	}

	async fn srem(&self, key: &str, member: &str) -> anyhow::Result<()> {
		let mut conn = self.conn.lock().await;
		redis::cmd("SREM")
			.arg(key)
			.arg(member)
			.query_async::<()>(&mut *conn)
			.await
			.context("SREM")?;
		Ok(())
	}

	async fn smembers(&self, key: &str) -> anyhow::Result<Vec<String>> {
		let mut conn = self.conn.lock().await;
		let members: Vec<String> = redis::cmd("SMEMBERS")
			.arg(key)
			.query_async(&mut *conn)
			.await
			.context("SMEMBERS")?;
		Ok(members)
	}

	async fn zincrby(&self, key: &str, delta: f64, member: &str) -> anyhow::Result<f64> {
		let mut conn = self.conn.lock().await;
		let score: f64 = redis::cmd("ZINCRBY")
			.arg(key)
			.arg(delta)
			.arg(member)
			.query_async(&mut *conn)
			.await
			.context("ZINCRBY")?;
		Ok(score)
	}

	async fn zrevrange_withscores(&self, key: &str, start: i64, stop: i64) -> anyhow::Result<Vec<(String, f64)>> {
		let mut conn = self.conn.lock().await;
		let entries: Vec<(String, f64)> = redis::cmd("ZREVRANGE")
			.arg(key)
			.arg(start)
			.arg(stop)
			.arg("WITHSCORES")
			.query_async(&mut *conn)
			.await
			.context("ZREVRANGE")?;
		Ok(entries)
	}

	async fn expire(&self, key: &str, ttl_secs: u64) -> anyhow::Result<()> {
		let mut conn = self.conn.lock().await;
		redis::cmd("EXPIRE")
			.arg(key)
			.arg(ttl_secs)
			.query_async::<()>(&mut *conn)
			.await
			.context("EXPIRE")?;
		Ok(())
	}

	async fn pipeline(&self, ops: Vec<CacheOp>) -> anyhow::Result<()> {
		let mut pipe = redis::pipe();
		for op in &ops {
			match op {
				CacheOp::Set { key, value } => {
					pipe.cmd("SET").arg(key).arg(value).ignore();
				}
				CacheOp::Del { key } => {
					pipe.cmd("DEL").arg(key).ignore();
				}
				CacheOp::Lpush { key, value } => {
					pipe.cmd("LPUSH").arg(key).arg(value).ignore();
				}
				CacheOp::Ltrim { key, start, stop } => {
					pipe.cmd("LTRIM").arg(key).arg(start).arg(stop).ignore();
				}
				CacheOp::Sadd { key, member } => {
					pipe.cmd("SADD").arg(key).arg(member).ignore();
				}
				CacheOp::Zadd { key, score, member } => {
					pipe.cmd("ZADD").arg(key).arg(*score).arg(member).ignore();
				}
				CacheOp::Expire { key, ttl_secs } => {
					pipe.cmd("EXPIRE").arg(key).arg(*ttl_secs).ignore();
				}
			}
		}

		let mut conn = self.conn.lock().await;
		pipe.query_async::<()>(&mut *conn).await.context("pipeline exec")?;
		Ok(())
	}
}

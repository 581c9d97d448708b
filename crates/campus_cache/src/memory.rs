#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::Mutex;

use campus_domain::time::unix_ms_now;

use crate::{CacheBackend, CacheOp};

#[derive(Debug, Clone)]
enum Value {
	Scalar(String),
	List(VecDeque<String>),
	Set(HashSet<String>),
	Zset(HashMap<String, f64>),
}

impl Value {
	fn kind(&self) -> &'static str {
		match self {
			Value::Scalar(_) => "scalar",
			Value::List(_) => "list",
			Value::Set(_) => "set",
			Value::Zset(_) => "zset",
		}
	}
}

#[derive(Debug, Clone)]
struct Entry {
	value: Value,
	expires_at_ms: Option<i64>,
}

/// Process-local cache backend.
///
/// Mirrors the backing store's command semantics closely enough for tests
/// and cache-less single-node deployments: negative range indices, inclusive
/// stops, type errors on kind mismatch, lazy expiry on access.
#[derive(Debug, Default)]
pub struct MemoryBackend {
	inner: Mutex<HashMap<String, Entry>>,
}

fn wrong_type(key: &str, want: &'static str, got: &'static str) -> anyhow::Error {
	anyhow!("wrong value kind for {key}: want {want}, got {got}")
}

/// Normalize a redis-style `[start, stop]` range (stop inclusive, negatives
/// from the end) into `start..end` over a collection of `len` items.
fn normalize_range(len: usize, start: i64, stop: i64) -> (usize, usize) {
	let len = len as i64;
	let mut start = if start < 0 { len + start } else { start };
	let mut stop = if stop < 0 { len + stop } else { stop };
	start = start.clamp(0, len);
	stop = stop.clamp(-1, len - 1);
	if start > stop {
		return (0, 0);
	}
	(start as usize, (stop + 1) as usize)
}

fn drop_if_expired(map: &mut HashMap<String, Entry>, key: &str) {
	if map.get(key).is_some_and(|entry| entry.expires_at_ms.is_some_and(|at| at <= unix_ms_now())) {
		map.remove(key);
	}
}

/// Existing live entry for `key`, or a fresh one holding `empty`.
fn live_or_insert<'a>(map: &'a mut HashMap<String, Entry>, key: &str, empty: Value) -> &'a mut Entry {
	drop_if_expired(map, key);
	map.entry(key.to_string()).or_insert(Entry {
		value: empty,
		expires_at_ms: None,
	})
}

fn live<'a>(map: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
	drop_if_expired(map, key);
	map.get_mut(key)
}

fn apply(map: &mut HashMap<String, Entry>, op: CacheOp) -> anyhow::Result<()> {
	match op {
		CacheOp::Set { key, value } => {
			map.insert(
				key,
				Entry {
					value: Value::Scalar(value),
					expires_at_ms: None,
				},
			);
		}
		CacheOp::Del { key } => {
			map.remove(&key);
		}
		CacheOp::Lpush { key, value } => {
			let entry = live_or_insert(map, &key, Value::List(VecDeque::new()));
			match &mut entry.value {
				Value::List(list) => list.push_front(value),
				other => return Err(wrong_type(&key, "list", other.kind())),
			}
		}
		CacheOp::Ltrim { key, start, stop } => {
			if let Some(entry) = live(map, &key) {
				match &mut entry.value {
					Value::List(list) => {
						let (from, to) = normalize_range(list.len(), start, stop);
						*list = list.iter().skip(from).take(to.saturating_sub(from)).cloned().collect();
					}
					other => return Err(wrong_type(&key, "list", other.kind())),
				}
			}
		}
		CacheOp::Sadd { key, member } => {
			let entry = live_or_insert(map, &key, Value::Set(HashSet::new()));
			match &mut entry.value {
				Value::Set(set) => {
					set.insert(member);
				}
				other => return Err(wrong_type(&key, "set", other.kind())),
			}
		}
		CacheOp::Zadd { key, score, member } => {
			let entry = live_or_insert(map, &key, Value::Zset(HashMap::new()));
			match &mut entry.value {
				Value::Zset(zset) => {
					zset.insert(member, score);
				}
				other => return Err(wrong_type(&key, "zset", other.kind())),
			}
		}
		CacheOp::Expire { key, ttl_secs } => {
			if let Some(entry) = live(map, &key) {
				entry.expires_at_ms = Some(unix_ms_now() + (ttl_secs as i64) * 1000);
			}
		}
	}
	Ok(())
}

#[async_trait]
impl CacheBackend for MemoryBackend {
	async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
		let mut map = self.inner.lock().await;
		match live(&mut map, key) {
			Some(entry) => match &entry.value {
				Value::Scalar(v) => Ok(Some(v.clone())),
				other => Err(wrong_type(key, "scalar", other.kind())),
			},
			None => Ok(None),
		}
	}

	async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
		let mut map = self.inner.lock().await;
		apply(
			&mut map,
			CacheOp::Set {
				key: key.to_string(),
				value: value.to_string(),
			},
		)
	}

	async fn del(&self, key: &str) -> anyhow::Result<()> {
		let mut map = self.inner.lock().await;
		map.remove(key);
		Ok(())
	}

	async fn lpush(&self, key: &str, value: &str) -> anyhow::Result<()> {
		let mut map = self.inner.lock().await;
		apply(
			&mut map,
			CacheOp::Lpush {
				key: key.to_string(),
				value: value.to_string(),
			},
		)
	}

	async fn lrange(&self, key: &str, start: i64, stop: i64) -> anyhow::Result<Vec<String>> {
		let mut map = self.inner.lock().await;
		match live(&mut map, key) {
			Some(entry) => match &entry.value {
				Value::List(list) => {
					let (from, to) = normalize_range(list.len(), start, stop);
					Ok(list.iter().skip(from).take(to.saturating_sub(from)).cloned().collect())
				}
				other => Err(wrong_type(key, "list", other.kind())),
			},
			None => Ok(Vec::new()),
		}
	}

	async fn ltrim(&self, key: &str, start: i64, stop: i64) -> anyhow::Result<()> {
		let mut map = self.inner.lock().await;
		apply(
			&mut map,
			CacheOp::Ltrim {
				key: key.to_string(),
				start,
				stop,
			},
		)
	}

	async fn sadd(&self, key: &str, member: &str) -> anyhow::Result<()> {
		let mut map = self.inner.lock().await;
		apply(
			&mut map,
			CacheOp::Sadd {
				key: key.to_string(),
				member: member.to_string(),
			},
		)
	}

	async fn srem(&self, key: &str, member: &str) -> anyhow::Result<()> {
		let mut map = self.inner.lock().await;
		match live(&mut map, key) {
			Some(entry) => match &mut entry.value {
				Value::Set(set) => {
					set.remove(member);
					Ok(())
				}
				other => Err(wrong_type(key, "set", other.kind())),
			},
			None => Ok(()),
		}
	}

	async fn smembers(&self, key: &str) -> anyhow::Result<Vec<String>> {
		let mut map = self.inner.lock().await;
		match live(&mut map, key) {
			Some(entry) => match &entry.value {
				Value::Set(set) => {
					let mut members: Vec<String> = set.iter().cloned().collect();
					members.sort();
					Ok(members)
				}
				other => Err(wrong_type(key, "set", other.kind())),
			},
			None => Ok(Vec::new()),
		}
	}

	async fn zincrby(&self, key: &str, delta: f64, member: &str) -> anyhow::Result<f64> {
		let mut map = self.inner.lock().await;
		let entry = live_or_insert(&mut map, key, Value::Zset(HashMap::new()));
		match &mut entry.value {
			Value::Zset(zset) => {
				let score = zset.entry(member.to_string()).or_insert(0.0);
				*score += delta;
				Ok(*score)
			}
			other => Err(wrong_type(key, "zset", other.kind())),
		}
	}

	async fn zrevrange_withscores(&self, key: &str, start: i64, stop: i64) -> anyhow::Result<Vec<(String, f64)>> {
		let mut map = self.inner.lock().await;
		match live(&mut map, key) {
			Some(entry) => match &entry.value {
				Value::Zset(zset) => {
					let mut entries: Vec<(String, f64)> = zset.iter().map(|(m, s)| (m.clone(), *s)).collect();
					entries.sort_by(|a, b| {
						b.1.partial_cmp(&a.1)
							.unwrap_or(std::cmp::Ordering::Equal)
							.then(a.0.cmp(&b.0))
					});
					let (from, to) = normalize_range(entries.len(), start, stop);
					Ok(entries.into_iter().skip(from).take(to.saturating_sub(from)).collect())
				}
				other => Err(wrong_type(key, "zset", other.kind())),
			},
			None => Ok(Vec::new()),
		}
	}

	async fn expire(&self, key: &str, ttl_secs: u64) -> anyhow::Result<()> {
		let mut map = self.inner.lock().await;
		apply(
			&mut map,
			CacheOp::Expire {
				key: key.to_string(),
				ttl_secs,
			},
		)
	}

	async fn pipeline(&self, ops: Vec<CacheOp>) -> anyhow::Result<()> {
		let mut map = self.inner.lock().await;
		for op in ops {
			apply(&mut map, op)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn list_range_and_trim_use_inclusive_stops() {
		let backend = MemoryBackend::default();
		for v in ["a", "b", "c", "d"] {
			backend.lpush("l", v).await.unwrap();
		}
		// List is now d, c, b, a.
		assert_eq!(backend.lrange("l", 0, 1).await.unwrap(), vec!["d", "c"]);
		assert_eq!(backend.lrange("l", -2, -1).await.unwrap(), vec!["b", "a"]);

		backend.ltrim("l", 0, 2).await.unwrap();
		assert_eq!(backend.lrange("l", 0, -1).await.unwrap(), vec!["d", "c", "b"]);
	}

	#[tokio::test]
	async fn zset_orders_descending_with_member_tiebreak() {
		let backend = MemoryBackend::default();
		backend.zincrby("z", 5.0, "bob").await.unwrap();
		backend.zincrby("z", 9.0, "ann").await.unwrap();
		backend.zincrby("z", 5.0, "al").await.unwrap();

		let top = backend.zrevrange_withscores("z", 0, -1).await.unwrap();
		assert_eq!(
			top,
			vec![
				("ann".to_string(), 9.0),
				("al".to_string(), 5.0),
				("bob".to_string(), 5.0)
			]
		);
	}

	#[tokio::test]
	async fn zincrby_accumulates_and_decrements() {
		let backend = MemoryBackend::default();
		assert_eq!(backend.zincrby("z", 3.0, "p").await.unwrap(), 3.0);
		assert_eq!(backend.zincrby("z", 2.0, "p").await.unwrap(), 5.0);
		assert_eq!(backend.zincrby("z", -1.0, "p").await.unwrap(), 4.0);
	}

	#[tokio::test]
	async fn set_membership_add_remove() {
		let backend = MemoryBackend::default();
		backend.sadd("s", "a").await.unwrap();
		backend.sadd("s", "b").await.unwrap();
		backend.sadd("s", "a").await.unwrap();
		assert_eq!(backend.smembers("s").await.unwrap(), vec!["a", "b"]);

		backend.srem("s", "a").await.unwrap();
		assert_eq!(backend.smembers("s").await.unwrap(), vec!["b"]);
		backend.srem("missing", "a").await.unwrap();
	}

	#[tokio::test]
	async fn kind_mismatch_is_an_error() {
		let backend = MemoryBackend::default();
		backend.set("k", "v").await.unwrap();
		assert!(backend.lpush("k", "x").await.is_err());
		assert!(backend.zincrby("k", 1.0, "m").await.is_err());
		assert!(backend.sadd("k", "m").await.is_err());
	}

	#[tokio::test]
	async fn expired_keys_read_as_absent() {
		let backend = MemoryBackend::default();
		backend.set("k", "v").await.unwrap();
		backend.expire("k", 0).await.unwrap();
		assert_eq!(backend.get("k").await.unwrap(), None);
	}
}

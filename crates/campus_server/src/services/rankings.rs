#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use tracing::debug;

use campus_cache::{Cache, CacheOp};
use campus_domain::time::{offset_day, offset_day_window, week_bucket, week_window};
use campus_domain::{PostId, RankedPost, RankedUser, Result, UserId};
use campus_store::Store;

use crate::config::RankingSettings;

/// Entries returned by both leaderboards.
const TOP_N: i64 = 10;

/// Excerpt length for ranked posts.
const EXCERPT_CHARS: usize = 80;

fn weekly_key(year: i32, week: u32) -> String {
	format!("learning:ranking:weekly:{year}:{week}")
}

fn daily_key(day: &str) -> String {
	format!("posts:ranking:daily:{day}")
}

/// Time-bucketed leaderboards in a cache sorted set, with deterministic
/// recomputation from the store when the cache is cold and a reseed
/// afterwards.
#[derive(Clone)]
pub struct RankingService {
	store: Store,
	cache: Cache,
	cfg: RankingSettings,
}

impl RankingService {
	pub fn new(store: Store, cache: Cache, cfg: RankingSettings) -> Self {
		Self { store, cache, cfg }
	}

	/// Bump the current week's study-time score (minutes) for a user.
	pub async fn record_study_time(&self, user: &UserId, minutes: i64, at: DateTime<Utc>) {
		if minutes <= 0 {
			return;
		}
		let (year, week) = week_bucket(at);
		self.cache
			.zincrby(&weekly_key(year, week), minutes as f64, user.as_str())
			.await;
	}

	/// Bump the like-day bucket for a post.
	pub async fn record_like(&self, post: &PostId, at: DateTime<Utc>) {
		let day = offset_day(at, self.cfg.like_day_offset_minutes);
		self.cache
			.zincrby(&daily_key(&day.to_string()), 1.0, post.as_str())
			.await;
	}

	/// Best-effort decrement; a failed or skipped decrement leaves the
	/// ranking slightly stale, which is accepted.
	pub async fn record_unlike(&self, post: &PostId, at: DateTime<Utc>) {
		let day = offset_day(at, self.cfg.like_day_offset_minutes);
		self.cache
			.zincrby(&daily_key(&day.to_string()), -1.0, post.as_str())
			.await;
	}

	/// Top-10 weekly study-time ranking with display data joined in.
	pub async fn weekly_ranking(&self, now: DateTime<Utc>) -> Result<Vec<RankedUser>> {
		let (year, week) = week_bucket(now);
		let key = weekly_key(year, week);

		let mut entries = self.cache.zrevrange_withscores(&key, 0, TOP_N - 1).await;
		if entries.is_empty() {
			metrics::counter!("campus_ranking_fallbacks_total").increment(1);
			debug!(key, "weekly ranking cache cold; recomputing from store");

			let (start, end) = week_window(year, week);
			let totals = self.store.study_totals_in_window(start, end, TOP_N).await?;
			entries = totals
				.iter()
				.map(|(user, minutes)| (user.as_str().to_string(), *minutes as f64))
				.collect();

			self.reseed(&key, &entries).await;
		}

		let user_ids: Vec<UserId> = entries
			.iter()
			.filter_map(|(raw, _)| UserId::new(raw.clone()).ok())
			.collect();
		let summaries = self.store.user_summaries(&user_ids).await?;

		// Ranks are assigned after the join; entries whose display data is
		// gone are dropped rather than failing the response.
		let mut ranked = Vec::with_capacity(entries.len());
		for (raw, score) in entries {
			let Ok(id) = UserId::new(raw) else { continue };
			let Some(user) = summaries.get(&id) else {
				continue;
			};
			ranked.push(RankedUser {
				rank: (ranked.len() + 1) as u32,
				user: user.clone(),
				total_minutes: score.round() as i64,
			});
		}
		Ok(ranked)
	}

	/// Top-10 posts by likes received in the current (offset) day.
	pub async fn daily_like_ranking(&self, now: DateTime<Utc>) -> Result<Vec<RankedPost>> {
		let day = offset_day(now, self.cfg.like_day_offset_minutes);
		let key = daily_key(&day.to_string());

		let mut entries = self.cache.zrevrange_withscores(&key, 0, TOP_N - 1).await;
		if entries.is_empty() {
			metrics::counter!("campus_ranking_fallbacks_total").increment(1);
			debug!(key, "daily like ranking cache cold; recomputing from store");

			let (start, end) = offset_day_window(day, self.cfg.like_day_offset_minutes);
			let totals = self.store.top_liked_in_window(start, end, TOP_N).await?;
			entries = totals
				.iter()
				.map(|(post, likes)| (post.as_str().to_string(), *likes as f64))
				.collect();

			self.reseed(&key, &entries).await;
		}

		let post_ids: Vec<PostId> = entries
			.iter()
			.filter_map(|(raw, _)| PostId::new(raw.clone()).ok())
			.collect();
		let excerpts = self.store.post_excerpts(&post_ids).await?;

		let mut ranked = Vec::with_capacity(entries.len());
		for (raw, score) in entries {
			let Ok(id) = PostId::new(raw) else { continue };
			let Some(excerpt) = excerpts.get(&id) else {
				continue;
			};
			ranked.push(RankedPost {
				rank: (ranked.len() + 1) as u32,
				post_id: id,
				excerpt: excerpt.body.chars().take(EXCERPT_CHARS).collect(),
				likes: score.round() as i64,
			});
		}
		Ok(ranked)
	}

	/// Clear-then-bulk-add with a long expiry as a safety net.
	async fn reseed(&self, key: &str, entries: &[(String, f64)]) {
		if entries.is_empty() {
			return;
		}

		let mut ops = vec![CacheOp::Del { key: key.to_string() }];
		for (member, score) in entries {
			ops.push(CacheOp::Zadd {
				key: key.to_string(),
				score: *score,
				member: member.clone(),
			});
		}
		ops.push(CacheOp::Expire {
			key: key.to_string(),
			ttl_secs: self.cfg.reseed_ttl_secs,
		});
		self.cache.pipeline(ops).await;
	}
}

#![forbid(unsafe_code)]

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use campus_cache::{Cache, CacheOp};
use campus_domain::{
	BODY_MAX_CHARS, Comment, CommentId, Error, NotificationKind, Post, PostId, Result, UserId, UserSummary,
};
use campus_realtime::{ConnectionRegistry, ServerEvent};
use campus_store::Store;

use crate::services::hashtags::HashtagService;
use crate::services::notifications::NotificationService;
use crate::services::rankings::RankingService;

/// Post with its author hydrated for display.
#[derive(Debug, Clone, Serialize)]
pub struct PostView {
	#[serde(flatten)]
	pub post: Post,
	pub author: Option<UserSummary>,
}

/// Outcome of the like toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeOutcome {
	Liked,
	Unliked,
}

/// Cached follow-set expiry: a safety net, not the invalidation scheme.
const FOLLOW_SET_TTL_SECS: u64 = 24 * 60 * 60;

fn followers_key(user: &UserId) -> String {
	format!("users:followers:{user}")
}

fn following_key(user: &UserId) -> String {
	format!("users:following:{user}")
}

/// Posts, comments, likes and the follow graph.
///
/// Follow sets are mirrored into cache sets: reads go cache-first and
/// reseed on miss; a follow drops both cached sets (the next read rebuilds
/// them in full), an unfollow removes the member in place.
#[derive(Clone)]
pub struct SocialService {
	store: Store,
	cache: Cache,
	registry: Arc<ConnectionRegistry>,
	notifications: NotificationService,
	rankings: RankingService,
	hashtags: HashtagService,
}

impl SocialService {
	pub fn new(
		store: Store,
		cache: Cache,
		registry: Arc<ConnectionRegistry>,
		notifications: NotificationService,
		rankings: RankingService,
		hashtags: HashtagService,
	) -> Self {
		Self {
			store,
			cache,
			registry,
			notifications,
			rankings,
			hashtags,
		}
	}

	/// Follow: push onto the target's followers, then the actor's
	/// following. Two independent writes; a crash in between leaves the
	/// graph asymmetric until a later compensating action (accepted).
	pub async fn follow(&self, actor: &UserId, target: &UserId) -> Result<()> {
		if actor == target {
			return Err(Error::validation("cannot follow yourself"));
		}

		let Some(target_user) = self.store.find_user(target).await? else {
			return Err(Error::NotFound("user"));
		};
		if self.store.find_user(actor).await?.is_none() {
			return Err(Error::NotFound("user"));
		}

		if target_user.followers.contains(actor) {
			return Err(Error::conflict("already following this user"));
		}

		self.store.add_follower(target, actor).await?;
		self.store.add_following(actor, target).await?;
		metrics::counter!("campus_follows_total").increment(1);

		// Drop both cached sets; the next read reseeds them in full. An
		// in-place add could resurrect a partially-built set.
		let cache = self.cache.clone();
		let (followers, following) = (followers_key(target), following_key(actor));
		tokio::spawn(async move {
			cache.del(&followers).await;
			cache.del(&following).await;
		});

		self.notifications
			.notify(actor, target, NotificationKind::Follow, None)
			.await?;
		Ok(())
	}

	pub async fn unfollow(&self, actor: &UserId, target: &UserId) -> Result<()> {
		if actor == target {
			return Err(Error::validation("cannot unfollow yourself"));
		}

		let Some(target_user) = self.store.find_user(target).await? else {
			return Err(Error::NotFound("user"));
		};

		if !target_user.followers.contains(actor) {
			return Err(Error::conflict("not following this user"));
		}

		self.store.remove_follower(target, actor).await?;
		self.store.remove_following(actor, target).await?;

		// Removing from a full cached set keeps it correct; removing from
		// an absent one is a no-op.
		let cache = self.cache.clone();
		let (followers, following) = (followers_key(target), following_key(actor));
		let (actor, target) = (actor.clone(), target.clone());
		tokio::spawn(async move {
			cache.srem(&followers, actor.as_str()).await;
			cache.srem(&following, target.as_str()).await;
		});

		Ok(())
	}

	/// The accounts a user follows, hydrated.
	pub async fn friends(&self, user: &UserId) -> Result<Vec<UserSummary>> {
		let ids = self.following_ids(user).await?;
		let summaries = self.store.user_summaries(&ids).await?;
		Ok(ids.iter().filter_map(|id| summaries.get(id).cloned()).collect())
	}

	pub async fn followers(&self, user: &UserId) -> Result<Vec<UserSummary>> {
		let ids = self.follower_ids(user).await?;
		let summaries = self.store.user_summaries(&ids).await?;
		Ok(ids.iter().filter_map(|id| summaries.get(id).cloned()).collect())
	}

	/// Cache-first read of a follow set; a miss loads the user row and
	/// reseeds the set as a detached task.
	async fn following_ids(&self, user: &UserId) -> Result<Vec<UserId>> {
		let key = following_key(user);
		let cached = self.cache.smembers(&key).await;
		if !cached.is_empty() {
			metrics::counter!("campus_follow_set_cache_hits_total").increment(1);
			return Ok(cached.into_iter().filter_map(|raw| UserId::new(raw).ok()).collect());
		}

		let Some(row) = self.store.find_user(user).await? else {
			return Err(Error::NotFound("user"));
		};
		self.reseed_follow_set(key, row.following.clone());
		Ok(row.following)
	}

	async fn follower_ids(&self, user: &UserId) -> Result<Vec<UserId>> {
		let key = followers_key(user);
		let cached = self.cache.smembers(&key).await;
		if !cached.is_empty() {
			metrics::counter!("campus_follow_set_cache_hits_total").increment(1);
			return Ok(cached.into_iter().filter_map(|raw| UserId::new(raw).ok()).collect());
		}

		let Some(row) = self.store.find_user(user).await? else {
			return Err(Error::NotFound("user"));
		};
		self.reseed_follow_set(key, row.followers.clone());
		Ok(row.followers)
	}

	fn reseed_follow_set(&self, key: String, ids: Vec<UserId>) {
		if ids.is_empty() {
			return;
		}

		let cache = self.cache.clone();
		tokio::spawn(async move {
			let mut ops = vec![CacheOp::Del { key: key.clone() }];
			for id in &ids {
				ops.push(CacheOp::Sadd {
					key: key.clone(),
					member: id.as_str().to_string(),
				});
			}
			ops.push(CacheOp::Expire {
				key,
				ttl_secs: FOLLOW_SET_TTL_SECS,
			});
			cache.pipeline(ops).await;
		});
	}

	/// Create a post, count its hashtags, and fan out a new-post event to
	/// every online follower.
	pub async fn create_post(&self, author: &UserId, text: String, media: Option<String>) -> Result<Post> {
		if text.trim().is_empty() {
			return Err(Error::validation("post text must be non-empty"));
		}
		if text.chars().count() > BODY_MAX_CHARS {
			return Err(Error::validation(format!("post text exceeds {BODY_MAX_CHARS} characters")));
		}

		let Some(author_user) = self.store.find_user(author).await? else {
			return Err(Error::NotFound("user"));
		};

		let post = Post {
			id: PostId::generate(),
			user_id: author.clone(),
			text,
			media,
			likes: Vec::new(),
			comment_count: 0,
			created_at: Utc::now(),
		};
		self.store.insert_post(&post).await?;
		metrics::counter!("campus_posts_total").increment(1);

		self.hashtags.record_post_tags(&post.text, post.created_at).await;

		for follower in &author_user.followers {
			let delivered = self.registry.send_to_user(
				follower,
				ServerEvent::NewPost {
					username: author_user.username.clone(),
					profile_picture: author_user.profile_picture.clone(),
					post_id: post.id.clone(),
				},
			);
			if !delivered {
				debug!(follower = %follower, "follower offline; new-post event dropped");
			}
		}

		Ok(post)
	}

	pub async fn get_post(&self, id: &PostId) -> Result<Post> {
		self.store.find_post(id).await?.ok_or(Error::NotFound("post"))
	}

	pub async fn update_post(&self, id: &PostId, acting: &UserId, text: String, media: Option<String>) -> Result<()> {
		let Some(post) = self.store.find_post(id).await? else {
			return Err(Error::NotFound("post"));
		};
		if &post.user_id != acting {
			return Err(Error::authorization("you can update only your own post"));
		}
		if text.trim().is_empty() {
			return Err(Error::validation("post text must be non-empty"));
		}

		self.store.update_post_body(id, &text, media.as_deref()).await?;
		Ok(())
	}

	pub async fn delete_post(&self, id: &PostId, acting: &UserId) -> Result<()> {
		let Some(post) = self.store.find_post(id).await? else {
			return Err(Error::NotFound("post"));
		};
		if &post.user_id != acting {
			return Err(Error::authorization("you can delete only your own post"));
		}
		self.store.delete_post(id).await?;
		Ok(())
	}

	/// Membership toggle on the like set. A fresh like notifies the post
	/// owner and bumps the daily ranking; an unlike decrements it.
	pub async fn toggle_like(&self, id: &PostId, acting: &UserId) -> Result<LikeOutcome> {
		let Some(post) = self.store.find_post(id).await? else {
			return Err(Error::NotFound("post"));
		};

		let now = Utc::now();
		if self.store.add_like(id, acting, now).await? {
			metrics::counter!("campus_likes_total").increment(1);
			self.rankings.record_like(id, now).await;
			self.notifications
				.notify(acting, &post.user_id, NotificationKind::Like, Some(id.clone()))
				.await?;
			return Ok(LikeOutcome::Liked);
		}

		self.store.remove_like(id, acting).await?;
		self.rankings.record_unlike(id, now).await;
		Ok(LikeOutcome::Unliked)
	}

	/// Comment: insert, bump the denormalized counter, notify the owner.
	pub async fn add_comment(
		&self,
		post_id: &PostId,
		acting: &UserId,
		text: String,
		media: Option<String>,
	) -> Result<Comment> {
		if text.trim().is_empty() {
			return Err(Error::validation("comment text must be non-empty"));
		}
		if text.chars().count() > BODY_MAX_CHARS {
			return Err(Error::validation(format!(
				"comment text exceeds {BODY_MAX_CHARS} characters"
			)));
		}

		let Some(post) = self.store.find_post(post_id).await? else {
			return Err(Error::NotFound("post"));
		};

		let comment = Comment {
			id: CommentId::generate(),
			post_id: post_id.clone(),
			user_id: acting.clone(),
			text,
			media,
			created_at: Utc::now(),
		};
		self.store.insert_comment(&comment).await?;
		self.store.bump_comment_count(post_id, 1).await?;
		metrics::counter!("campus_comments_total").increment(1);

		self.notifications
			.notify(acting, &post.user_id, NotificationKind::Comment, Some(post_id.clone()))
			.await?;
		Ok(comment)
	}

	pub async fn comments(&self, post_id: &PostId) -> Result<Vec<Comment>> {
		Ok(self.store.comments_for_post(post_id).await?)
	}

	/// Comment author only; keeps the counter in step.
	pub async fn delete_comment(&self, post_id: &PostId, comment_id: &CommentId, acting: &UserId) -> Result<()> {
		let Some(comment) = self.store.find_comment(comment_id).await? else {
			return Err(Error::NotFound("comment"));
		};
		if &comment.user_id != acting {
			return Err(Error::authorization("you can delete only your own comment"));
		}

		self.store.delete_comment(comment_id).await?;
		self.store.bump_comment_count(post_id, -1).await?;
		Ok(())
	}

	pub async fn timeline(&self) -> Result<Vec<PostView>> {
		let posts = self.store.timeline(100).await?;
		self.hydrate_posts(posts).await
	}

	pub async fn profile_posts(&self, username: &str) -> Result<Vec<PostView>> {
		let Some(user) = self.store.find_user_by_username(username).await? else {
			return Err(Error::NotFound("user"));
		};
		let posts = self.store.posts_by_user(&user.id).await?;
		self.hydrate_posts(posts).await
	}

	pub async fn search_posts(&self, query: &str) -> Result<Vec<PostView>> {
		if query.trim().is_empty() {
			return Err(Error::validation("search query must be non-empty"));
		}
		let posts = self.store.search_posts(query, 20).await?;
		self.hydrate_posts(posts).await
	}

	async fn hydrate_posts(&self, posts: Vec<Post>) -> Result<Vec<PostView>> {
		let author_ids: Vec<UserId> = posts.iter().map(|p| p.user_id.clone()).collect();
		let summaries = self.store.user_summaries(&author_ids).await?;
		Ok(posts
			.into_iter()
			.map(|post| PostView {
				author: summaries.get(&post.user_id).cloned(),
				post,
			})
			.collect())
	}
}

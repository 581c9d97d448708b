#![forbid(unsafe_code)]

use std::collections::HashMap;

use anyhow::Context as _;
use chrono::{DateTime, Utc};

use campus_domain::{Comment, CommentId, Post, PostId, UserId};

use crate::Store;

#[derive(sqlx::FromRow)]
struct PostRow {
	id: String,
	user_id: String,
	body: String,
	media: Option<String>,
	comment_count: i64,
	created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CommentRow {
	id: String,
	post_id: String,
	user_id: String,
	body: String,
	media: Option<String>,
	created_at: DateTime<Utc>,
}

impl TryFrom<CommentRow> for Comment {
	type Error = anyhow::Error;

	fn try_from(row: CommentRow) -> Result<Self, Self::Error> {
		Ok(Comment {
			id: CommentId::new(row.id).context("comment id")?,
			post_id: PostId::new(row.post_id).context("post id")?,
			user_id: UserId::new(row.user_id).context("user id")?,
			text: row.body,
			media: row.media,
			created_at: row.created_at,
		})
	}
}

/// Display data joined onto a ranking entry.
#[derive(Debug, Clone)]
pub struct PostExcerpt {
	pub id: PostId,
	pub body: String,
}

const POST_COLUMNS: &str = "id, user_id, body, media, comment_count, created_at";

impl Store {
	async fn hydrate_post(&self, row: PostRow) -> anyhow::Result<Post> {
		let id = PostId::new(row.id).context("post id")?;
		let likes = self.likes_for(&id).await?;
		Ok(Post {
			id,
			user_id: UserId::new(row.user_id).context("user id")?,
			text: row.body,
			media: row.media,
			likes,
			comment_count: row.comment_count,
			created_at: row.created_at,
		})
	}

	async fn hydrate_posts(&self, rows: Vec<PostRow>) -> anyhow::Result<Vec<Post>> {
		let mut posts = Vec::with_capacity(rows.len());
		for row in rows {
			posts.push(self.hydrate_post(row).await?);
		}
		Ok(posts)
	}

	pub async fn insert_post(&self, post: &Post) -> anyhow::Result<()> {
		sqlx::query("INSERT INTO posts (id, user_id, body, media, comment_count, created_at) VALUES (?, ?, ?, ?, ?, ?)")
			.bind(post.id.as_str())
			.bind(post.user_id.as_str())
			.bind(&post.text)
			.bind(&post.media)
			.bind(post.comment_count)
			.bind(post.created_at)
			.execute(&self.pool)
			.await
			.context("insert post")?;
		Ok(())
	}

	pub async fn find_post(&self, id: &PostId) -> anyhow::Result<Option<Post>> {
		let row: Option<PostRow> = sqlx::query_as(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?"))
			.bind(id.as_str())
			.fetch_optional(&self.pool)
			.await
			.context("select post")?;
		match row {
			Some(row) => Ok(Some(self.hydrate_post(row).await?)),
			None => Ok(None),
		}
	}

	pub async fn update_post_body(&self, id: &PostId, body: &str, media: Option<&str>) -> anyhow::Result<()> {
		sqlx::query("UPDATE posts SET body = ?, media = COALESCE(?, media) WHERE id = ?")
			.bind(body)
			.bind(media)
			.bind(id.as_str())
			.execute(&self.pool)
			.await
			.context("update post")?;
		Ok(())
	}

	pub async fn delete_post(&self, id: &PostId) -> anyhow::Result<()> {
		sqlx::query("DELETE FROM posts WHERE id = ?")
			.bind(id.as_str())
			.execute(&self.pool)
			.await
			.context("delete post")?;
		sqlx::query("DELETE FROM post_likes WHERE post_id = ?")
			.bind(id.as_str())
			.execute(&self.pool)
			.await
			.context("delete post likes")?;
		Ok(())
	}

	pub async fn timeline(&self, limit: i64) -> anyhow::Result<Vec<Post>> {
		let rows: Vec<PostRow> = sqlx::query_as(&format!(
			"SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC LIMIT ?"
		))
		.bind(limit)
		.fetch_all(&self.pool)
		.await
		.context("select timeline")?;
		self.hydrate_posts(rows).await
	}

	pub async fn posts_by_user(&self, user_id: &UserId) -> anyhow::Result<Vec<Post>> {
		let rows: Vec<PostRow> = sqlx::query_as(&format!(
			"SELECT {POST_COLUMNS} FROM posts WHERE user_id = ? ORDER BY created_at DESC"
		))
		.bind(user_id.as_str())
		.fetch_all(&self.pool)
		.await
		.context("select posts by user")?;
		self.hydrate_posts(rows).await
	}

	pub async fn search_posts(&self, query: &str, limit: i64) -> anyhow::Result<Vec<Post>> {
		let rows: Vec<PostRow> = sqlx::query_as(&format!(
			"SELECT {POST_COLUMNS} FROM posts WHERE body LIKE ? ORDER BY created_at DESC LIMIT ?"
		))
		.bind(format!("%{query}%"))
		.bind(limit)
		.fetch_all(&self.pool)
		.await
		.context("search posts")?;
		self.hydrate_posts(rows).await
	}

	pub async fn likes_for(&self, post_id: &PostId) -> anyhow::Result<Vec<UserId>> {
		let rows: Vec<(String,)> =
			sqlx::query_as("SELECT user_id FROM post_likes WHERE post_id = ? ORDER BY created_at")
				.bind(post_id.as_str())
				.fetch_all(&self.pool)
				.await
				.context("select likes")?;
		let mut likes = Vec::with_capacity(rows.len());
		for (id,) in rows {
			likes.push(UserId::new(id).context("user id")?);
		}
		Ok(likes)
	}

	/// Insert a like; returns false when the user already liked the post.
	pub async fn add_like(&self, post_id: &PostId, user_id: &UserId, at: DateTime<Utc>) -> anyhow::Result<bool> {
		let result = sqlx::query("INSERT OR IGNORE INTO post_likes (post_id, user_id, created_at) VALUES (?, ?, ?)")
			.bind(post_id.as_str())
			.bind(user_id.as_str())
			.bind(at)
			.execute(&self.pool)
			.await
			.context("insert like")?;
		Ok(result.rows_affected() > 0)
	}

	/// Remove a like; returns false when there was none.
	pub async fn remove_like(&self, post_id: &PostId, user_id: &UserId) -> anyhow::Result<bool> {
		let result = sqlx::query("DELETE FROM post_likes WHERE post_id = ? AND user_id = ?")
			.bind(post_id.as_str())
			.bind(user_id.as_str())
			.execute(&self.pool)
			.await
			.context("delete like")?;
		Ok(result.rows_affected() > 0)
	}

	/// Atomic field increment on the denormalized comment counter.
	pub async fn bump_comment_count(&self, post_id: &PostId, delta: i64) -> anyhow::Result<()> {
		sqlx::query("UPDATE posts SET comment_count = MAX(0, comment_count + ?) WHERE id = ?")
			.bind(delta)
			.bind(post_id.as_str())
			.execute(&self.pool)
			.await
			.context("bump comment count")?;
		Ok(())
	}

	pub async fn insert_comment(&self, comment: &Comment) -> anyhow::Result<()> {
		sqlx::query("INSERT INTO comments (id, post_id, user_id, body, media, created_at) VALUES (?, ?, ?, ?, ?, ?)")
			.bind(comment.id.as_str())
			.bind(comment.post_id.as_str())
			.bind(comment.user_id.as_str())
			.bind(&comment.text)
			.bind(&comment.media)
			.bind(comment.created_at)
			.execute(&self.pool)
			.await
			.context("insert comment")?;
		Ok(())
	}

	pub async fn find_comment(&self, id: &CommentId) -> anyhow::Result<Option<Comment>> {
		let row: Option<CommentRow> =
			sqlx::query_as("SELECT id, post_id, user_id, body, media, created_at FROM comments WHERE id = ?")
				.bind(id.as_str())
				.fetch_optional(&self.pool)
				.await
				.context("select comment")?;
		row.map(Comment::try_from).transpose()
	}

	pub async fn comments_for_post(&self, post_id: &PostId) -> anyhow::Result<Vec<Comment>> {
		let rows: Vec<CommentRow> = sqlx::query_as(
			"SELECT id, post_id, user_id, body, media, created_at FROM comments WHERE post_id = ? ORDER BY created_at DESC",
		)
		.bind(post_id.as_str())
		.fetch_all(&self.pool)
		.await
		.context("select comments")?;
		rows.into_iter().map(Comment::try_from).collect()
	}

	pub async fn delete_comment(&self, id: &CommentId) -> anyhow::Result<()> {
		sqlx::query("DELETE FROM comments WHERE id = ?")
			.bind(id.as_str())
			.execute(&self.pool)
			.await
			.context("delete comment")?;
		Ok(())
	}

	/// Aggregation rollup: posts ranked by likes received inside a window.
	pub async fn top_liked_in_window(
		&self,
		start: DateTime<Utc>,
		end: DateTime<Utc>,
		limit: i64,
	) -> anyhow::Result<Vec<(PostId, i64)>> {
		let rows: Vec<(String, i64)> = sqlx::query_as(
			"SELECT post_id, COUNT(*) AS likes FROM post_likes \
			WHERE created_at >= ? AND created_at < ? \
			GROUP BY post_id ORDER BY likes DESC, post_id LIMIT ?",
		)
		.bind(start)
		.bind(end)
		.bind(limit)
		.fetch_all(&self.pool)
		.await
		.context("aggregate likes")?;

		let mut out = Vec::with_capacity(rows.len());
		for (id, likes) in rows {
			out.push((PostId::new(id).context("post id")?, likes));
		}
		Ok(out)
	}

	/// Populate pattern: excerpt bodies for a set of post ids; missing posts
	/// are skipped.
	pub async fn post_excerpts(&self, ids: &[PostId]) -> anyhow::Result<HashMap<PostId, PostExcerpt>> {
		let mut out = HashMap::with_capacity(ids.len());
		for id in ids {
			let row: Option<(String,)> = sqlx::query_as("SELECT body FROM posts WHERE id = ?")
				.bind(id.as_str())
				.fetch_optional(&self.pool)
				.await
				.context("select post excerpt")?;
			if let Some((body,)) = row {
				out.insert(id.clone(), PostExcerpt { id: id.clone(), body });
			}
		}
		Ok(out)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_store;

	fn post(id: &str, user: &str, body: &str) -> Post {
		Post {
			id: PostId::new(id).unwrap(),
			user_id: UserId::new(user).unwrap(),
			text: body.to_string(),
			media: None,
			likes: Vec::new(),
			comment_count: 0,
			created_at: Utc::now(),
		}
	}

	#[tokio::test]
	async fn like_toggle_is_set_semantics() {
		let store = test_store().await;
		store.insert_post(&post("p1", "u1", "hello")).await.unwrap();

		let pid = PostId::new("p1").unwrap();
		let liker = UserId::new("u2").unwrap();

		assert!(store.add_like(&pid, &liker, Utc::now()).await.unwrap());
		assert!(!store.add_like(&pid, &liker, Utc::now()).await.unwrap());

		let loaded = store.find_post(&pid).await.unwrap().unwrap();
		assert_eq!(loaded.likes, vec![liker.clone()]);

		assert!(store.remove_like(&pid, &liker).await.unwrap());
		assert!(!store.remove_like(&pid, &liker).await.unwrap());
	}

	#[tokio::test]
	async fn comment_counter_never_goes_negative() {
		let store = test_store().await;
		store.insert_post(&post("p1", "u1", "hello")).await.unwrap();
		let pid = PostId::new("p1").unwrap();

		store.bump_comment_count(&pid, 1).await.unwrap();
		store.bump_comment_count(&pid, -1).await.unwrap();
		store.bump_comment_count(&pid, -1).await.unwrap();

		let loaded = store.find_post(&pid).await.unwrap().unwrap();
		assert_eq!(loaded.comment_count, 0);
	}

	#[tokio::test]
	async fn window_aggregation_ranks_by_like_count() {
		let store = test_store().await;
		store.insert_post(&post("p1", "u1", "one")).await.unwrap();
		store.insert_post(&post("p2", "u1", "two")).await.unwrap();

		let now = Utc::now();
		let p1 = PostId::new("p1").unwrap();
		let p2 = PostId::new("p2").unwrap();
		for liker in ["a", "b", "c"] {
			store.add_like(&p2, &UserId::new(liker).unwrap(), now).await.unwrap();
		}
		store.add_like(&p1, &UserId::new("a").unwrap(), now).await.unwrap();

		let start = now - chrono::Duration::hours(1);
		let end = now + chrono::Duration::hours(1);
		let top = store.top_liked_in_window(start, end, 10).await.unwrap();
		assert_eq!(top, vec![(p2, 3), (p1, 1)]);
	}
}

#![forbid(unsafe_code)]

use std::collections::HashMap;

use anyhow::Context as _;
use chrono::{DateTime, Utc};

use campus_domain::{User, UserId, UserSummary};

use crate::{Store, ids_from_json, ids_to_json};

#[derive(sqlx::FromRow)]
struct UserRow {
	id: String,
	username: String,
	email: String,
	password_hash: Option<String>,
	google_id: Option<String>,
	access_token: Option<String>,
	refresh_token: Option<String>,
	profile_picture: Option<String>,
	cover_picture: Option<String>,
	bio: Option<String>,
	background_color: Option<String>,
	font: Option<String>,
	followers: String,
	following: String,
	device_token: Option<String>,
	created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
	type Error = anyhow::Error;

	fn try_from(row: UserRow) -> Result<Self, Self::Error> {
		Ok(User {
			id: UserId::new(row.id).context("user id")?,
			username: row.username,
			email: row.email,
			password_hash: row.password_hash,
			google_id: row.google_id,
			access_token: row.access_token,
			refresh_token: row.refresh_token,
			profile_picture: row.profile_picture,
			cover_picture: row.cover_picture,
			bio: row.bio,
			background_color: row.background_color,
			font: row.font,
			followers: ids_from_json(&row.followers),
			following: ids_from_json(&row.following),
			device_token: row.device_token,
			created_at: row.created_at,
		})
	}
}

const USER_COLUMNS: &str = "id, username, email, password_hash, google_id, access_token, refresh_token, \
	profile_picture, cover_picture, bio, background_color, font, followers, following, device_token, created_at";

/// Profile fields updatable through the settings surface.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
	pub profile_picture: Option<String>,
	pub cover_picture: Option<String>,
	pub bio: Option<String>,
	pub background_color: Option<String>,
	pub font: Option<String>,
}

impl Store {
	pub async fn insert_user(&self, user: &User) -> anyhow::Result<()> {
		sqlx::query(
			"INSERT INTO users (id, username, email, password_hash, google_id, access_token, refresh_token, \
			profile_picture, cover_picture, bio, background_color, font, followers, following, device_token, created_at) \
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(user.id.as_str())
		.bind(&user.username)
		.bind(&user.email)
		.bind(&user.password_hash)
		.bind(&user.google_id)
		.bind(&user.access_token)
		.bind(&user.refresh_token)
		.bind(&user.profile_picture)
		.bind(&user.cover_picture)
		.bind(&user.bio)
		.bind(&user.background_color)
		.bind(&user.font)
		.bind(ids_to_json(&user.followers))
		.bind(ids_to_json(&user.following))
		.bind(&user.device_token)
		.bind(user.created_at)
		.execute(&self.pool)
		.await
		.context("insert user")?;
		Ok(())
	}

	pub async fn find_user(&self, id: &UserId) -> anyhow::Result<Option<User>> {
		let row: Option<UserRow> = sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
			.bind(id.as_str())
			.fetch_optional(&self.pool)
			.await
			.context("select user by id")?;
		row.map(User::try_from).transpose()
	}

	pub async fn find_user_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
		let row: Option<UserRow> = sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?"))
			.bind(username)
			.fetch_optional(&self.pool)
			.await
			.context("select user by username")?;
		row.map(User::try_from).transpose()
	}

	pub async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
		let row: Option<UserRow> = sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
			.bind(email)
			.fetch_optional(&self.pool)
			.await
			.context("select user by email")?;
		row.map(User::try_from).transpose()
	}

	pub async fn find_user_by_google_id(&self, google_id: &str) -> anyhow::Result<Option<User>> {
		let row: Option<UserRow> = sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE google_id = ?"))
			.bind(google_id)
			.fetch_optional(&self.pool)
			.await
			.context("select user by google id")?;
		row.map(User::try_from).transpose()
	}

	pub async fn update_user_profile(&self, id: &UserId, patch: &UserPatch) -> anyhow::Result<()> {
		sqlx::query(
			"UPDATE users SET \
			profile_picture = COALESCE(?, profile_picture), \
			cover_picture = COALESCE(?, cover_picture), \
			bio = COALESCE(?, bio), \
			background_color = COALESCE(?, background_color), \
			font = COALESCE(?, font) \
			WHERE id = ?",
		)
		.bind(&patch.profile_picture)
		.bind(&patch.cover_picture)
		.bind(&patch.bio)
		.bind(&patch.background_color)
		.bind(&patch.font)
		.bind(id.as_str())
		.execute(&self.pool)
		.await
		.context("update user profile")?;
		Ok(())
	}

	/// Persist refreshed federated tokens back onto the user row.
	pub async fn update_user_tokens(
		&self,
		id: &UserId,
		access_token: &str,
		refresh_token: Option<&str>,
	) -> anyhow::Result<()> {
		sqlx::query("UPDATE users SET access_token = ?, refresh_token = COALESCE(?, refresh_token) WHERE id = ?")
			.bind(access_token)
			.bind(refresh_token)
			.bind(id.as_str())
			.execute(&self.pool)
			.await
			.context("update user tokens")?;
		Ok(())
	}

	pub async fn set_device_token(&self, id: &UserId, token: Option<&str>) -> anyhow::Result<()> {
		sqlx::query("UPDATE users SET device_token = ? WHERE id = ?")
			.bind(token)
			.bind(id.as_str())
			.execute(&self.pool)
			.await
			.context("set device token")?;
		Ok(())
	}

	pub async fn search_users(&self, query: &str, limit: i64) -> anyhow::Result<Vec<UserSummary>> {
		let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
			"SELECT id, username, profile_picture FROM users WHERE username LIKE ? ORDER BY username LIMIT ?",
		)
		.bind(format!("%{}%", query.replace('%', "").replace('_', "")))
		.bind(limit)
		.fetch_all(&self.pool)
		.await
		.context("search users")?;

		let mut out = Vec::with_capacity(rows.len());
		for (id, username, profile_picture) in rows {
			out.push(UserSummary {
				id: UserId::new(id).context("user id")?,
				username,
				profile_picture,
			});
		}
		Ok(out)
	}

	/// Populate pattern: hydrate display fields for a set of user ids with
	/// per-id lookups; ids that no longer resolve are skipped.
	pub async fn user_summaries(&self, ids: &[UserId]) -> anyhow::Result<HashMap<UserId, UserSummary>> {
		let mut out = HashMap::with_capacity(ids.len());
		for id in ids {
			let row: Option<(String, Option<String>)> =
				sqlx::query_as("SELECT username, profile_picture FROM users WHERE id = ?")
					.bind(id.as_str())
					.fetch_optional(&self.pool)
					.await
					.context("select user summary")?;
			if let Some((username, profile_picture)) = row {
				out.insert(
					id.clone(),
					UserSummary {
						id: id.clone(),
						username,
						profile_picture,
					},
				);
			}
		}
		Ok(out)
	}

	/// Push `follower` into `target`'s follower array (idempotent).
	pub async fn add_follower(&self, target: &UserId, follower: &UserId) -> anyhow::Result<()> {
		self.mutate_id_array(target, "followers", follower, true).await
	}

	pub async fn remove_follower(&self, target: &UserId, follower: &UserId) -> anyhow::Result<()> {
		self.mutate_id_array(target, "followers", follower, false).await
	}

	pub async fn add_following(&self, actor: &UserId, target: &UserId) -> anyhow::Result<()> {
		self.mutate_id_array(actor, "following", target, true).await
	}

	pub async fn remove_following(&self, actor: &UserId, target: &UserId) -> anyhow::Result<()> {
		self.mutate_id_array(actor, "following", target, false).await
	}

	async fn mutate_id_array(&self, row: &UserId, column: &str, member: &UserId, insert: bool) -> anyhow::Result<()> {
		let current: Option<(String,)> = sqlx::query_as(&format!("SELECT {column} FROM users WHERE id = ?"))
			.bind(row.as_str())
			.fetch_optional(&self.pool)
			.await
			.with_context(|| format!("select {column}"))?;
		let Some((raw,)) = current else {
			return Ok(());
		};

		let mut ids = ids_from_json(&raw);
		if insert {
			if !ids.contains(member) {
				ids.push(member.clone());
			}
		} else {
			ids.retain(|id| id != member);
		}

		sqlx::query(&format!("UPDATE users SET {column} = ? WHERE id = ?"))
			.bind(ids_to_json(&ids))
			.bind(row.as_str())
			.execute(&self.pool)
			.await
			.with_context(|| format!("update {column}"))?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_store;

	fn user(id: &str, username: &str) -> User {
		User {
			id: UserId::new(id).unwrap(),
			username: username.to_string(),
			email: format!("{username}@example.com"),
			password_hash: None,
			google_id: None,
			access_token: None,
			refresh_token: None,
			profile_picture: None,
			cover_picture: None,
			bio: None,
			background_color: None,
			font: None,
			followers: Vec::new(),
			following: Vec::new(),
			device_token: None,
			created_at: Utc::now(),
		}
	}

	#[tokio::test]
	async fn insert_and_find_roundtrip() {
		let store = test_store().await;
		store.insert_user(&user("u1", "alice")).await.unwrap();

		let found = store.find_user(&UserId::new("u1").unwrap()).await.unwrap().unwrap();
		assert_eq!(found.username, "alice");
		assert!(found.followers.is_empty());

		assert!(store.find_user(&UserId::new("nope").unwrap()).await.unwrap().is_none());
		assert!(store.find_user_by_username("alice").await.unwrap().is_some());
	}

	#[tokio::test]
	async fn follow_arrays_stay_deduplicated() {
		let store = test_store().await;
		store.insert_user(&user("u1", "alice")).await.unwrap();
		store.insert_user(&user("u2", "bob")).await.unwrap();

		let alice = UserId::new("u1").unwrap();
		let bob = UserId::new("u2").unwrap();

		store.add_follower(&alice, &bob).await.unwrap();
		store.add_follower(&alice, &bob).await.unwrap();
		store.add_following(&bob, &alice).await.unwrap();

		let loaded = store.find_user(&alice).await.unwrap().unwrap();
		assert_eq!(loaded.followers, vec![bob.clone()]);

		let loaded = store.find_user(&bob).await.unwrap().unwrap();
		assert_eq!(loaded.following, vec![alice.clone()]);

		store.remove_follower(&alice, &bob).await.unwrap();
		let loaded = store.find_user(&alice).await.unwrap().unwrap();
		assert!(loaded.followers.is_empty());
	}

	#[tokio::test]
	async fn summaries_skip_unresolvable_ids() {
		let store = test_store().await;
		store.insert_user(&user("u1", "alice")).await.unwrap();

		let ids = vec![UserId::new("u1").unwrap(), UserId::new("ghost").unwrap()];
		let summaries = store.user_summaries(&ids).await.unwrap();
		assert_eq!(summaries.len(), 1);
		assert_eq!(summaries[&ids[0]].username, "alice");
	}
}

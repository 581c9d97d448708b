#![forbid(unsafe_code)]

mod conversations;
mod hashtags;
mod learning;
mod messages;
mod notes;
mod notifications;
mod posts;
mod users;

use std::str::FromStr as _;

use anyhow::Context as _;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use campus_domain::UserId;

pub use posts::PostExcerpt;
pub use users::UserPatch;

/// Durable-store boundary.
///
/// A document-oriented usage of SQLite: aggregate-valued fields (member
/// lists, unread counters, attachments, follow arrays) live as JSON columns
/// on their owning row, cross-aggregate hydration goes through explicit
/// secondary queries, and nothing joins across aggregates in SQL.
#[derive(Clone)]
pub struct Store {
	pool: SqlitePool,
}

impl Store {
	/// Connect and run migrations.
	pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
		let options = SqliteConnectOptions::from_str(database_url)
			.context("parse database url")?
			.create_if_missing(true);

		// An in-memory database exists per connection; a pool of them would
		// be several disjoint databases.
		let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
		let pool = SqlitePoolOptions::new()
			.max_connections(max_connections)
			.connect_with(options)
			.await
			.context("connect sqlite")?;

		sqlx::migrate!("./migrations").run(&pool).await.context("run migrations")?;
		Ok(Self { pool })
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}
}

pub(crate) fn ids_to_json(ids: &[UserId]) -> String {
	serde_json::to_string(ids).unwrap_or_else(|_| "[]".to_string())
}

pub(crate) fn ids_from_json(raw: &str) -> Vec<UserId> {
	serde_json::from_str(raw).unwrap_or_default()
}

#[cfg(test)]
pub(crate) async fn test_store() -> Store {
	Store::connect("sqlite::memory:").await.expect("in-memory store")
}

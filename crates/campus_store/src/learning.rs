#![forbid(unsafe_code)]

use anyhow::Context as _;
use chrono::{DateTime, Utc};

use campus_domain::{LearningSession, SessionId, UserId};

use crate::Store;

#[derive(sqlx::FromRow)]
struct SessionRow {
	id: String,
	user_id: String,
	subject: String,
	started_at: DateTime<Utc>,
	ended_at: Option<DateTime<Utc>>,
	duration_minutes: i64,
	active: bool,
}

impl TryFrom<SessionRow> for LearningSession {
	type Error = anyhow::Error;

	fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
		Ok(LearningSession {
			id: SessionId::new(row.id).context("session id")?,
			user_id: UserId::new(row.user_id).context("user id")?,
			subject: row.subject,
			started_at: row.started_at,
			ended_at: row.ended_at,
			duration_minutes: row.duration_minutes,
			active: row.active,
		})
	}
}

const SESSION_COLUMNS: &str = "id, user_id, subject, started_at, ended_at, duration_minutes, active";

impl Store {
	pub async fn insert_session(&self, session: &LearningSession) -> anyhow::Result<()> {
		sqlx::query(
			"INSERT INTO learning_sessions (id, user_id, subject, started_at, ended_at, duration_minutes, active) \
			VALUES (?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(session.id.as_str())
		.bind(session.user_id.as_str())
		.bind(&session.subject)
		.bind(session.started_at)
		.bind(session.ended_at)
		.bind(session.duration_minutes)
		.bind(session.active)
		.execute(&self.pool)
		.await
		.context("insert learning session")?;
		Ok(())
	}

	/// The user's active session, if one exists.
	pub async fn active_session(&self, user: &UserId) -> anyhow::Result<Option<LearningSession>> {
		let row: Option<SessionRow> = sqlx::query_as(&format!(
			"SELECT {SESSION_COLUMNS} FROM learning_sessions WHERE user_id = ? AND active = 1 LIMIT 1"
		))
		.bind(user.as_str())
		.fetch_optional(&self.pool)
		.await
		.context("select active session")?;
		row.map(LearningSession::try_from).transpose()
	}

	pub async fn finish_session(
		&self,
		id: &SessionId,
		ended_at: DateTime<Utc>,
		duration_minutes: i64,
	) -> anyhow::Result<()> {
		sqlx::query("UPDATE learning_sessions SET ended_at = ?, duration_minutes = ?, active = 0 WHERE id = ?")
			.bind(ended_at)
			.bind(duration_minutes)
			.bind(id.as_str())
			.execute(&self.pool)
			.await
			.context("finish learning session")?;
		Ok(())
	}

	/// Finished sessions for a user, newest first, optionally bounded.
	pub async fn sessions_for_user(
		&self,
		user: &UserId,
		since: Option<DateTime<Utc>>,
		until: Option<DateTime<Utc>>,
		limit: i64,
	) -> anyhow::Result<Vec<LearningSession>> {
		let mut qb = sqlx::QueryBuilder::new(format!(
			"SELECT {SESSION_COLUMNS} FROM learning_sessions WHERE user_id = "
		));
		qb.push_bind(user.as_str());
		qb.push(" AND active = 0");
		if let Some(since) = since {
			qb.push(" AND started_at >= ");
			qb.push_bind(since);
		}
		if let Some(until) = until {
			qb.push(" AND started_at <= ");
			qb.push_bind(until);
		}
		qb.push(" ORDER BY started_at DESC LIMIT ");
		qb.push_bind(limit);

		let rows: Vec<SessionRow> = qb
			.build_query_as()
			.fetch_all(&self.pool)
			.await
			.context("select sessions for user")?;
		rows.into_iter().map(LearningSession::try_from).collect()
	}

	/// Aggregation rollup: total finished minutes per user inside a window,
	/// descending.
	pub async fn study_totals_in_window(
		&self,
		start: DateTime<Utc>,
		end: DateTime<Utc>,
		limit: i64,
	) -> anyhow::Result<Vec<(UserId, i64)>> {
		let rows: Vec<(String, i64)> = sqlx::query_as(
			"SELECT user_id, SUM(duration_minutes) AS total FROM learning_sessions \
			WHERE active = 0 AND started_at >= ? AND started_at < ? \
			GROUP BY user_id ORDER BY total DESC, user_id LIMIT ?",
		)
		.bind(start)
		.bind(end)
		.bind(limit)
		.fetch_all(&self.pool)
		.await
		.context("aggregate study totals")?;

		let mut out = Vec::with_capacity(rows.len());
		for (id, total) in rows {
			out.push((UserId::new(id).context("user id")?, total));
		}
		Ok(out)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_store;

	fn session(id: &str, user: &str, started_at: DateTime<Utc>) -> LearningSession {
		LearningSession {
			id: SessionId::new(id).unwrap(),
			user_id: UserId::new(user).unwrap(),
			subject: "math".to_string(),
			started_at,
			ended_at: None,
			duration_minutes: 0,
			active: true,
		}
	}

	#[tokio::test]
	async fn active_session_lifecycle() {
		let store = test_store().await;
		let now = Utc::now();
		store.insert_session(&session("s1", "u1", now)).await.unwrap();

		let user = UserId::new("u1").unwrap();
		let active = store.active_session(&user).await.unwrap().unwrap();
		assert!(active.active);

		store
			.finish_session(&SessionId::new("s1").unwrap(), now + chrono::Duration::minutes(25), 25)
			.await
			.unwrap();
		assert!(store.active_session(&user).await.unwrap().is_none());

		let finished = store.sessions_for_user(&user, None, None, 50).await.unwrap();
		assert_eq!(finished.len(), 1);
		assert_eq!(finished[0].duration_minutes, 25);
	}

	#[tokio::test]
	async fn totals_group_and_sort_by_minutes() {
		let store = test_store().await;
		let now = Utc::now();

		store.insert_session(&session("s1", "u1", now)).await.unwrap();
		store.insert_session(&session("s2", "u1", now)).await.unwrap();
		store.insert_session(&session("s3", "u2", now)).await.unwrap();
		store.finish_session(&SessionId::new("s1").unwrap(), now, 30).await.unwrap();
		store.finish_session(&SessionId::new("s2").unwrap(), now, 15).await.unwrap();
		store.finish_session(&SessionId::new("s3").unwrap(), now, 40).await.unwrap();

		let start = now - chrono::Duration::hours(1);
		let end = now + chrono::Duration::hours(1);
		let totals = store.study_totals_in_window(start, end, 10).await.unwrap();
		assert_eq!(
			totals,
			vec![(UserId::new("u1").unwrap(), 45), (UserId::new("u2").unwrap(), 40)]
		);
	}
}

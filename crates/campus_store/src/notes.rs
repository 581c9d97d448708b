#![forbid(unsafe_code)]

use anyhow::Context as _;
use chrono::{DateTime, Utc};

use campus_domain::{Note, NoteId, UserId};

use crate::Store;

#[derive(sqlx::FromRow)]
struct NoteRow {
	id: String,
	user_id: String,
	body: String,
	created_at: DateTime<Utc>,
	expires_at: DateTime<Utc>,
}

impl TryFrom<NoteRow> for Note {
	type Error = anyhow::Error;

	fn try_from(row: NoteRow) -> Result<Self, Self::Error> {
		Ok(Note {
			id: NoteId::new(row.id).context("note id")?,
			user_id: UserId::new(row.user_id).context("user id")?,
			text: row.body,
			created_at: row.created_at,
			expires_at: row.expires_at,
		})
	}
}

const NOTE_COLUMNS: &str = "id, user_id, body, created_at, expires_at";

impl Store {
	/// One live note per user: creating replaces any previous note.
	pub async fn replace_note(&self, note: &Note) -> anyhow::Result<()> {
		sqlx::query("DELETE FROM notes WHERE user_id = ?")
			.bind(note.user_id.as_str())
			.execute(&self.pool)
			.await
			.context("clear previous notes")?;
		sqlx::query("INSERT INTO notes (id, user_id, body, created_at, expires_at) VALUES (?, ?, ?, ?, ?)")
			.bind(note.id.as_str())
			.bind(note.user_id.as_str())
			.bind(&note.text)
			.bind(note.created_at)
			.bind(note.expires_at)
			.execute(&self.pool)
			.await
			.context("insert note")?;
		Ok(())
	}

	pub async fn find_note(&self, id: &NoteId) -> anyhow::Result<Option<Note>> {
		let row: Option<NoteRow> = sqlx::query_as(&format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?"))
			.bind(id.as_str())
			.fetch_optional(&self.pool)
			.await
			.context("select note")?;
		row.map(Note::try_from).transpose()
	}

	/// Unexpired notes authored by any of `authors`, newest first.
	pub async fn live_notes_for(&self, authors: &[UserId], now: DateTime<Utc>) -> anyhow::Result<Vec<Note>> {
		if authors.is_empty() {
			return Ok(Vec::new());
		}

		let mut qb = sqlx::QueryBuilder::new(format!("SELECT {NOTE_COLUMNS} FROM notes WHERE expires_at > "));
		qb.push_bind(now);
		qb.push(" AND user_id IN (");
		let mut separated = qb.separated(", ");
		for author in authors {
			separated.push_bind(author.as_str());
		}
		qb.push(") ORDER BY created_at DESC");

		let rows: Vec<NoteRow> = qb
			.build_query_as()
			.fetch_all(&self.pool)
			.await
			.context("select live notes")?;
		rows.into_iter().map(Note::try_from).collect()
	}

	pub async fn delete_note(&self, id: &NoteId) -> anyhow::Result<()> {
		sqlx::query("DELETE FROM notes WHERE id = ?")
			.bind(id.as_str())
			.execute(&self.pool)
			.await
			.context("delete note")?;
		Ok(())
	}

	/// Expired rows are invisible to reads already; this reclaims them.
	pub async fn purge_expired_notes(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
		let result = sqlx::query("DELETE FROM notes WHERE expires_at <= ?")
			.bind(now)
			.execute(&self.pool)
			.await
			.context("purge expired notes")?;
		Ok(result.rows_affected())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_store;

	fn note(id: &str, user: &str, body: &str, at: DateTime<Utc>) -> Note {
		Note {
			id: NoteId::new(id).unwrap(),
			user_id: UserId::new(user).unwrap(),
			text: body.to_string(),
			created_at: at,
			expires_at: at + chrono::Duration::hours(24),
		}
	}

	#[tokio::test]
	async fn replace_keeps_one_note_per_user() {
		let store = test_store().await;
		let now = Utc::now();
		store.replace_note(&note("n1", "u1", "first", now)).await.unwrap();
		store.replace_note(&note("n2", "u1", "second", now)).await.unwrap();

		let user = UserId::new("u1").unwrap();
		let notes = store.live_notes_for(&[user], now).await.unwrap();
		assert_eq!(notes.len(), 1);
		assert_eq!(notes[0].text, "second");
		assert!(store.find_note(&NoteId::new("n1").unwrap()).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn notes_expire_after_twenty_four_hours() {
		let store = test_store().await;
		let created = Utc::now();
		store.replace_note(&note("n1", "u1", "hi", created)).await.unwrap();

		let user = UserId::new("u1").unwrap();
		let just_before = created + chrono::Duration::hours(24) - chrono::Duration::seconds(1);
		let just_after = created + chrono::Duration::hours(24) + chrono::Duration::seconds(1);

		assert_eq!(store.live_notes_for(&[user.clone()], just_before).await.unwrap().len(), 1);
		assert!(store.live_notes_for(&[user], just_after).await.unwrap().is_empty());
	}
}

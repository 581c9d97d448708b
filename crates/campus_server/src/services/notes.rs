#![forbid(unsafe_code)]

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use campus_domain::{Error, NOTE_MAX_CHARS, Note, NoteId, Result, UserId, UserSummary};
use campus_store::Store;

/// Note with its author hydrated for display.
#[derive(Debug, Clone, Serialize)]
pub struct NoteView {
	#[serde(flatten)]
	pub note: Note,
	pub author: Option<UserSummary>,
}

/// Ephemeral 24h status notes; one live note per user.
#[derive(Clone)]
pub struct NotesService {
	store: Store,
}

impl NotesService {
	pub fn new(store: Store) -> Self {
		Self { store }
	}

	pub async fn create(&self, user: &UserId, text: String) -> Result<NoteView> {
		self.create_at(user, text, Utc::now()).await
	}

	/// Create with an explicit clock, used by tests to pin the expiry.
	pub async fn create_at(&self, user: &UserId, text: String, now: DateTime<Utc>) -> Result<NoteView> {
		let text = text.trim().to_string();
		if text.is_empty() {
			return Err(Error::validation("note text must be non-empty"));
		}
		if text.chars().count() > NOTE_MAX_CHARS {
			return Err(Error::validation(format!("note text exceeds {NOTE_MAX_CHARS} characters")));
		}

		let note = Note {
			id: NoteId::generate(),
			user_id: user.clone(),
			text,
			created_at: now,
			expires_at: now + Duration::hours(24),
		};
		// Replace semantics: a new note displaces any previous one.
		self.store.replace_note(&note).await?;

		let summaries = self.store.user_summaries(std::slice::from_ref(user)).await?;
		Ok(NoteView {
			author: summaries.get(user).cloned(),
			note,
		})
	}

	/// Live notes from the user and everyone they follow, own notes first.
	pub async fn timeline(&self, user: &UserId) -> Result<Vec<NoteView>> {
		self.timeline_at(user, Utc::now()).await
	}

	pub async fn timeline_at(&self, user: &UserId, now: DateTime<Utc>) -> Result<Vec<NoteView>> {
		let Some(viewer) = self.store.find_user(user).await? else {
			return Err(Error::NotFound("user"));
		};

		let mut authors = Vec::with_capacity(viewer.following.len() + 1);
		authors.push(viewer.id.clone());
		authors.extend(viewer.following.iter().cloned());

		let notes = self.store.live_notes_for(&authors, now).await?;
		let author_ids: Vec<UserId> = notes.iter().map(|n| n.user_id.clone()).collect();
		let summaries = self.store.user_summaries(&author_ids).await?;

		let (mine, others): (Vec<Note>, Vec<Note>) = notes.into_iter().partition(|n| &n.user_id == user);
		Ok(mine
			.into_iter()
			.chain(others)
			.map(|note| NoteView {
				author: summaries.get(&note.user_id).cloned(),
				note,
			})
			.collect())
	}

	pub async fn delete(&self, id: &NoteId, acting: &UserId) -> Result<()> {
		let Some(note) = self.store.find_note(id).await? else {
			return Err(Error::NotFound("note"));
		};
		if &note.user_id != acting {
			return Err(Error::authorization("you can delete only your own note"));
		}
		self.store.delete_note(id).await?;
		Ok(())
	}
}

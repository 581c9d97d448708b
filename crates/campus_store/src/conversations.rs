#![forbid(unsafe_code)]

use std::collections::HashMap;

use anyhow::Context as _;
use chrono::{DateTime, Utc};

use campus_domain::{Conversation, ConversationId, MessageId, UserId};

use crate::{Store, ids_from_json, ids_to_json};

#[derive(sqlx::FromRow)]
struct ConversationRow {
	id: String,
	members: String,
	last_message_id: Option<String>,
	last_message_text: Option<String>,
	last_message_at: Option<DateTime<Utc>>,
	unread: String,
	created_at: DateTime<Utc>,
}

impl TryFrom<ConversationRow> for Conversation {
	type Error = anyhow::Error;

	fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
		Ok(Conversation {
			id: ConversationId::new(row.id).context("conversation id")?,
			members: ids_from_json(&row.members),
			last_message_id: row.last_message_id.map(MessageId::new).transpose().context("message id")?,
			last_message_text: row.last_message_text,
			last_message_at: row.last_message_at,
			unread: unread_from_json(&row.unread),
			created_at: row.created_at,
		})
	}
}

fn unread_to_json(map: &HashMap<UserId, u32>) -> String {
	serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string())
}

fn unread_from_json(raw: &str) -> HashMap<UserId, u32> {
	serde_json::from_str(raw).unwrap_or_default()
}

const CONVERSATION_COLUMNS: &str =
	"id, members, last_message_id, last_message_text, last_message_at, unread, created_at";

impl Store {
	pub async fn insert_conversation(&self, conversation: &Conversation) -> anyhow::Result<()> {
		sqlx::query(
			"INSERT INTO conversations (id, members, last_message_id, last_message_text, last_message_at, unread, created_at) \
			VALUES (?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(conversation.id.as_str())
		.bind(ids_to_json(&conversation.members))
		.bind(conversation.last_message_id.as_ref().map(|id| id.as_str().to_string()))
		.bind(&conversation.last_message_text)
		.bind(conversation.last_message_at)
		.bind(unread_to_json(&conversation.unread))
		.bind(conversation.created_at)
		.execute(&self.pool)
		.await
		.context("insert conversation")?;
		Ok(())
	}

	pub async fn find_conversation(&self, id: &ConversationId) -> anyhow::Result<Option<Conversation>> {
		let row: Option<ConversationRow> =
			sqlx::query_as(&format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?"))
				.bind(id.as_str())
				.fetch_optional(&self.pool)
				.await
				.context("select conversation")?;
		row.map(Conversation::try_from).transpose()
	}

	/// First conversation containing both users, if any.
	pub async fn find_conversation_by_pair(&self, a: &UserId, b: &UserId) -> anyhow::Result<Option<Conversation>> {
		let row: Option<ConversationRow> = sqlx::query_as(&format!(
			"SELECT {CONVERSATION_COLUMNS} FROM conversations c \
			WHERE EXISTS (SELECT 1 FROM json_each(c.members) m1 WHERE m1.value = ?) \
			AND EXISTS (SELECT 1 FROM json_each(c.members) m2 WHERE m2.value = ?) \
			LIMIT 1"
		))
		.bind(a.as_str())
		.bind(b.as_str())
		.fetch_optional(&self.pool)
		.await
		.context("select conversation by pair")?;
		row.map(Conversation::try_from).transpose()
	}

	/// All conversations for a member, most recent message first.
	pub async fn conversations_for_user(&self, user: &UserId) -> anyhow::Result<Vec<Conversation>> {
		let rows: Vec<ConversationRow> = sqlx::query_as(&format!(
			"SELECT {CONVERSATION_COLUMNS} FROM conversations c \
			WHERE EXISTS (SELECT 1 FROM json_each(c.members) m WHERE m.value = ?) \
			ORDER BY c.last_message_at DESC"
		))
		.bind(user.as_str())
		.fetch_all(&self.pool)
		.await
		.context("select conversations for user")?;
		rows.into_iter().map(Conversation::try_from).collect()
	}

	/// Rewrite the denormalized last-message snapshot (None clears it).
	pub async fn set_last_message(
		&self,
		id: &ConversationId,
		snapshot: Option<(&MessageId, &str, DateTime<Utc>)>,
	) -> anyhow::Result<()> {
		let (message_id, text, at) = match snapshot {
			Some((message_id, text, at)) => (
				Some(message_id.as_str().to_string()),
				Some(text.to_string()),
				Some(at),
			),
			None => (None, None, None),
		};
		sqlx::query("UPDATE conversations SET last_message_id = ?, last_message_text = ?, last_message_at = ? WHERE id = ?")
			.bind(message_id)
			.bind(text)
			.bind(at)
			.bind(id.as_str())
			.execute(&self.pool)
			.await
			.context("update last message snapshot")?;
		Ok(())
	}

	/// Refresh only the snapshot text (message edits).
	pub async fn set_last_message_text(&self, id: &ConversationId, text: &str) -> anyhow::Result<()> {
		sqlx::query("UPDATE conversations SET last_message_text = ? WHERE id = ?")
			.bind(text)
			.bind(id.as_str())
			.execute(&self.pool)
			.await
			.context("update last message text")?;
		Ok(())
	}

	/// Increment the unread counter of every member except the sender.
	pub async fn increment_unread_except(&self, id: &ConversationId, sender: &UserId) -> anyhow::Result<()> {
		let Some(conversation) = self.find_conversation(id).await? else {
			return Ok(());
		};

		let mut unread = conversation.unread;
		for member in &conversation.members {
			if member != sender {
				*unread.entry(member.clone()).or_insert(0) += 1;
			}
		}
		self.write_unread(id, &unread).await
	}

	/// Zero one member's unread counter.
	pub async fn zero_unread(&self, id: &ConversationId, user: &UserId) -> anyhow::Result<()> {
		let Some(conversation) = self.find_conversation(id).await? else {
			return Ok(());
		};

		let mut unread = conversation.unread;
		unread.insert(user.clone(), 0);
		self.write_unread(id, &unread).await
	}

	async fn write_unread(&self, id: &ConversationId, unread: &HashMap<UserId, u32>) -> anyhow::Result<()> {
		sqlx::query("UPDATE conversations SET unread = ? WHERE id = ?")
			.bind(unread_to_json(unread))
			.bind(id.as_str())
			.execute(&self.pool)
			.await
			.context("update unread counters")?;
		Ok(())
	}

	pub async fn delete_conversation(&self, id: &ConversationId) -> anyhow::Result<()> {
		sqlx::query("DELETE FROM conversations WHERE id = ?")
			.bind(id.as_str())
			.execute(&self.pool)
			.await
			.context("delete conversation")?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_store;

	fn conversation(id: &str, members: &[&str]) -> Conversation {
		Conversation {
			id: ConversationId::new(id).unwrap(),
			members: members.iter().map(|m| UserId::new(*m).unwrap()).collect(),
			last_message_id: None,
			last_message_text: None,
			last_message_at: None,
			unread: HashMap::new(),
			created_at: Utc::now(),
		}
	}

	#[tokio::test]
	async fn pair_lookup_matches_membership() {
		let store = test_store().await;
		store.insert_conversation(&conversation("c1", &["a", "b"])).await.unwrap();

		let a = UserId::new("a").unwrap();
		let b = UserId::new("b").unwrap();
		let c = UserId::new("c").unwrap();

		assert!(store.find_conversation_by_pair(&a, &b).await.unwrap().is_some());
		assert!(store.find_conversation_by_pair(&b, &a).await.unwrap().is_some());
		assert!(store.find_conversation_by_pair(&a, &c).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn unread_counters_track_members_except_sender() {
		let store = test_store().await;
		store.insert_conversation(&conversation("c1", &["a", "b"])).await.unwrap();

		let id = ConversationId::new("c1").unwrap();
		let a = UserId::new("a").unwrap();
		let b = UserId::new("b").unwrap();

		store.increment_unread_except(&id, &a).await.unwrap();
		store.increment_unread_except(&id, &a).await.unwrap();

		let loaded = store.find_conversation(&id).await.unwrap().unwrap();
		assert_eq!(loaded.unread_for(&b), 2);
		assert_eq!(loaded.unread_for(&a), 0);

		store.zero_unread(&id, &b).await.unwrap();
		let loaded = store.find_conversation(&id).await.unwrap().unwrap();
		assert_eq!(loaded.unread_for(&b), 0);
	}

	#[tokio::test]
	async fn conversations_sort_by_latest_message() {
		let store = test_store().await;
		store.insert_conversation(&conversation("c1", &["a", "b"])).await.unwrap();
		store.insert_conversation(&conversation("c2", &["a", "c"])).await.unwrap();

		let now = Utc::now();
		let m1 = MessageId::new("m1").unwrap();
		let m2 = MessageId::new("m2").unwrap();
		store
			.set_last_message(&ConversationId::new("c1").unwrap(), Some((&m1, "old", now - chrono::Duration::minutes(5))))
			.await
			.unwrap();
		store
			.set_last_message(&ConversationId::new("c2").unwrap(), Some((&m2, "new", now)))
			.await
			.unwrap();

		let list = store.conversations_for_user(&UserId::new("a").unwrap()).await.unwrap();
		assert_eq!(list.len(), 2);
		assert_eq!(list[0].id.as_str(), "c2");
	}
}

#![forbid(unsafe_code)]

use anyhow::Context as _;
use chrono::{DateTime, Utc};

use campus_domain::{Attachment, ConversationId, Message, MessageId, UserId};

use crate::Store;

#[derive(sqlx::FromRow)]
struct MessageRow {
	id: String,
	conversation_id: String,
	sender_id: String,
	body: String,
	attachments: String,
	read: bool,
	read_at: Option<DateTime<Utc>>,
	deleted_at: Option<DateTime<Utc>>,
	edited: bool,
	edited_at: Option<DateTime<Utc>>,
	created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
	type Error = anyhow::Error;

	fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
		let attachments: Vec<Attachment> = serde_json::from_str(&row.attachments).unwrap_or_default();
		Ok(Message {
			id: MessageId::new(row.id).context("message id")?,
			conversation_id: ConversationId::new(row.conversation_id).context("conversation id")?,
			sender: UserId::new(row.sender_id).context("sender id")?,
			text: row.body,
			attachments,
			read: row.read,
			read_at: row.read_at,
			deleted_at: row.deleted_at,
			edited: row.edited,
			edited_at: row.edited_at,
			created_at: row.created_at,
		})
	}
}

const MESSAGE_COLUMNS: &str =
	"id, conversation_id, sender_id, body, attachments, read, read_at, deleted_at, edited, edited_at, created_at";

impl Store {
	pub async fn insert_message(&self, message: &Message) -> anyhow::Result<()> {
		sqlx::query(
			"INSERT INTO messages (id, conversation_id, sender_id, body, attachments, read, read_at, deleted_at, edited, edited_at, created_at) \
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(message.id.as_str())
		.bind(message.conversation_id.as_str())
		.bind(message.sender.as_str())
		.bind(&message.text)
		.bind(serde_json::to_string(&message.attachments).unwrap_or_else(|_| "[]".to_string()))
		.bind(message.read)
		.bind(message.read_at)
		.bind(message.deleted_at)
		.bind(message.edited)
		.bind(message.edited_at)
		.bind(message.created_at)
		.execute(&self.pool)
		.await
		.context("insert message")?;
		Ok(())
	}

	/// Fetches a message regardless of deletion; visibility filtering is the
	/// caller's concern for moderation-style reads, list reads exclude
	/// deleted rows in SQL.
	pub async fn find_message(&self, id: &MessageId) -> anyhow::Result<Option<Message>> {
		let row: Option<MessageRow> = sqlx::query_as(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"))
			.bind(id.as_str())
			.fetch_optional(&self.pool)
			.await
			.context("select message")?;
		row.map(Message::try_from).transpose()
	}

	/// Visible (non-deleted) messages, oldest first.
	pub async fn messages_for_conversation(&self, conversation: &ConversationId) -> anyhow::Result<Vec<Message>> {
		let rows: Vec<MessageRow> = sqlx::query_as(&format!(
			"SELECT {MESSAGE_COLUMNS} FROM messages \
			WHERE conversation_id = ? AND deleted_at IS NULL ORDER BY created_at"
		))
		.bind(conversation.as_str())
		.fetch_all(&self.pool)
		.await
		.context("select messages")?;
		rows.into_iter().map(Message::try_from).collect()
	}

	pub async fn update_message_body(&self, id: &MessageId, body: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
		sqlx::query("UPDATE messages SET body = ?, edited = 1, edited_at = ? WHERE id = ?")
			.bind(body)
			.bind(at)
			.bind(id.as_str())
			.execute(&self.pool)
			.await
			.context("update message body")?;
		Ok(())
	}

	pub async fn soft_delete_message(&self, id: &MessageId, at: DateTime<Utc>) -> anyhow::Result<()> {
		sqlx::query("UPDATE messages SET deleted_at = ? WHERE id = ?")
			.bind(at)
			.bind(id.as_str())
			.execute(&self.pool)
			.await
			.context("soft delete message")?;
		Ok(())
	}

	/// Soft-delete every message in a conversation (conversation removal).
	pub async fn soft_delete_conversation_messages(
		&self,
		conversation: &ConversationId,
		at: DateTime<Utc>,
	) -> anyhow::Result<()> {
		sqlx::query("UPDATE messages SET deleted_at = ? WHERE conversation_id = ? AND deleted_at IS NULL")
			.bind(at)
			.bind(conversation.as_str())
			.execute(&self.pool)
			.await
			.context("soft delete conversation messages")?;
		Ok(())
	}

	pub async fn mark_message_read(&self, id: &MessageId, at: DateTime<Utc>) -> anyhow::Result<()> {
		sqlx::query("UPDATE messages SET read = 1, read_at = ? WHERE id = ? AND read = 0")
			.bind(at)
			.bind(id.as_str())
			.execute(&self.pool)
			.await
			.context("mark message read")?;
		Ok(())
	}

	/// Bulk-read every visible unread message not authored by the reader.
	/// Returns the number of rows updated.
	pub async fn mark_all_read(
		&self,
		conversation: &ConversationId,
		reader: &UserId,
		at: DateTime<Utc>,
	) -> anyhow::Result<u64> {
		let result = sqlx::query(
			"UPDATE messages SET read = 1, read_at = ? \
			WHERE conversation_id = ? AND sender_id != ? AND read = 0 AND deleted_at IS NULL",
		)
		.bind(at)
		.bind(conversation.as_str())
		.bind(reader.as_str())
		.execute(&self.pool)
		.await
		.context("mark all read")?;
		Ok(result.rows_affected())
	}

	/// Most recent visible message, used to recompute the conversation's
	/// denormalized snapshot after a soft delete.
	pub async fn latest_visible_message(&self, conversation: &ConversationId) -> anyhow::Result<Option<Message>> {
		let row: Option<MessageRow> = sqlx::query_as(&format!(
			"SELECT {MESSAGE_COLUMNS} FROM messages \
			WHERE conversation_id = ? AND deleted_at IS NULL ORDER BY created_at DESC LIMIT 1"
		))
		.bind(conversation.as_str())
		.fetch_optional(&self.pool)
		.await
		.context("select latest visible message")?;
		row.map(Message::try_from).transpose()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_store;

	fn message(id: &str, conversation: &str, sender: &str, body: &str, at: DateTime<Utc>) -> Message {
		Message {
			id: MessageId::new(id).unwrap(),
			conversation_id: ConversationId::new(conversation).unwrap(),
			sender: UserId::new(sender).unwrap(),
			text: body.to_string(),
			attachments: Vec::new(),
			read: false,
			read_at: None,
			deleted_at: None,
			edited: false,
			edited_at: None,
			created_at: at,
		}
	}

	#[tokio::test]
	async fn soft_deleted_messages_are_invisible_to_lists() {
		let store = test_store().await;
		let now = Utc::now();
		store.insert_message(&message("m1", "c1", "a", "one", now)).await.unwrap();
		store
			.insert_message(&message("m2", "c1", "a", "two", now + chrono::Duration::seconds(1)))
			.await
			.unwrap();

		let conversation = ConversationId::new("c1").unwrap();
		store
			.soft_delete_message(&MessageId::new("m2").unwrap(), Utc::now())
			.await
			.unwrap();

		let visible = store.messages_for_conversation(&conversation).await.unwrap();
		assert_eq!(visible.len(), 1);
		assert_eq!(visible[0].id.as_str(), "m1");

		// The row itself is retained.
		let deleted = store.find_message(&MessageId::new("m2").unwrap()).await.unwrap().unwrap();
		assert!(deleted.deleted_at.is_some());

		let latest = store.latest_visible_message(&conversation).await.unwrap().unwrap();
		assert_eq!(latest.id.as_str(), "m1");
	}

	#[tokio::test]
	async fn mark_all_read_skips_own_messages() {
		let store = test_store().await;
		let now = Utc::now();
		store.insert_message(&message("m1", "c1", "a", "from a", now)).await.unwrap();
		store
			.insert_message(&message("m2", "c1", "b", "from b", now + chrono::Duration::seconds(1)))
			.await
			.unwrap();
		store
			.insert_message(&message("m3", "c1", "a", "also a", now + chrono::Duration::seconds(2)))
			.await
			.unwrap();

		let conversation = ConversationId::new("c1").unwrap();
		let reader = UserId::new("b").unwrap();
		let updated = store.mark_all_read(&conversation, &reader, Utc::now()).await.unwrap();
		assert_eq!(updated, 2);

		let messages = store.messages_for_conversation(&conversation).await.unwrap();
		for msg in messages {
			if msg.sender.as_str() == "a" {
				assert!(msg.read && msg.read_at.is_some());
			} else {
				assert!(!msg.read);
			}
		}
	}
}

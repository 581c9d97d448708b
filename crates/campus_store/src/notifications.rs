#![forbid(unsafe_code)]

use anyhow::Context as _;
use chrono::{DateTime, Utc};

use campus_domain::{Notification, NotificationId, NotificationKind, PostId, UserId};

use crate::Store;

#[derive(sqlx::FromRow)]
struct NotificationRow {
	id: String,
	sender_id: String,
	receiver_id: String,
	kind: String,
	post_id: Option<String>,
	read: bool,
	created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
	type Error = anyhow::Error;

	fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
		Ok(Notification {
			id: NotificationId::new(row.id).context("notification id")?,
			sender: UserId::new(row.sender_id).context("sender id")?,
			receiver: UserId::new(row.receiver_id).context("receiver id")?,
			kind: row.kind.parse::<NotificationKind>().context("notification kind")?,
			post_id: row.post_id.map(PostId::new).transpose().context("post id")?,
			read: row.read,
			created_at: row.created_at,
		})
	}
}

const NOTIFICATION_COLUMNS: &str = "id, sender_id, receiver_id, kind, post_id, read, created_at";

impl Store {
	pub async fn insert_notification(&self, notification: &Notification) -> anyhow::Result<()> {
		sqlx::query(
			"INSERT INTO notifications (id, sender_id, receiver_id, kind, post_id, read, created_at) \
			VALUES (?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(notification.id.as_str())
		.bind(notification.sender.as_str())
		.bind(notification.receiver.as_str())
		.bind(notification.kind.as_str())
		.bind(notification.post_id.as_ref().map(|id| id.as_str().to_string()))
		.bind(notification.read)
		.bind(notification.created_at)
		.execute(&self.pool)
		.await
		.context("insert notification")?;
		Ok(())
	}

	pub async fn find_notification(&self, id: &NotificationId) -> anyhow::Result<Option<Notification>> {
		let row: Option<NotificationRow> =
			sqlx::query_as(&format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?"))
				.bind(id.as_str())
				.fetch_optional(&self.pool)
				.await
				.context("select notification")?;
		row.map(Notification::try_from).transpose()
	}

	/// Most recent notifications for a receiver.
	pub async fn recent_notifications(&self, receiver: &UserId, limit: i64) -> anyhow::Result<Vec<Notification>> {
		let rows: Vec<NotificationRow> = sqlx::query_as(&format!(
			"SELECT {NOTIFICATION_COLUMNS} FROM notifications \
			WHERE receiver_id = ? ORDER BY created_at DESC LIMIT ?"
		))
		.bind(receiver.as_str())
		.bind(limit)
		.fetch_all(&self.pool)
		.await
		.context("select recent notifications")?;
		rows.into_iter().map(Notification::try_from).collect()
	}

	pub async fn mark_notification_read(&self, id: &NotificationId) -> anyhow::Result<()> {
		sqlx::query("UPDATE notifications SET read = 1 WHERE id = ?")
			.bind(id.as_str())
			.execute(&self.pool)
			.await
			.context("mark notification read")?;
		Ok(())
	}

	pub async fn mark_all_notifications_read(&self, receiver: &UserId) -> anyhow::Result<u64> {
		let result = sqlx::query("UPDATE notifications SET read = 1 WHERE receiver_id = ? AND read = 0")
			.bind(receiver.as_str())
			.execute(&self.pool)
			.await
			.context("mark all notifications read")?;
		Ok(result.rows_affected())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_store;

	fn notification(id: &str, sender: &str, receiver: &str, kind: NotificationKind, at: DateTime<Utc>) -> Notification {
		Notification {
			id: NotificationId::new(id).unwrap(),
			sender: UserId::new(sender).unwrap(),
			receiver: UserId::new(receiver).unwrap(),
			kind,
			post_id: None,
			read: false,
			created_at: at,
		}
	}

	#[tokio::test]
	async fn recent_feed_is_receiver_scoped_and_ordered() {
		let store = test_store().await;
		let now = Utc::now();
		store
			.insert_notification(&notification("n1", "a", "b", NotificationKind::Like, now))
			.await
			.unwrap();
		store
			.insert_notification(&notification(
				"n2",
				"c",
				"b",
				NotificationKind::Comment,
				now + chrono::Duration::seconds(1),
			))
			.await
			.unwrap();
		store
			.insert_notification(&notification("n3", "a", "c", NotificationKind::Follow, now))
			.await
			.unwrap();

		let feed = store
			.recent_notifications(&UserId::new("b").unwrap(), 50)
			.await
			.unwrap();
		assert_eq!(feed.len(), 2);
		assert_eq!(feed[0].id.as_str(), "n2");
		assert_eq!(feed[1].id.as_str(), "n1");
	}

	#[tokio::test]
	async fn read_all_flips_only_unread_rows() {
		let store = test_store().await;
		let now = Utc::now();
		store
			.insert_notification(&notification("n1", "a", "b", NotificationKind::Like, now))
			.await
			.unwrap();
		store
			.insert_notification(&notification("n2", "a", "b", NotificationKind::Follow, now))
			.await
			.unwrap();

		let receiver = UserId::new("b").unwrap();
		assert_eq!(store.mark_all_notifications_read(&receiver).await.unwrap(), 2);
		assert_eq!(store.mark_all_notifications_read(&receiver).await.unwrap(), 0);
	}
}

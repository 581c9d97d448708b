#![forbid(unsafe_code)]

use campus_domain::Error;

use crate::services::harness::{seed_user, test_app};

#[tokio::test]
async fn unread_counts_accumulate_and_clear() {
	let app = test_app().await;
	let a = seed_user(&app.store, "a", "ann").await;
	let b = seed_user(&app.store, "b", "bob").await;

	let conversation = app.messaging.open_conversation(&a, &b).await.unwrap();

	for i in 0..3 {
		app.messaging
			.send_message(&conversation.id, &a, format!("message {i}"), Vec::new())
			.await
			.unwrap();
	}

	let loaded = app.store.find_conversation(&conversation.id).await.unwrap().unwrap();
	assert_eq!(loaded.unread_for(&b), 3);
	assert_eq!(loaded.unread_for(&a), 0);
	assert_eq!(app.messaging.unread_total(&b).await.unwrap(), 3);

	let updated = app.messaging.mark_all_read(&conversation.id, &b).await.unwrap();
	assert_eq!(updated, 3);

	let loaded = app.store.find_conversation(&conversation.id).await.unwrap().unwrap();
	assert_eq!(loaded.unread_for(&b), 0);
	assert_eq!(app.messaging.unread_total(&b).await.unwrap(), 0);

	// Convergence under repetition: marking again is a no-op.
	assert_eq!(app.messaging.mark_all_read(&conversation.id, &b).await.unwrap(), 0);
}

#[tokio::test]
async fn open_conversation_is_find_or_create() {
	let app = test_app().await;
	let a = seed_user(&app.store, "a", "ann").await;
	let b = seed_user(&app.store, "b", "bob").await;

	let first = app.messaging.open_conversation(&a, &b).await.unwrap();
	let second = app.messaging.open_conversation(&b, &a).await.unwrap();
	assert_eq!(first.id, second.id);

	assert!(matches!(
		app.messaging.open_conversation(&a, &a).await,
		Err(Error::Validation(_))
	));
}

#[tokio::test]
async fn deleting_latest_message_recomputes_snapshot() {
	let app = test_app().await;
	let a = seed_user(&app.store, "a", "ann").await;
	let b = seed_user(&app.store, "b", "bob").await;
	let conversation = app.messaging.open_conversation(&a, &b).await.unwrap();

	let first = app
		.messaging
		.send_message(&conversation.id, &a, "first".to_string(), Vec::new())
		.await
		.unwrap();
	let second = app
		.messaging
		.send_message(&conversation.id, &b, "second".to_string(), Vec::new())
		.await
		.unwrap();

	let loaded = app.store.find_conversation(&conversation.id).await.unwrap().unwrap();
	assert_eq!(loaded.last_message_id.as_ref(), Some(&second.message.id));
	assert_eq!(loaded.last_message_text.as_deref(), Some("second"));

	// Deleting the latest message falls back to the previous visible one.
	app.messaging.delete_message(&second.message.id, &b).await.unwrap();
	let loaded = app.store.find_conversation(&conversation.id).await.unwrap().unwrap();
	assert_eq!(loaded.last_message_id.as_ref(), Some(&first.message.id));
	assert_eq!(loaded.last_message_text.as_deref(), Some("first"));

	// Deleting the last remaining message clears the snapshot entirely.
	app.messaging.delete_message(&first.message.id, &a).await.unwrap();
	let loaded = app.store.find_conversation(&conversation.id).await.unwrap().unwrap();
	assert!(loaded.last_message_id.is_none());
	assert!(loaded.last_message_text.is_none());
	assert!(loaded.last_message_at.is_none());
}

#[tokio::test]
async fn deleting_an_older_message_keeps_snapshot() {
	let app = test_app().await;
	let a = seed_user(&app.store, "a", "ann").await;
	let b = seed_user(&app.store, "b", "bob").await;
	let conversation = app.messaging.open_conversation(&a, &b).await.unwrap();

	let first = app
		.messaging
		.send_message(&conversation.id, &a, "first".to_string(), Vec::new())
		.await
		.unwrap();
	let second = app
		.messaging
		.send_message(&conversation.id, &a, "second".to_string(), Vec::new())
		.await
		.unwrap();

	app.messaging.delete_message(&first.message.id, &a).await.unwrap();

	let loaded = app.store.find_conversation(&conversation.id).await.unwrap().unwrap();
	assert_eq!(loaded.last_message_id.as_ref(), Some(&second.message.id));
}

#[tokio::test]
async fn only_the_sender_can_edit_or_delete() {
	let app = test_app().await;
	let a = seed_user(&app.store, "a", "ann").await;
	let b = seed_user(&app.store, "b", "bob").await;
	let conversation = app.messaging.open_conversation(&a, &b).await.unwrap();

	let sent = app
		.messaging
		.send_message(&conversation.id, &a, "mine".to_string(), Vec::new())
		.await
		.unwrap();

	assert!(matches!(
		app.messaging.edit_message(&sent.message.id, &b, "hijack".to_string()).await,
		Err(Error::Authorization(_))
	));
	assert!(matches!(
		app.messaging.delete_message(&sent.message.id, &b).await,
		Err(Error::Authorization(_))
	));

	let edited = app
		.messaging
		.edit_message(&sent.message.id, &a, "mine, edited".to_string())
		.await
		.unwrap();
	assert!(edited.edited);
	assert_eq!(edited.text, "mine, edited");

	// Snapshot text follows the edit of the latest message.
	let loaded = app.store.find_conversation(&conversation.id).await.unwrap().unwrap();
	assert_eq!(loaded.last_message_text.as_deref(), Some("mine, edited"));
}

#[tokio::test]
async fn non_members_cannot_send_or_delete_conversation() {
	let app = test_app().await;
	let a = seed_user(&app.store, "a", "ann").await;
	let b = seed_user(&app.store, "b", "bob").await;
	let outsider = seed_user(&app.store, "x", "xavier").await;
	let conversation = app.messaging.open_conversation(&a, &b).await.unwrap();

	assert!(matches!(
		app.messaging
			.send_message(&conversation.id, &outsider, "hi".to_string(), Vec::new())
			.await,
		Err(Error::Authorization(_))
	));
	assert!(matches!(
		app.messaging.delete_conversation(&conversation.id, &outsider).await,
		Err(Error::Authorization(_))
	));

	// A member can; messages are soft-deleted, the row goes away.
	app.messaging
		.send_message(&conversation.id, &a, "bye".to_string(), Vec::new())
		.await
		.unwrap();
	app.messaging.delete_conversation(&conversation.id, &a).await.unwrap();
	assert!(app.store.find_conversation(&conversation.id).await.unwrap().is_none());
	assert!(app.messaging.messages(&conversation.id).await.unwrap().is_empty());
}

#![forbid(unsafe_code)]

use campus_domain::NotificationKind;

use crate::services::harness::{seed_user, settle, test_app};
use crate::services::notifications::RECENT_CAP;

#[tokio::test]
async fn notify_writes_store_then_cache_snapshot() {
	let app = test_app().await;
	let sender = seed_user(&app.store, "s", "sam").await;
	let receiver = seed_user(&app.store, "r", "rae").await;

	app.notifications
		.notify(&sender, &receiver, NotificationKind::Like, None)
		.await
		.unwrap();
	settle().await;

	let durable = app.store.recent_notifications(&receiver, 50).await.unwrap();
	assert_eq!(durable.len(), 1);
	assert_eq!(durable[0].kind, NotificationKind::Like);

	let cached = app.cache.lrange("notifications:recent:r", 0, -1).await;
	assert_eq!(cached.len(), 1);
	assert!(cached[0].contains(r#""username":"sam""#));
}

#[tokio::test]
async fn self_notification_is_skipped() {
	let app = test_app().await;
	let user = seed_user(&app.store, "s", "sam").await;

	app.notifications
		.notify(&user, &user, NotificationKind::Comment, None)
		.await
		.unwrap();
	settle().await;

	assert!(app.store.recent_notifications(&user, 50).await.unwrap().is_empty());
	assert!(app.cache.lrange("notifications:recent:s", 0, -1).await.is_empty());
}

#[tokio::test]
async fn recent_cache_list_is_capped_at_fifty() {
	let app = test_app().await;
	let receiver = seed_user(&app.store, "r", "rae").await;

	for i in 0..60 {
		let sender = seed_user(&app.store, &format!("s{i}"), &format!("sam{i}")).await;
		app.notifications
			.notify(&sender, &receiver, NotificationKind::Follow, None)
			.await
			.unwrap();
	}
	settle().await;

	let cached = app.cache.lrange("notifications:recent:r", 0, -1).await;
	assert_eq!(cached.len() as i64, RECENT_CAP);

	let feed = app.notifications.feed(&receiver).await.unwrap();
	assert_eq!(feed.len() as i64, RECENT_CAP);
}

#[tokio::test]
async fn feed_miss_falls_back_to_store_and_reseeds() {
	let app = test_app().await;
	let sender = seed_user(&app.store, "s", "sam").await;
	let receiver = seed_user(&app.store, "r", "rae").await;

	app.notifications
		.notify(&sender, &receiver, NotificationKind::Like, None)
		.await
		.unwrap();
	settle().await;

	// Simulate a cold cache.
	app.cache.del("notifications:recent:r").await;

	let feed = app.notifications.feed(&receiver).await.unwrap();
	assert_eq!(feed.len(), 1);
	assert_eq!(feed[0].sender.username, "sam");

	// The read triggered an async reseed of the list.
	settle().await;
	let cached = app.cache.lrange("notifications:recent:r", 0, -1).await;
	assert_eq!(cached.len(), 1);
}

#[tokio::test]
async fn feed_is_newest_first() {
	let app = test_app().await;
	let sender = seed_user(&app.store, "s", "sam").await;
	let receiver = seed_user(&app.store, "r", "rae").await;

	app.notifications
		.notify(&sender, &receiver, NotificationKind::Like, None)
		.await
		.unwrap();
	settle().await;
	app.notifications
		.notify(&sender, &receiver, NotificationKind::Comment, None)
		.await
		.unwrap();
	settle().await;

	let feed = app.notifications.feed(&receiver).await.unwrap();
	assert_eq!(feed.len(), 2);
	assert_eq!(feed[0].kind, NotificationKind::Comment);
	assert_eq!(feed[1].kind, NotificationKind::Like);
}

#[tokio::test]
async fn mark_read_invalidates_cache_list() {
	let app = test_app().await;
	let sender = seed_user(&app.store, "s", "sam").await;
	let receiver = seed_user(&app.store, "r", "rae").await;

	app.notifications
		.notify(&sender, &receiver, NotificationKind::Like, None)
		.await
		.unwrap();
	settle().await;

	let feed = app.notifications.feed(&receiver).await.unwrap();
	let updated = app.notifications.mark_read(&feed[0].id).await.unwrap();
	assert!(updated.read);

	assert!(app.cache.lrange("notifications:recent:r", 0, -1).await.is_empty());

	// The next read reseeds with the read flag set.
	let feed = app.notifications.feed(&receiver).await.unwrap();
	assert!(feed[0].read);
}

#[tokio::test]
async fn online_receiver_gets_a_socket_event() {
	use campus_realtime::{ConnectionHandle, ServerEvent};
	use tokio::sync::mpsc;

	let app = test_app().await;
	let sender = seed_user(&app.store, "s", "sam").await;
	let receiver = seed_user(&app.store, "r", "rae").await;

	let (tx, mut rx) = mpsc::channel(16);
	app.registry
		.register(receiver.clone(), ConnectionHandle::new(1, tx));

	app.notifications
		.notify(&sender, &receiver, NotificationKind::Like, None)
		.await
		.unwrap();
	settle().await;

	let mut saw_notification = false;
	while let Ok(event) = rx.try_recv() {
		if let ServerEvent::Notification { sender_id, kind, .. } = event {
			assert_eq!(sender_id, sender);
			assert_eq!(kind, NotificationKind::Like);
			saw_notification = true;
		}
	}
	assert!(saw_notification, "expected a notification socket event");
}

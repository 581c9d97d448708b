#![forbid(unsafe_code)]

use campus_domain::{Error, NotificationKind};

use crate::services::harness::{seed_user, settle, test_app};
use crate::services::social::LikeOutcome;

#[tokio::test]
async fn follow_twice_conflicts_and_arrays_hold_one_entry() {
	let app = test_app().await;
	let ann = seed_user(&app.store, "a", "ann").await;
	let bob = seed_user(&app.store, "b", "bob").await;

	app.social.follow(&ann, &bob).await.unwrap();
	assert!(matches!(
		app.social.follow(&ann, &bob).await,
		Err(Error::Conflict(_))
	));

	let bob_row = app.store.find_user(&bob).await.unwrap().unwrap();
	assert_eq!(bob_row.followers, vec![ann.clone()]);
	let ann_row = app.store.find_user(&ann).await.unwrap().unwrap();
	assert_eq!(ann_row.following, vec![bob.clone()]);
}

#[tokio::test]
async fn unfollow_without_follow_conflicts_without_mutating() {
	let app = test_app().await;
	let ann = seed_user(&app.store, "a", "ann").await;
	let bob = seed_user(&app.store, "b", "bob").await;

	assert!(matches!(
		app.social.unfollow(&ann, &bob).await,
		Err(Error::Conflict(_))
	));

	let bob_row = app.store.find_user(&bob).await.unwrap().unwrap();
	assert!(bob_row.followers.is_empty());
	let ann_row = app.store.find_user(&ann).await.unwrap().unwrap();
	assert!(ann_row.following.is_empty());

	// The full cycle converges back to the empty graph.
	app.social.follow(&ann, &bob).await.unwrap();
	app.social.unfollow(&ann, &bob).await.unwrap();
	let bob_row = app.store.find_user(&bob).await.unwrap().unwrap();
	assert!(bob_row.followers.is_empty());
}

#[tokio::test]
async fn self_follow_is_rejected_as_validation() {
	let app = test_app().await;
	let ann = seed_user(&app.store, "a", "ann").await;
	assert!(matches!(
		app.social.follow(&ann, &ann).await,
		Err(Error::Validation(_))
	));
}

#[tokio::test]
async fn follow_notifies_the_target() {
	let app = test_app().await;
	let ann = seed_user(&app.store, "a", "ann").await;
	let bob = seed_user(&app.store, "b", "bob").await;

	app.social.follow(&ann, &bob).await.unwrap();
	settle().await;

	let feed = app.store.recent_notifications(&bob, 50).await.unwrap();
	assert_eq!(feed.len(), 1);
	assert_eq!(feed[0].kind, NotificationKind::Follow);
	assert_eq!(feed[0].sender, ann);
}

#[tokio::test]
async fn like_toggles_membership_and_notifies_owner_once() {
	let app = test_app().await;
	let ann = seed_user(&app.store, "a", "ann").await;
	let bob = seed_user(&app.store, "b", "bob").await;

	let post = app.social.create_post(&ann, "like me".to_string(), None).await.unwrap();

	assert_eq!(app.social.toggle_like(&post.id, &bob).await.unwrap(), LikeOutcome::Liked);
	let loaded = app.social.get_post(&post.id).await.unwrap();
	assert_eq!(loaded.likes, vec![bob.clone()]);

	assert_eq!(
		app.social.toggle_like(&post.id, &bob).await.unwrap(),
		LikeOutcome::Unliked
	);
	let loaded = app.social.get_post(&post.id).await.unwrap();
	assert!(loaded.likes.is_empty());

	settle().await;
	let feed = app.store.recent_notifications(&ann, 50).await.unwrap();
	assert_eq!(feed.len(), 1, "only the like notifies, not the unlike");
	assert_eq!(feed[0].kind, NotificationKind::Like);
}

#[tokio::test]
async fn own_like_does_not_notify() {
	let app = test_app().await;
	let ann = seed_user(&app.store, "a", "ann").await;

	let post = app.social.create_post(&ann, "mine".to_string(), None).await.unwrap();
	app.social.toggle_like(&post.id, &ann).await.unwrap();
	settle().await;

	assert!(app.store.recent_notifications(&ann, 50).await.unwrap().is_empty());
}

#[tokio::test]
async fn comments_bump_and_release_the_denormalized_counter() {
	let app = test_app().await;
	let ann = seed_user(&app.store, "a", "ann").await;
	let bob = seed_user(&app.store, "b", "bob").await;

	let post = app.social.create_post(&ann, "discuss".to_string(), None).await.unwrap();
	let comment = app
		.social
		.add_comment(&post.id, &bob, "first!".to_string(), None)
		.await
		.unwrap();

	assert_eq!(app.social.get_post(&post.id).await.unwrap().comment_count, 1);

	// Only the author may delete; the counter follows.
	assert!(matches!(
		app.social.delete_comment(&post.id, &comment.id, &ann).await,
		Err(Error::Authorization(_))
	));
	app.social.delete_comment(&post.id, &comment.id, &bob).await.unwrap();
	assert_eq!(app.social.get_post(&post.id).await.unwrap().comment_count, 0);

	settle().await;
	let feed = app.store.recent_notifications(&ann, 50).await.unwrap();
	assert_eq!(feed.len(), 1);
	assert_eq!(feed[0].kind, NotificationKind::Comment);
}

#[tokio::test]
async fn new_post_fans_out_to_online_followers() {
	use campus_realtime::{ConnectionHandle, ServerEvent};
	use tokio::sync::mpsc;

	let app = test_app().await;
	let ann = seed_user(&app.store, "a", "ann").await;
	let bob = seed_user(&app.store, "b", "bob").await;
	app.social.follow(&bob, &ann).await.unwrap();

	let (tx, mut rx) = mpsc::channel(16);
	app.registry.register(bob.clone(), ConnectionHandle::new(1, tx));

	let post = app.social.create_post(&ann, "fresh".to_string(), None).await.unwrap();

	let mut saw_new_post = false;
	while let Ok(event) = rx.try_recv() {
		if let ServerEvent::NewPost { username, post_id, .. } = event {
			assert_eq!(username, "ann");
			assert_eq!(post_id, post.id);
			saw_new_post = true;
		}
	}
	assert!(saw_new_post, "expected a new-post socket event");
}

#[tokio::test]
async fn follow_sets_reseed_into_cache_and_converge_on_unfollow() {
	let app = test_app().await;
	let ann = seed_user(&app.store, "a", "ann").await;
	let bob = seed_user(&app.store, "b", "bob").await;
	let cal = seed_user(&app.store, "c", "cal").await;

	app.social.follow(&bob, &ann).await.unwrap();
	app.social.follow(&cal, &ann).await.unwrap();
	settle().await;

	// First read misses and reseeds the cached set.
	let followers = app.social.followers(&ann).await.unwrap();
	assert_eq!(followers.len(), 2);
	settle().await;
	let mut cached = app.cache.smembers("users:followers:a").await;
	cached.sort();
	assert_eq!(cached, vec!["b".to_string(), "c".to_string()]);

	// Unfollow removes the member in place and the store stays authoritative.
	app.social.unfollow(&bob, &ann).await.unwrap();
	settle().await;
	let cached = app.cache.smembers("users:followers:a").await;
	assert_eq!(cached, vec!["c".to_string()]);

	let followers = app.social.followers(&ann).await.unwrap();
	assert_eq!(followers.len(), 1);
	assert_eq!(followers[0].username, "cal");
}

#[tokio::test]
async fn post_ownership_is_enforced() {
	let app = test_app().await;
	let ann = seed_user(&app.store, "a", "ann").await;
	let bob = seed_user(&app.store, "b", "bob").await;

	let post = app.social.create_post(&ann, "mine".to_string(), None).await.unwrap();

	assert!(matches!(
		app.social.update_post(&post.id, &bob, "hijack".to_string(), None).await,
		Err(Error::Authorization(_))
	));
	assert!(matches!(
		app.social.delete_post(&post.id, &bob).await,
		Err(Error::Authorization(_))
	));

	app.social.delete_post(&post.id, &ann).await.unwrap();
	assert!(matches!(
		app.social.get_post(&post.id).await,
		Err(Error::NotFound(_))
	));
}

#![forbid(unsafe_code)]

use campus_domain::Error;
use campus_domain::time::week_bucket;
use chrono::Duration;

use crate::services::harness::{seed_user, test_app};

#[tokio::test]
async fn second_start_conflicts_while_a_session_is_active() {
	let app = test_app().await;
	let ann = seed_user(&app.store, "u1", "ann").await;

	let first = app.learning.start_session(&ann, "math".to_string()).await.unwrap();
	assert!(first.active);

	let second = app.learning.start_session(&ann, "physics".to_string()).await;
	assert!(matches!(second, Err(Error::Conflict(_))));

	// The original session is untouched.
	let active = app.learning.active_session(&ann).await.unwrap().unwrap();
	assert_eq!(active.id, first.id);
	assert_eq!(active.subject, "math");
}

#[tokio::test]
async fn stop_records_duration_and_bumps_weekly_ranking() {
	let app = test_app().await;
	let ann = seed_user(&app.store, "u1", "ann").await;

	let session = app.learning.start_session(&ann, "math".to_string()).await.unwrap();
	let stop_at = session.started_at + Duration::minutes(25);

	let stopped = app.learning.stop_session_at(&ann, stop_at).await.unwrap();
	assert!(!stopped.active);
	assert_eq!(stopped.duration_minutes, 25);
	assert_eq!(stopped.ended_at, Some(stop_at));

	assert!(app.learning.active_session(&ann).await.unwrap().is_none());

	// The stop fed the current week's bucket by exactly the duration.
	let (year, week) = week_bucket(session.started_at);
	let key = format!("learning:ranking:weekly:{year}:{week}");
	let scores = app.cache.zrevrange_withscores(&key, 0, -1).await;
	assert_eq!(scores, vec![("u1".to_string(), 25.0)]);

	let ranking = app.rankings.weekly_ranking(session.started_at).await.unwrap();
	assert_eq!(ranking.len(), 1);
	assert_eq!(ranking[0].user.username, "ann");
	assert_eq!(ranking[0].total_minutes, 25);
}

#[tokio::test]
async fn stop_without_active_session_is_not_found() {
	let app = test_app().await;
	let ann = seed_user(&app.store, "u1", "ann").await;
	assert!(matches!(
		app.learning.stop_session(&ann).await,
		Err(Error::NotFound(_))
	));
}

#[tokio::test]
async fn restart_after_stop_is_allowed() {
	let app = test_app().await;
	let ann = seed_user(&app.store, "u1", "ann").await;

	let session = app.learning.start_session(&ann, "math".to_string()).await.unwrap();
	app.learning
		.stop_session_at(&ann, session.started_at + Duration::minutes(5))
		.await
		.unwrap();

	let next = app.learning.start_session(&ann, "english".to_string()).await.unwrap();
	assert!(next.active);

	let finished = app.learning.sessions(&ann, None, None, 50).await.unwrap();
	assert_eq!(finished.len(), 1);
	assert_eq!(finished[0].duration_minutes, 5);
}

#[tokio::test]
async fn sub_minute_sessions_round_to_nearest_minute() {
	let app = test_app().await;
	let ann = seed_user(&app.store, "u1", "ann").await;

	let session = app.learning.start_session(&ann, "math".to_string()).await.unwrap();
	let stopped = app
		.learning
		.stop_session_at(&ann, session.started_at + Duration::seconds(29))
		.await
		.unwrap();
	assert_eq!(stopped.duration_minutes, 0);

	let session = app.learning.start_session(&ann, "math".to_string()).await.unwrap();
	let stopped = app
		.learning
		.stop_session_at(&ann, session.started_at + Duration::seconds(31))
		.await
		.unwrap();
	assert_eq!(stopped.duration_minutes, 1);
}

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use campus_cache::Cache;
use campus_domain::{User, UserId};
use campus_realtime::ConnectionRegistry;
use campus_store::Store;

use crate::auth::TokenService;
use crate::config::RankingSettings;
use crate::push::PushService;
use crate::services::accounts::AccountService;
use crate::services::hashtags::HashtagService;
use crate::services::learning::LearningService;
use crate::services::messaging::MessagingService;
use crate::services::notes::NotesService;
use crate::services::notifications::NotificationService;
use crate::services::rankings::RankingService;
use crate::services::social::SocialService;
use crate::util::secret::SecretString;

pub(crate) struct TestApp {
	pub store: Store,
	pub cache: Cache,
	pub registry: Arc<ConnectionRegistry>,
	pub accounts: AccountService,
	pub messaging: MessagingService,
	pub notifications: NotificationService,
	pub rankings: RankingService,
	pub social: SocialService,
	pub hashtags: HashtagService,
	pub learning: LearningService,
	pub notes: NotesService,
}

pub(crate) async fn test_app() -> TestApp {
	test_app_with(RankingSettings::default()).await
}

pub(crate) async fn test_app_with(ranking_cfg: RankingSettings) -> TestApp {
	let store = Store::connect("sqlite::memory:").await.expect("in-memory store");
	let cache = Cache::in_memory();
	let registry = Arc::new(ConnectionRegistry::new());
	let push = PushService::disabled(store.clone());
	let tokens = TokenService::new(SecretString::new("test-secret"), Duration::from_secs(3600));

	let notifications = NotificationService::new(store.clone(), cache.clone(), Arc::clone(&registry), push);
	let rankings = RankingService::new(store.clone(), cache.clone(), ranking_cfg);
	let hashtags = HashtagService::new(store.clone());
	let social = SocialService::new(
		store.clone(),
		cache.clone(),
		Arc::clone(&registry),
		notifications.clone(),
		rankings.clone(),
		hashtags.clone(),
	);
	let learning = LearningService::new(store.clone(), rankings.clone());
	let notes = NotesService::new(store.clone());
	let messaging = MessagingService::new(store.clone());
	let accounts = AccountService::new(store.clone(), tokens, None);

	TestApp {
		store,
		cache,
		registry,
		accounts,
		messaging,
		notifications,
		rankings,
		social,
		hashtags,
		learning,
		notes,
	}
}

pub(crate) async fn seed_user(store: &Store, id: &str, username: &str) -> UserId {
	let user_id = UserId::new(id).expect("valid user id");
	store
		.insert_user(&User {
			id: user_id.clone(),
			username: username.to_string(),
			email: format!("{username}@example.com"),
			password_hash: None,
			google_id: None,
			access_token: None,
			refresh_token: None,
			profile_picture: None,
			cover_picture: None,
			bio: None,
			background_color: None,
			font: None,
			followers: Vec::new(),
			following: Vec::new(),
			device_token: None,
			created_at: Utc::now(),
		})
		.await
		.expect("insert user");
	user_id
}

/// Let detached fan-out tasks run to completion.
pub(crate) async fn settle() {
	tokio::time::sleep(Duration::from_millis(50)).await;
}

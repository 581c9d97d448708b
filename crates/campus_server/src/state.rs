#![forbid(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use campus_cache::Cache;
use campus_realtime::ConnectionRegistry;
use campus_store::Store;

use crate::auth::TokenService;
use crate::services::accounts::AccountService;
use crate::services::hashtags::HashtagService;
use crate::services::learning::LearningService;
use crate::services::messaging::MessagingService;
use crate::services::notes::NotesService;
use crate::services::notifications::NotificationService;
use crate::services::rankings::RankingService;
use crate::services::social::SocialService;

/// Shared application state handed to the HTTP and socket layers.
///
/// Everything here is constructed once in `main`; services are injected,
/// never reached through globals.
pub struct AppState {
	pub store: Store,
	pub cache: Cache,
	pub registry: Arc<ConnectionRegistry>,
	pub tokens: TokenService,

	pub accounts: AccountService,
	pub messaging: MessagingService,
	pub notifications: NotificationService,
	pub rankings: RankingService,
	pub social: SocialService,
	pub hashtags: HashtagService,
	pub learning: LearningService,
	pub notes: NotesService,

	ready: AtomicBool,
}

impl AppState {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		store: Store,
		cache: Cache,
		registry: Arc<ConnectionRegistry>,
		tokens: TokenService,
		accounts: AccountService,
		messaging: MessagingService,
		notifications: NotificationService,
		rankings: RankingService,
		social: SocialService,
		hashtags: HashtagService,
		learning: LearningService,
		notes: NotesService,
	) -> Self {
		Self {
			store,
			cache,
			registry,
			tokens,
			accounts,
			messaging,
			notifications,
			rankings,
			social,
			hashtags,
			learning,
			notes,
			ready: AtomicBool::new(false),
		}
	}

	pub fn mark_ready(&self) {
		self.ready.store(true, Ordering::Relaxed);
	}

	pub fn is_ready(&self) -> bool {
		self.ready.load(Ordering::Relaxed)
	}
}

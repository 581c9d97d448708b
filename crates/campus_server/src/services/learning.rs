#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};

use campus_domain::{Error, LearningSession, Result, SessionId, UserId};
use campus_store::Store;

use crate::services::rankings::RankingService;

/// Study-session tracking: at most one active session per user; stopping
/// computes the duration and feeds the weekly ranking.
#[derive(Clone)]
pub struct LearningService {
	store: Store,
	rankings: RankingService,
}

impl LearningService {
	pub fn new(store: Store, rankings: RankingService) -> Self {
		Self { store, rankings }
	}

	pub async fn start_session(&self, user: &UserId, subject: String) -> Result<LearningSession> {
		if self.store.active_session(user).await?.is_some() {
			return Err(Error::conflict("a learning session is already active"));
		}

		let session = LearningSession {
			id: SessionId::generate(),
			user_id: user.clone(),
			subject,
			started_at: Utc::now(),
			ended_at: None,
			duration_minutes: 0,
			active: true,
		};
		self.store.insert_session(&session).await?;
		metrics::counter!("campus_learning_sessions_started_total").increment(1);
		Ok(session)
	}

	pub async fn stop_session(&self, user: &UserId) -> Result<LearningSession> {
		self.stop_session_at(user, Utc::now()).await
	}

	/// Stop with an explicit clock, used by tests to pin durations.
	pub async fn stop_session_at(&self, user: &UserId, now: DateTime<Utc>) -> Result<LearningSession> {
		let Some(session) = self.store.active_session(user).await? else {
			return Err(Error::NotFound("active learning session"));
		};

		let duration_minutes = ((now - session.started_at).num_seconds() as f64 / 60.0).round() as i64;
		let duration_minutes = duration_minutes.max(0);
		self.store.finish_session(&session.id, now, duration_minutes).await?;

		self.rankings.record_study_time(user, duration_minutes, session.started_at).await;

		Ok(LearningSession {
			ended_at: Some(now),
			duration_minutes,
			active: false,
			..session
		})
	}

	pub async fn active_session(&self, user: &UserId) -> Result<Option<LearningSession>> {
		Ok(self.store.active_session(user).await?)
	}

	pub async fn sessions(
		&self,
		user: &UserId,
		since: Option<DateTime<Utc>>,
		until: Option<DateTime<Utc>>,
		limit: i64,
	) -> Result<Vec<LearningSession>> {
		Ok(self.store.sessions_for_user(user, since, until, limit.clamp(1, 100)).await?)
	}
}

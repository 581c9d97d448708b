#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use campus_cache::{Cache, CacheOp};
use campus_domain::{
	Error, Notification, NotificationId, NotificationKind, PostId, Result, UserId, UserSummary,
};
use campus_realtime::{ConnectionRegistry, ServerEvent};
use campus_store::Store;

use crate::push::PushService;

/// Capped length of the per-receiver recent-notifications cache list.
pub const RECENT_CAP: i64 = 50;

fn recent_key(receiver: &UserId) -> String {
	format!("notifications:recent:{receiver}")
}

/// Denormalized cache snapshot of one notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSnapshot {
	pub id: NotificationId,
	pub sender: UserSummary,
	pub kind: NotificationKind,
	#[serde(default)]
	pub post_id: Option<PostId>,
	pub read: bool,
	pub created_at_unix_ms: i64,
}

/// Durable notifications plus the capped recent-list cache, socket fan-out,
/// and push delivery.
///
/// The store write is authoritative and synchronous; everything after it is
/// a detached best-effort side effect.
#[derive(Clone)]
pub struct NotificationService {
	store: Store,
	cache: Cache,
	registry: Arc<ConnectionRegistry>,
	push: PushService,
}

impl NotificationService {
	pub fn new(store: Store, cache: Cache, registry: Arc<ConnectionRegistry>, push: PushService) -> Self {
		Self {
			store,
			cache,
			registry,
			push,
		}
	}

	/// Record a notification-worthy event. Self-notification is skipped.
	pub async fn notify(
		&self,
		sender: &UserId,
		receiver: &UserId,
		kind: NotificationKind,
		post_id: Option<PostId>,
	) -> Result<()> {
		if sender == receiver {
			debug!(user = %sender, kind = %kind, "skipping self-notification");
			return Ok(());
		}

		let notification = Notification {
			id: NotificationId::generate(),
			sender: sender.clone(),
			receiver: receiver.clone(),
			kind,
			post_id,
			read: false,
			created_at: Utc::now(),
		};
		self.store.insert_notification(&notification).await?;
		metrics::counter!("campus_notifications_total").increment(1);

		let sender_summary = self
			.store
			.user_summaries(std::slice::from_ref(sender))
			.await?
			.remove(sender);

		let service = self.clone();
		tokio::spawn(async move {
			service.fan_out(notification, sender_summary).await;
		});

		Ok(())
	}

	/// Detached side effects after the authoritative write: cache list
	/// update, socket emit, push delivery. Never fails the caller.
	async fn fan_out(&self, notification: Notification, sender: Option<UserSummary>) {
		let Some(sender) = sender else {
			// Sender row vanished between write and fan-out; nothing useful
			// to denormalize.
			return;
		};

		let snapshot = NotificationSnapshot {
			id: notification.id.clone(),
			sender: sender.clone(),
			kind: notification.kind,
			post_id: notification.post_id.clone(),
			read: false,
			created_at_unix_ms: notification.created_at.timestamp_millis(),
		};

		let key = recent_key(&notification.receiver);
		match serde_json::to_string(&snapshot) {
			Ok(raw) => {
				self.cache.lpush(&key, &raw).await;
				self.cache.ltrim(&key, 0, RECENT_CAP - 1).await;
			}
			Err(e) => warn!(error = %e, "failed to encode notification snapshot"),
		}

		self.registry.send_to_user(
			&notification.receiver,
			ServerEvent::Notification {
				sender_id: notification.sender.clone(),
				sender_name: sender.username.clone(),
				kind: notification.kind,
				post_id: notification.post_id.clone(),
			},
		);

		let body = match notification.kind {
			NotificationKind::Like => format!("{} liked your post", sender.username),
			NotificationKind::Comment => format!("{} commented on your post", sender.username),
			NotificationKind::Follow => format!("{} started following you", sender.username),
		};
		let mut data = BTreeMap::new();
		data.insert("kind".to_string(), notification.kind.as_str().to_string());
		if let Some(post_id) = &notification.post_id {
			data.insert("post_id".to_string(), post_id.as_str().to_string());
		}
		self.push.send_to_user(&notification.receiver, "campus", &body, data).await;
	}

	/// Recent-notification feed: cache list first, durable store on miss,
	/// then an async best-effort reseed of the list.
	pub async fn feed(&self, receiver: &UserId) -> Result<Vec<NotificationSnapshot>> {
		let key = recent_key(receiver);

		let cached = self.cache.lrange(&key, 0, RECENT_CAP - 1).await;
		if !cached.is_empty() {
			metrics::counter!("campus_notifications_feed_cache_hits_total").increment(1);
			// Entries that fail to parse are dropped, not fatal.
			return Ok(cached
				.iter()
				.filter_map(|raw| serde_json::from_str(raw).ok())
				.collect());
		}

		metrics::counter!("campus_notifications_feed_cache_misses_total").increment(1);
		let snapshots = self.feed_from_store(receiver).await?;

		let service = self.clone();
		let reseed: Vec<NotificationSnapshot> = snapshots.clone();
		let receiver = receiver.clone();
		tokio::spawn(async move {
			service.reseed(&receiver, &reseed).await;
		});

		Ok(snapshots)
	}

	async fn feed_from_store(&self, receiver: &UserId) -> Result<Vec<NotificationSnapshot>> {
		let notifications = self.store.recent_notifications(receiver, RECENT_CAP).await?;

		let sender_ids: Vec<UserId> = notifications.iter().map(|n| n.sender.clone()).collect();
		let senders = self.store.user_summaries(&sender_ids).await?;

		Ok(notifications
			.into_iter()
			.filter_map(|n| {
				let sender = senders.get(&n.sender)?.clone();
				Some(NotificationSnapshot {
					id: n.id,
					sender,
					kind: n.kind,
					post_id: n.post_id,
					read: n.read,
					created_at_unix_ms: n.created_at.timestamp_millis(),
				})
			})
			.collect())
	}

	/// Delete-then-repush-then-trim; oldest first so the newest entry lands
	/// at the head.
	async fn reseed(&self, receiver: &UserId, snapshots: &[NotificationSnapshot]) {
		if snapshots.is_empty() {
			return;
		}

		let key = recent_key(receiver);
		let mut ops = vec![CacheOp::Del { key: key.clone() }];
		for snapshot in snapshots.iter().rev() {
			match serde_json::to_string(snapshot) {
				Ok(raw) => ops.push(CacheOp::Lpush {
					key: key.clone(),
					value: raw,
				}),
				Err(e) => warn!(error = %e, "failed to encode notification snapshot for reseed"),
			}
		}
		ops.push(CacheOp::Ltrim {
			key,
			start: 0,
			stop: RECENT_CAP - 1,
		});
		self.cache.pipeline(ops).await;
	}

	pub async fn mark_read(&self, id: &NotificationId) -> Result<Notification> {
		let Some(notification) = self.store.find_notification(id).await? else {
			return Err(Error::NotFound("notification"));
		};
		self.store.mark_notification_read(id).await?;

		// The cached snapshots now disagree on the read flag; drop the list
		// and let the next read reseed.
		self.cache.del(&recent_key(&notification.receiver)).await;

		self.store
			.find_notification(id)
			.await?
			.ok_or(Error::NotFound("notification"))
	}

	pub async fn mark_all_read(&self, receiver: &UserId) -> Result<u64> {
		let updated = self.store.mark_all_notifications_read(receiver).await?;
		self.cache.del(&recent_key(receiver)).await;
		Ok(updated)
	}
}

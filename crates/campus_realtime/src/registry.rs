#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;

use campus_domain::UserId;

use crate::events::ServerEvent;

/// Outbound side of one live socket connection.
///
/// Sends are `try_send`: a full or closed queue drops the event rather than
/// blocking the dispatcher.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
	conn_id: u64,
	tx: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
	pub fn new(conn_id: u64, tx: mpsc::Sender<ServerEvent>) -> Self {
		Self { conn_id, tx }
	}

	pub fn conn_id(&self) -> u64 {
		self.conn_id
	}

	/// Fire-and-forget delivery; returns false when the event was dropped.
	pub fn deliver(&self, event: ServerEvent) -> bool {
		match self.tx.try_send(event) {
			Ok(()) => true,
			Err(mpsc::error::TrySendError::Full(_)) => {
				metrics::counter!("campus_realtime_dropped_events_total").increment(1);
				false
			}
			Err(mpsc::error::TrySendError::Closed(_)) => false,
		}
	}
}

/// Process-wide user → live-connection table.
///
/// The event dispatcher is the only writer; the HTTP layer reads through
/// `send_to_user` for fan-out after durable writes. Critical sections are
/// short and never held across await points, so a std mutex suffices.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
	inner: Mutex<HashMap<UserId, ConnectionHandle>>,
}

impl ConnectionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Bind a user to a connection; a later registration for the same user
	/// replaces the earlier one (last-registration-wins). Broadcasts the
	/// updated roster to everyone.
	pub fn register(&self, user_id: UserId, handle: ConnectionHandle) {
		let replaced = {
			let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
			map.insert(user_id.clone(), handle).is_some()
		};
		if replaced {
			debug!(user_id = %user_id, "registry: replaced existing connection");
		} else {
			metrics::gauge!("campus_realtime_registered_users").increment(1.0);
		}
		self.broadcast_roster();
	}

	/// Remove the entry owning this connection id, if any.
	///
	/// Keyed by connection, not user: a replaced connection's disconnect
	/// must not evict the replacement registration.
	pub fn unregister(&self, conn_id: u64) -> Option<UserId> {
		let removed = {
			let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
			let user = map
				.iter()
				.find(|(_, handle)| handle.conn_id() == conn_id)
				.map(|(user, _)| user.clone());
			if let Some(user) = &user {
				map.remove(user);
			}
			user
		};

		if removed.is_some() {
			metrics::gauge!("campus_realtime_registered_users").decrement(1.0);
			self.broadcast_roster();
		}
		removed
	}

	pub fn lookup(&self, user_id: &UserId) -> Option<ConnectionHandle> {
		let map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		map.get(user_id).cloned()
	}

	/// Online user ids, sorted for stable rosters.
	pub fn online_users(&self) -> Vec<UserId> {
		let map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		let mut users: Vec<UserId> = map.keys().cloned().collect();
		users.sort();
		users
	}

	pub fn len(&self) -> usize {
		let map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		map.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Deliver to one user's connection; false when offline or dropped.
	pub fn send_to_user(&self, user_id: &UserId, event: ServerEvent) -> bool {
		match self.lookup(user_id) {
			Some(handle) => handle.deliver(event),
			None => false,
		}
	}

	/// Push the full roster to every registered connection. Acceptable at
	/// small scale; a known ceiling.
	fn broadcast_roster(&self) {
		let (users, handles) = {
			let map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
			let mut users: Vec<UserId> = map.keys().cloned().collect();
			users.sort();
			let handles: Vec<ConnectionHandle> = map.values().cloned().collect();
			(users, handles)
		};

		for handle in handles {
			handle.deliver(ServerEvent::Roster { users: users.clone() });
		}
	}
}

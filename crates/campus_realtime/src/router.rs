#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use campus_domain::time::unix_ms_now;

use crate::events::{ClientEvent, ServerEvent};
use crate::registry::{ConnectionHandle, ConnectionRegistry};

/// Settings for the event router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
	/// Capacity of the inbound event queue shared by all connections.
	pub inbound_queue_capacity: usize,

	pub debug_log_events: bool,
}

impl Default for RouterConfig {
	fn default() -> Self {
		Self {
			inbound_queue_capacity: 1024,
			debug_log_events: false,
		}
	}
}

/// Connection lifecycle inputs fed by the transport layer.
#[derive(Debug)]
enum Inbound {
	Connected { conn_id: u64, handle: ConnectionHandle },
	Event { conn_id: u64, event: ClientEvent },
	Disconnected { conn_id: u64 },
}

/// Clonable sender used by socket tasks to feed the dispatcher.
#[derive(Debug, Clone)]
pub struct RouterHandle {
	tx: mpsc::Sender<Inbound>,
}

impl RouterHandle {
	pub async fn connected(&self, conn_id: u64, handle: ConnectionHandle) {
		let _ = self.tx.send(Inbound::Connected { conn_id, handle }).await;
	}

	pub async fn event(&self, conn_id: u64, event: ClientEvent) {
		let _ = self.tx.send(Inbound::Event { conn_id, event }).await;
	}

	pub async fn disconnected(&self, conn_id: u64) {
		let _ = self.tx.send(Inbound::Disconnected { conn_id }).await;
	}
}

/// Per-connection lifecycle: Unregistered → Registered → Disconnected
/// (terminal, entry removed).
#[derive(Debug)]
enum Phase {
	Unregistered { handle: ConnectionHandle },
	Registered { user_id: campus_domain::UserId },
}

/// Single-task dispatcher over all socket events.
///
/// Each inbound event is handled to completion before the next one, so
/// registry mutation needs no cross-event locking. A handler never
/// propagates an error: malformed or out-of-order input is logged and the
/// connection stays alive.
pub struct EventRouter {
	cfg: RouterConfig,
	registry: Arc<ConnectionRegistry>,
	connections: HashMap<u64, Phase>,
	rx: mpsc::Receiver<Inbound>,
}

impl EventRouter {
	pub fn new(registry: Arc<ConnectionRegistry>, cfg: RouterConfig) -> (RouterHandle, Self) {
		let (tx, rx) = mpsc::channel(cfg.inbound_queue_capacity);
		(
			RouterHandle { tx },
			Self {
				cfg,
				registry,
				connections: HashMap::new(),
				rx,
			},
		)
	}

	/// Run the dispatch loop until every `RouterHandle` is dropped.
	pub async fn run(mut self) {
		info!("event router started");

		while let Some(inbound) = self.rx.recv().await {
			match inbound {
				Inbound::Connected { conn_id, handle } => {
					debug!(conn_id, "connection attached");
					self.connections.insert(conn_id, Phase::Unregistered { handle });
				}
				Inbound::Event { conn_id, event } => {
					metrics::counter!("campus_realtime_events_in_total").increment(1);
					self.handle_event(conn_id, event);
				}
				Inbound::Disconnected { conn_id } => self.handle_disconnect(conn_id),
			}
		}

		info!("event router exiting (all transports closed)");
	}

	fn handle_event(&mut self, conn_id: u64, event: ClientEvent) {
		if self.cfg.debug_log_events {
			debug!(conn_id, ?event, "dispatching socket event");
		}

		match event {
			ClientEvent::Register { user_id } => match self.connections.get_mut(&conn_id) {
				Some(phase @ Phase::Unregistered { .. }) => {
					let Phase::Unregistered { handle } = std::mem::replace(
						phase,
						Phase::Registered {
							user_id: user_id.clone(),
						},
					) else {
						return;
					};
					info!(conn_id, user_id = %user_id, "connection registered");
					self.registry.register(user_id, handle);
				}
				Some(Phase::Registered { user_id: bound }) => {
					debug!(conn_id, bound = %bound, "ignoring duplicate register");
				}
				None => {
					warn!(conn_id, "register from unknown connection; dropping");
				}
			},

			ClientEvent::SendMessage {
				sender_id,
				sender_name,
				sender_profile_picture,
				receiver_id,
				text,
				conversation_id,
			} => {
				let delivered = self.registry.send_to_user(
					&receiver_id,
					ServerEvent::Message {
						sender_id,
						sender_name,
						sender_profile_picture,
						text,
						conversation_id,
						sent_at_unix_ms: unix_ms_now(),
					},
				);
				if !delivered {
					// Offline receiver: no queuing; the durable write is the
					// catch-up path.
					metrics::counter!("campus_realtime_messages_undeliverable_total").increment(1);
					debug!(conn_id, receiver = %receiver_id, "receiver offline; message event dropped");
				}
			}

			ClientEvent::MarkAsRead {
				conversation_id,
				reader_id,
				sender_id,
			} => {
				if !self.registry.send_to_user(
					&sender_id,
					ServerEvent::MessageRead {
						conversation_id,
						reader_id,
						read_at_unix_ms: unix_ms_now(),
					},
				) {
					debug!(conn_id, sender = %sender_id, "sender offline; read receipt dropped");
				}
			}

			ClientEvent::Typing {
				conversation_id,
				user_id,
				receiver_id,
			} => {
				self.registry
					.send_to_user(&receiver_id, ServerEvent::UserTyping { conversation_id, user_id });
			}

			ClientEvent::StopTyping {
				conversation_id,
				user_id,
				receiver_id,
			} => {
				self.registry
					.send_to_user(&receiver_id, ServerEvent::UserStopTyping { conversation_id, user_id });
			}
		}
	}

	fn handle_disconnect(&mut self, conn_id: u64) {
		match self.connections.remove(&conn_id) {
			Some(Phase::Registered { user_id }) => {
				info!(conn_id, user_id = %user_id, "connection disconnected");
				self.registry.unregister(conn_id);
			}
			Some(Phase::Unregistered { .. }) => {
				debug!(conn_id, "connection disconnected before registering");
			}
			None => {}
		}
	}
}

/// Spawn the dispatcher task.
pub fn spawn_event_router(registry: Arc<ConnectionRegistry>, cfg: RouterConfig) -> RouterHandle {
	let (handle, router) = EventRouter::new(registry, cfg);
	tokio::spawn(async move {
		router.run().await;
	});
	handle
}

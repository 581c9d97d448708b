#![forbid(unsafe_code)]

use tokio::sync::mpsc;

use campus_domain::UserId;

use crate::events::ServerEvent;
use crate::registry::{ConnectionHandle, ConnectionRegistry};

fn user(id: &str) -> UserId {
	UserId::new(id).expect("valid user id")
}

fn handle(conn_id: u64) -> (ConnectionHandle, mpsc::Receiver<ServerEvent>) {
	let (tx, rx) = mpsc::channel(16);
	(ConnectionHandle::new(conn_id, tx), rx)
}

fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
	let mut events = Vec::new();
	while let Ok(event) = rx.try_recv() {
		events.push(event);
	}
	events
}

#[tokio::test]
async fn last_registration_wins() {
	let registry = ConnectionRegistry::new();
	let (c1, mut rx1) = handle(1);
	let (c2, _rx2) = handle(2);

	registry.register(user("u1"), c1);
	registry.register(user("u1"), c2);

	assert_eq!(registry.len(), 1);
	let current = registry.lookup(&user("u1")).expect("registered");
	assert_eq!(current.conn_id(), 2);

	// The replaced connection saw the roster broadcasts but is no longer
	// addressed.
	drain(&mut rx1);
	assert!(registry.send_to_user(&user("u1"), ServerEvent::Roster { users: vec![] }));
	assert!(drain(&mut rx1).is_empty());
}

#[tokio::test]
async fn unregister_is_keyed_by_connection_not_user() {
	let registry = ConnectionRegistry::new();
	let (c1, _rx1) = handle(1);
	let (c2, _rx2) = handle(2);

	registry.register(user("u1"), c1);
	registry.register(user("u1"), c2);

	// The stale connection disconnects after being replaced; the live
	// registration must survive.
	assert!(registry.unregister(1).is_none());
	assert_eq!(registry.lookup(&user("u1")).expect("still registered").conn_id(), 2);

	assert_eq!(registry.unregister(2), Some(user("u1")));
	assert!(registry.lookup(&user("u1")).is_none());
	assert!(registry.is_empty());
}

#[tokio::test]
async fn roster_broadcasts_on_register_and_unregister() {
	let registry = ConnectionRegistry::new();
	let (c1, mut rx1) = handle(1);
	let (c2, _rx2) = handle(2);

	registry.register(user("a"), c1);
	registry.register(user("b"), c2);
	registry.unregister(2);

	let rosters: Vec<Vec<UserId>> = drain(&mut rx1)
		.into_iter()
		.map(|event| match event {
			ServerEvent::Roster { users } => users,
			other => panic!("expected roster, got {other:?}"),
		})
		.collect();

	assert_eq!(
		rosters,
		vec![
			vec![user("a")],
			vec![user("a"), user("b")],
			vec![user("a")],
		]
	);
}

#[tokio::test]
async fn send_to_offline_user_reports_undelivered() {
	let registry = ConnectionRegistry::new();
	assert!(!registry.send_to_user(
		&user("ghost"),
		ServerEvent::Roster { users: Vec::new() }
	));
}

#[tokio::test]
async fn full_subscriber_queue_drops_instead_of_blocking() {
	let registry = ConnectionRegistry::new();
	let (tx, mut rx) = mpsc::channel(1);
	registry.register(user("u1"), ConnectionHandle::new(1, tx));

	// Queue already holds the roster broadcast from registration.
	assert!(!registry.send_to_user(&user("u1"), ServerEvent::Roster { users: Vec::new() }));

	assert_eq!(drain(&mut rx).len(), 1);
}

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use campus_realtime::{ClientEvent, ConnectionHandle, RouterHandle, ServerEvent};

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Accept WebSocket connections and bridge them onto the event router.
pub fn spawn_ws_listener(bind: SocketAddr, router: RouterHandle, queue_capacity: usize) {
	tokio::spawn(async move {
		if let Err(err) = run_ws_listener(bind, router, queue_capacity).await {
			warn!(error = %err, "websocket listener stopped");
		}
	});
}

async fn run_ws_listener(bind: SocketAddr, router: RouterHandle, queue_capacity: usize) -> anyhow::Result<()> {
	let listener = TcpListener::bind(bind).await?;
	info!(%bind, "websocket listener ready");

	loop {
		let (stream, remote) = listener.accept().await?;
		let conn_id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
		metrics::counter!("campus_ws_connections_total").increment(1);
		debug!(conn_id, %remote, "accepted socket connection");

		let router = router.clone();
		tokio::spawn(async move {
			if let Err(err) = handle_socket(stream, conn_id, router, queue_capacity).await {
				debug!(conn_id, error = %err, "socket connection closed with error");
			}
		});
	}
}

async fn handle_socket(
	stream: TcpStream,
	conn_id: u64,
	router: RouterHandle,
	queue_capacity: usize,
) -> anyhow::Result<()> {
	let ws = tokio_tungstenite::accept_async(stream).await?;
	let (mut sink, mut source) = ws.split();

	let (tx, mut rx) = mpsc::channel::<ServerEvent>(queue_capacity);
	router.connected(conn_id, ConnectionHandle::new(conn_id, tx)).await;

	// Outbound pump: serialize router events onto the wire.
	let writer = tokio::spawn(async move {
		while let Some(event) = rx.recv().await {
			let raw = match serde_json::to_string(&event) {
				Ok(raw) => raw,
				Err(e) => {
					warn!(conn_id, error = %e, "failed to encode outbound socket event");
					continue;
				}
			};
			if sink.send(Message::Text(raw.into())).await.is_err() {
				break;
			}
		}
	});

	// Inbound loop: a malformed frame is logged and skipped, never fatal.
	while let Some(message) = source.next().await {
		let message = match message {
			Ok(m) => m,
			Err(e) => {
				debug!(conn_id, error = %e, "socket read error");
				break;
			}
		};

		match message {
			Message::Text(raw) => match serde_json::from_str::<ClientEvent>(raw.as_str()) {
				Ok(event) => router.event(conn_id, event).await,
				Err(e) => {
					metrics::counter!("campus_ws_malformed_events_total").increment(1);
					warn!(conn_id, error = %e, "ignoring malformed socket event");
				}
			},
			Message::Close(_) => break,
			// Pings are answered by the protocol layer; binary frames have
			// no meaning here.
			Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
		}
	}

	router.disconnected(conn_id).await;
	writer.abort();
	debug!(conn_id, "socket connection closed");
	Ok(())
}

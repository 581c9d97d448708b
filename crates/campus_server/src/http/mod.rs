#![forbid(unsafe_code)]

mod auth_routes;
mod chat_routes;
mod misc_routes;
mod post_routes;
mod user_routes;

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use campus_domain::{Error, Result, UserId};

use crate::state::AppState;

pub type HttpResponse = Response<Full<Bytes>>;

/// Serve the REST API until the process exits.
pub async fn run_api_server(bind: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
	let listener = TcpListener::bind(bind).await?;
	info!(%bind, "api server listening");

	loop {
		let (stream, _remote) = listener.accept().await?;
		let io = TokioIo::new(stream);
		let state = Arc::clone(&state);
		tokio::spawn(async move {
			let service = service_fn(move |req| handle(req, Arc::clone(&state)));
			if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
				warn!(error = %err, "api connection error");
			}
		});
	}
}

async fn handle(req: Request<Incoming>, state: Arc<AppState>) -> std::result::Result<HttpResponse, hyper::Error> {
	metrics::counter!("campus_api_requests_total").increment(1);

	let method = req.method().clone();
	let path = req.uri().path().to_string();
	let segments: Vec<String> = path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect();

	let response = match route(req, &state, &method, &segments).await {
		Ok(response) => response,
		Err(err) => error_response(&err),
	};
	Ok(response)
}

async fn route(
	req: Request<Incoming>,
	state: &Arc<AppState>,
	method: &Method,
	segments: &[String],
) -> Result<HttpResponse> {
	let parts: Vec<&str> = segments.iter().map(String::as_str).collect();

	match (method, parts.as_slice()) {
		(&Method::GET, ["healthz"]) => Ok(text_response(StatusCode::OK, "ok")),
		(&Method::GET, ["readyz"]) => {
			if state.is_ready() {
				Ok(text_response(StatusCode::OK, "ready"))
			} else {
				Ok(text_response(StatusCode::SERVICE_UNAVAILABLE, "not-ready"))
			}
		}

		(_, ["api", rest @ ..]) => route_api(req, state, method, rest).await,

		_ => Err(Error::NotFound("route")),
	}
}

async fn route_api(
	req: Request<Incoming>,
	state: &Arc<AppState>,
	method: &Method,
	parts: &[&str],
) -> Result<HttpResponse> {
	match parts {
		["auth", rest @ ..] => auth_routes::route(req, state, method, rest).await,
		["users", rest @ ..] => user_routes::route(req, state, method, rest).await,
		["posts", rest @ ..] => post_routes::route(req, state, method, rest).await,
		["conversations", rest @ ..] => chat_routes::route_conversations(req, state, method, rest).await,
		["messages", rest @ ..] => chat_routes::route_messages(req, state, method, rest).await,
		["notifications", rest @ ..] => misc_routes::route_notifications(req, state, method, rest).await,
		["hashtags", rest @ ..] => misc_routes::route_hashtags(req, state, method, rest).await,
		["learning", rest @ ..] => misc_routes::route_learning(req, state, method, rest).await,
		["notes", rest @ ..] => misc_routes::route_notes(req, state, method, rest).await,
		_ => Err(Error::NotFound("route")),
	}
}

pub(crate) fn json_response<T: Serialize>(status: StatusCode, value: &T) -> HttpResponse {
	let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
	Response::builder()
		.status(status)
		.header("content-type", "application/json")
		.body(Full::new(Bytes::from(body)))
		.unwrap_or_default()
}

pub(crate) fn message_response(status: StatusCode, message: &str) -> HttpResponse {
	json_response(status, &json!({ "message": message }))
}

fn text_response(status: StatusCode, body: &'static str) -> HttpResponse {
	Response::builder()
		.status(status)
		.body(Full::new(Bytes::from_static(body.as_bytes())))
		.unwrap_or_default()
}

pub(crate) fn error_response(err: &Error) -> HttpResponse {
	if let Error::System(source) = err {
		error!(error = ?source, "request failed");
	}
	metrics::counter!("campus_api_errors_total", "status" => err.status().to_string()).increment(1);

	let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
	json_response(status, &json!({ "error": err.public_message() }))
}

/// Parse a JSON request body; malformed input is the caller's fault.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(req: Request<Incoming>) -> Result<T> {
	let bytes = req
		.into_body()
		.collect()
		.await
		.map_err(|e| Error::validation(format!("failed to read request body: {e}")))?
		.to_bytes();
	serde_json::from_slice(&bytes).map_err(|e| Error::validation(format!("invalid request body: {e}")))
}

/// Resolve the authenticated user from the bearer token.
pub(crate) fn bearer_user(req: &Request<Incoming>, state: &AppState) -> Result<UserId> {
	let header = req
		.headers()
		.get(hyper::header::AUTHORIZATION)
		.and_then(|v| v.to_str().ok())
		.ok_or_else(|| Error::authorization("missing bearer token"))?;
	let token = header
		.strip_prefix("Bearer ")
		.ok_or_else(|| Error::authorization("missing bearer token"))?;
	Ok(state.tokens.authenticate(token)?)
}

/// One query-string parameter, percent-decoding left to clients.
pub(crate) fn query_param(req: &Request<Incoming>, name: &str) -> Option<String> {
	let query = req.uri().query()?;
	for pair in query.split('&') {
		if let Some((key, value)) = pair.split_once('=')
			&& key == name
			&& !value.is_empty()
		{
			return Some(value.to_string());
		}
	}
	None
}

pub(crate) fn parse_id<T: std::str::FromStr>(raw: &str, what: &'static str) -> Result<T> {
	raw.parse::<T>().map_err(|_| Error::validation(format!("invalid {what}")))
}

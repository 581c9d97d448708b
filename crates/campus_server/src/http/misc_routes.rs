#![forbid(unsafe_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hyper::body::Incoming;
use hyper::{Method, Request, StatusCode};
use serde::Deserialize;

use campus_domain::{Error, NoteId, NotificationId, Result, UserId};

use crate::http::{HttpResponse, bearer_user, json_response, message_response, parse_id, query_param, read_json};
use crate::state::AppState;

pub(crate) async fn route_notifications(
	req: Request<Incoming>,
	state: &Arc<AppState>,
	method: &Method,
	parts: &[&str],
) -> Result<HttpResponse> {
	match (method, parts) {
		(&Method::GET, [user_id]) => {
			let user_id: UserId = parse_id(user_id, "user id")?;
			let feed = state.notifications.feed(&user_id).await?;
			Ok(json_response(StatusCode::OK, &feed))
		}

		(&Method::PUT, ["read-all", user_id]) => {
			let user_id: UserId = parse_id(user_id, "user id")?;
			state.notifications.mark_all_read(&user_id).await?;
			Ok(message_response(StatusCode::OK, "all notifications marked as read"))
		}

		(&Method::PUT, [id, "read"]) => {
			let id: NotificationId = parse_id(id, "notification id")?;
			let notification = state.notifications.mark_read(&id).await?;
			Ok(json_response(StatusCode::OK, &notification))
		}

		_ => Err(Error::NotFound("route")),
	}
}

pub(crate) async fn route_hashtags(
	_req: Request<Incoming>,
	state: &Arc<AppState>,
	method: &Method,
	parts: &[&str],
) -> Result<HttpResponse> {
	match (method, parts) {
		(&Method::GET, ["trending"]) => {
			let trending = state.hashtags.trending(Utc::now()).await?;
			Ok(json_response(StatusCode::OK, &trending))
		}

		(&Method::GET, ["search", tag]) => {
			let posts = state.hashtags.posts_for_tag(tag).await?;
			Ok(json_response(StatusCode::OK, &posts))
		}

		_ => Err(Error::NotFound("route")),
	}
}

#[derive(Deserialize, Default)]
struct StartSessionBody {
	#[serde(default)]
	subject: String,
}

pub(crate) async fn route_learning(
	req: Request<Incoming>,
	state: &Arc<AppState>,
	method: &Method,
	parts: &[&str],
) -> Result<HttpResponse> {
	match (method, parts) {
		(&Method::POST, ["sessions", "start"]) => {
			let user = bearer_user(&req, state)?;
			let body: StartSessionBody = read_json(req).await.unwrap_or_default();
			let session = state.learning.start_session(&user, body.subject).await?;
			Ok(json_response(StatusCode::CREATED, &session))
		}

		(&Method::POST, ["sessions", "stop"]) => {
			let user = bearer_user(&req, state)?;
			let session = state.learning.stop_session(&user).await?;
			Ok(json_response(StatusCode::OK, &session))
		}

		(&Method::GET, ["sessions", "active"]) => {
			let user = bearer_user(&req, state)?;
			let session = state.learning.active_session(&user).await?;
			Ok(json_response(StatusCode::OK, &session))
		}

		(&Method::GET, ["sessions"]) => {
			let user = bearer_user(&req, state)?;
			let since = query_param(&req, "start_date").and_then(|raw| raw.parse::<DateTime<Utc>>().ok());
			let until = query_param(&req, "end_date").and_then(|raw| raw.parse::<DateTime<Utc>>().ok());
			let limit = query_param(&req, "limit")
				.and_then(|raw| raw.parse::<i64>().ok())
				.unwrap_or(50);
			let sessions = state.learning.sessions(&user, since, until, limit).await?;
			Ok(json_response(StatusCode::OK, &sessions))
		}

		(&Method::GET, ["ranking", "weekly"]) => {
			let ranking = state.rankings.weekly_ranking(Utc::now()).await?;
			Ok(json_response(StatusCode::OK, &ranking))
		}

		_ => Err(Error::NotFound("route")),
	}
}

#[derive(Deserialize)]
struct CreateNoteBody {
	text: String,
}

pub(crate) async fn route_notes(
	req: Request<Incoming>,
	state: &Arc<AppState>,
	method: &Method,
	parts: &[&str],
) -> Result<HttpResponse> {
	match (method, parts) {
		(&Method::POST, []) => {
			let user = bearer_user(&req, state)?;
			let body: CreateNoteBody = read_json(req).await?;
			let note = state.notes.create(&user, body.text).await?;
			Ok(json_response(StatusCode::CREATED, &note))
		}

		(&Method::GET, ["timeline"]) => {
			let user = bearer_user(&req, state)?;
			let timeline = state.notes.timeline(&user).await?;
			Ok(json_response(StatusCode::OK, &timeline))
		}

		(&Method::DELETE, [id]) => {
			let user = bearer_user(&req, state)?;
			let id: NoteId = parse_id(id, "note id")?;
			state.notes.delete(&id, &user).await?;
			Ok(message_response(StatusCode::OK, "the note has been deleted"))
		}

		_ => Err(Error::NotFound("route")),
	}
}

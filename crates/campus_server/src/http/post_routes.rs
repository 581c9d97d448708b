#![forbid(unsafe_code)]

use std::sync::Arc;

use chrono::Utc;
use hyper::body::Incoming;
use hyper::{Method, Request, StatusCode};
use serde::Deserialize;
use serde_json::json;

use campus_domain::{CommentId, Error, PostId, Result, UserId};

use crate::http::{HttpResponse, json_response, message_response, parse_id, query_param, read_json};
use crate::services::social::LikeOutcome;
use crate::state::AppState;

#[derive(Deserialize)]
struct CreatePostBody {
	user_id: UserId,
	text: String,
	media: Option<String>,
}

#[derive(Deserialize)]
struct UpdatePostBody {
	user_id: UserId,
	text: String,
	media: Option<String>,
}

#[derive(Deserialize)]
struct ActorBody {
	user_id: UserId,
}

#[derive(Deserialize)]
struct CommentBody {
	user_id: UserId,
	text: String,
	media: Option<String>,
}

pub(crate) async fn route(
	req: Request<Incoming>,
	state: &Arc<AppState>,
	method: &Method,
	parts: &[&str],
) -> Result<HttpResponse> {
	match (method, parts) {
		(&Method::POST, []) => {
			let body: CreatePostBody = read_json(req).await?;
			let post = state.social.create_post(&body.user_id, body.text, body.media).await?;
			Ok(json_response(StatusCode::CREATED, &post))
		}

		(&Method::GET, ["timeline", "all"]) => {
			let posts = state.social.timeline().await?;
			Ok(json_response(StatusCode::OK, &posts))
		}

		(&Method::GET, ["profile", username]) => {
			let posts = state.social.profile_posts(username).await?;
			Ok(json_response(StatusCode::OK, &posts))
		}

		(&Method::GET, ["search"]) => {
			let query = query_param(&req, "q").ok_or_else(|| Error::validation("q query parameter required"))?;
			let posts = state.social.search_posts(&query).await?;
			Ok(json_response(StatusCode::OK, &posts))
		}

		(&Method::GET, ["ranking", "daily"]) => {
			let ranking = state.rankings.daily_like_ranking(Utc::now()).await?;
			Ok(json_response(StatusCode::OK, &ranking))
		}

		(&Method::GET, [id]) => {
			let id: PostId = parse_id(id, "post id")?;
			let post = state.social.get_post(&id).await?;
			Ok(json_response(StatusCode::OK, &post))
		}

		(&Method::PUT, [id]) => {
			let id: PostId = parse_id(id, "post id")?;
			let body: UpdatePostBody = read_json(req).await?;
			state.social.update_post(&id, &body.user_id, body.text, body.media).await?;
			Ok(message_response(StatusCode::OK, "the post has been updated"))
		}

		(&Method::DELETE, [id]) => {
			let id: PostId = parse_id(id, "post id")?;
			let body: ActorBody = read_json(req).await?;
			state.social.delete_post(&id, &body.user_id).await?;
			Ok(message_response(StatusCode::OK, "the post has been deleted"))
		}

		(&Method::PUT, [id, "like"]) => {
			let id: PostId = parse_id(id, "post id")?;
			let body: ActorBody = read_json(req).await?;
			let outcome = state.social.toggle_like(&id, &body.user_id).await?;
			let message = match outcome {
				LikeOutcome::Liked => "the post has been liked",
				LikeOutcome::Unliked => "the post has been unliked",
			};
			Ok(json_response(StatusCode::OK, &json!({ "message": message, "outcome": outcome })))
		}

		(&Method::POST, [id, "comments"]) => {
			let id: PostId = parse_id(id, "post id")?;
			let body: CommentBody = read_json(req).await?;
			let comment = state.social.add_comment(&id, &body.user_id, body.text, body.media).await?;
			Ok(json_response(StatusCode::CREATED, &comment))
		}

		(&Method::GET, [id, "comments"]) => {
			let id: PostId = parse_id(id, "post id")?;
			let comments = state.social.comments(&id).await?;
			Ok(json_response(StatusCode::OK, &comments))
		}

		(&Method::DELETE, [id, "comments", comment_id]) => {
			let id: PostId = parse_id(id, "post id")?;
			let comment_id: CommentId = parse_id(comment_id, "comment id")?;
			let body: ActorBody = read_json(req).await?;
			state.social.delete_comment(&id, &comment_id, &body.user_id).await?;
			Ok(message_response(StatusCode::OK, "the comment has been deleted"))
		}

		_ => Err(Error::NotFound("route")),
	}
}

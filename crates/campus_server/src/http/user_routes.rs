#![forbid(unsafe_code)]

use std::sync::Arc;

use hyper::body::Incoming;
use hyper::{Method, Request, StatusCode};
use serde::Deserialize;

use campus_domain::{Error, Result, UserId};
use campus_store::UserPatch;

use crate::http::{HttpResponse, bearer_user, json_response, message_response, parse_id, query_param, read_json};
use crate::state::AppState;

#[derive(Deserialize)]
struct ActorBody {
	user_id: UserId,
}

#[derive(Deserialize, Default)]
struct ProfileBody {
	profile_picture: Option<String>,
	cover_picture: Option<String>,
	bio: Option<String>,
	background_color: Option<String>,
	font: Option<String>,
}

#[derive(Deserialize)]
struct DeviceTokenBody {
	device_token: Option<String>,
}

pub(crate) async fn route(
	req: Request<Incoming>,
	state: &Arc<AppState>,
	method: &Method,
	parts: &[&str],
) -> Result<HttpResponse> {
	match (method, parts) {
		// Lookup by query: ?user_id= or ?username=
		(&Method::GET, []) => {
			let user = if let Some(raw) = query_param(&req, "user_id") {
				state.accounts.get_user(&parse_id(&raw, "user id")?).await?
			} else if let Some(username) = query_param(&req, "username") {
				state.accounts.get_user_by_username(&username).await?
			} else {
				return Err(Error::validation("user_id or username query parameter required"));
			};
			Ok(json_response(StatusCode::OK, &user))
		}

		(&Method::GET, ["search"]) => {
			let query = query_param(&req, "q").unwrap_or_default();
			let users = state.accounts.search(&query).await?;
			Ok(json_response(StatusCode::OK, &users))
		}

		(&Method::PUT, [id]) => {
			let id: UserId = parse_id(id, "user id")?;
			let acting = bearer_user(&req, state)?;
			let body: ProfileBody = read_json(req).await?;
			let user = state
				.accounts
				.update_profile(
					&id,
					&acting,
					UserPatch {
						profile_picture: body.profile_picture,
						cover_picture: body.cover_picture,
						bio: body.bio,
						background_color: body.background_color,
						font: body.font,
					},
				)
				.await?;
			Ok(json_response(StatusCode::OK, &user))
		}

		(&Method::PUT, [id, "follow"]) => {
			let target: UserId = parse_id(id, "user id")?;
			let body: ActorBody = read_json(req).await?;
			state.social.follow(&body.user_id, &target).await?;
			Ok(message_response(StatusCode::OK, "user has been followed"))
		}

		(&Method::PUT, [id, "unfollow"]) => {
			let target: UserId = parse_id(id, "user id")?;
			let body: ActorBody = read_json(req).await?;
			state.social.unfollow(&body.user_id, &target).await?;
			Ok(message_response(StatusCode::OK, "user has been unfollowed"))
		}

		(&Method::PUT, [id, "device-token"]) => {
			let id: UserId = parse_id(id, "user id")?;
			let acting = bearer_user(&req, state)?;
			let body: DeviceTokenBody = read_json(req).await?;
			state.accounts.set_device_token(&id, &acting, body.device_token).await?;
			Ok(message_response(StatusCode::OK, "device token updated"))
		}

		(&Method::GET, [id, "friends"]) => {
			let id: UserId = parse_id(id, "user id")?;
			let friends = state.social.friends(&id).await?;
			Ok(json_response(StatusCode::OK, &friends))
		}

		(&Method::GET, [id, "followers"]) => {
			let id: UserId = parse_id(id, "user id")?;
			let followers = state.social.followers(&id).await?;
			Ok(json_response(StatusCode::OK, &followers))
		}

		_ => Err(Error::NotFound("route")),
	}
}

#![forbid(unsafe_code)]

use std::sync::Arc;

use hyper::body::Incoming;
use hyper::{Method, Request, StatusCode};
use serde::Deserialize;

use campus_domain::{Error, Result};

use crate::http::{HttpResponse, bearer_user, json_response, read_json};
use crate::state::AppState;

#[derive(Deserialize)]
struct RegisterBody {
	username: String,
	email: String,
	password: String,
}

#[derive(Deserialize)]
struct LoginBody {
	email: String,
	password: String,
}

#[derive(Deserialize)]
struct GoogleBody {
	code: String,
}

pub(crate) async fn route(
	req: Request<Incoming>,
	state: &Arc<AppState>,
	method: &Method,
	parts: &[&str],
) -> Result<HttpResponse> {
	match (method, parts) {
		(&Method::POST, ["register"]) => {
			let body: RegisterBody = read_json(req).await?;
			let authenticated = state.accounts.register(body.username, body.email, body.password).await?;
			Ok(json_response(StatusCode::CREATED, &authenticated))
		}

		(&Method::POST, ["login"]) => {
			let body: LoginBody = read_json(req).await?;
			let authenticated = state.accounts.login(body.email, body.password).await?;
			Ok(json_response(StatusCode::OK, &authenticated))
		}

		(&Method::POST, ["google"]) => {
			let body: GoogleBody = read_json(req).await?;
			let authenticated = state.accounts.google_sign_in(&body.code).await?;
			Ok(json_response(StatusCode::OK, &authenticated))
		}

		(&Method::GET, ["me"]) => {
			let user_id = bearer_user(&req, state)?;
			let user = state.accounts.get_user(&user_id).await?;
			Ok(json_response(StatusCode::OK, &user))
		}

		// Rotate the stored provider tokens on expiry of the access token.
		(&Method::POST, ["refresh"]) => {
			let user_id = bearer_user(&req, state)?;
			state.accounts.refresh_provider_tokens(&user_id).await?;
			let user = state.accounts.get_user(&user_id).await?;
			Ok(json_response(StatusCode::OK, &user))
		}

		_ => Err(Error::NotFound("route")),
	}
}

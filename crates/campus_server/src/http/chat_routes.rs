#![forbid(unsafe_code)]

use std::sync::Arc;

use hyper::body::Incoming;
use hyper::{Method, Request, StatusCode};
use serde::Deserialize;
use serde_json::json;

use campus_domain::{Attachment, ConversationId, Error, MessageId, Result, UserId};

use crate::http::{HttpResponse, json_response, message_response, parse_id, read_json};
use crate::state::AppState;

#[derive(Deserialize)]
struct OpenConversationBody {
	sender_id: UserId,
	receiver_id: UserId,
}

#[derive(Deserialize)]
struct ActorBody {
	user_id: UserId,
}

#[derive(Deserialize)]
struct SendMessageBody {
	conversation_id: ConversationId,
	sender: UserId,
	#[serde(default)]
	text: String,
	#[serde(default)]
	attachments: Vec<Attachment>,
}

#[derive(Deserialize)]
struct EditMessageBody {
	user_id: UserId,
	text: String,
}

pub(crate) async fn route_conversations(
	req: Request<Incoming>,
	state: &Arc<AppState>,
	method: &Method,
	parts: &[&str],
) -> Result<HttpResponse> {
	match (method, parts) {
		(&Method::POST, []) => {
			let body: OpenConversationBody = read_json(req).await?;
			let conversation = state.messaging.open_conversation(&body.sender_id, &body.receiver_id).await?;
			Ok(json_response(StatusCode::CREATED, &conversation))
		}

		(&Method::GET, ["unread-total", user_id]) => {
			let user_id: UserId = parse_id(user_id, "user id")?;
			let total = state.messaging.unread_total(&user_id).await?;
			Ok(json_response(StatusCode::OK, &json!({ "total": total })))
		}

		(&Method::GET, ["find", a, b]) => {
			let a: UserId = parse_id(a, "user id")?;
			let b: UserId = parse_id(b, "user id")?;
			let conversation = state.messaging.find_pair(&a, &b).await?;
			Ok(json_response(StatusCode::OK, &conversation))
		}

		(&Method::GET, [user_id]) => {
			let user_id: UserId = parse_id(user_id, "user id")?;
			let conversations = state.messaging.list_conversations(&user_id).await?;
			Ok(json_response(StatusCode::OK, &conversations))
		}

		(&Method::DELETE, [id]) => {
			let id: ConversationId = parse_id(id, "conversation id")?;
			let body: ActorBody = read_json(req).await?;
			state.messaging.delete_conversation(&id, &body.user_id).await?;
			Ok(message_response(StatusCode::OK, "the conversation has been deleted"))
		}

		_ => Err(Error::NotFound("route")),
	}
}

pub(crate) async fn route_messages(
	req: Request<Incoming>,
	state: &Arc<AppState>,
	method: &Method,
	parts: &[&str],
) -> Result<HttpResponse> {
	match (method, parts) {
		(&Method::POST, []) => {
			let body: SendMessageBody = read_json(req).await?;
			let message = state
				.messaging
				.send_message(&body.conversation_id, &body.sender, body.text, body.attachments)
				.await?;
			Ok(json_response(StatusCode::CREATED, &message))
		}

		(&Method::GET, ["unread", user_id]) => {
			let user_id: UserId = parse_id(user_id, "user id")?;
			let (total, by_conversation) = state.messaging.unread_breakdown(&user_id).await?;
			Ok(json_response(
				StatusCode::OK,
				&json!({ "total": total, "by_conversation": by_conversation }),
			))
		}

		(&Method::PUT, ["read-all", conversation_id]) => {
			let conversation_id: ConversationId = parse_id(conversation_id, "conversation id")?;
			let body: ActorBody = read_json(req).await?;
			state.messaging.mark_all_read(&conversation_id, &body.user_id).await?;
			Ok(message_response(StatusCode::OK, "all messages marked as read"))
		}

		(&Method::GET, [conversation_id]) => {
			let conversation_id: ConversationId = parse_id(conversation_id, "conversation id")?;
			let messages = state.messaging.messages(&conversation_id).await?;
			Ok(json_response(StatusCode::OK, &messages))
		}

		(&Method::PUT, [id, "read"]) => {
			let id: MessageId = parse_id(id, "message id")?;
			let body: ActorBody = read_json(req).await?;
			let message = state.messaging.mark_message_read(&id, &body.user_id).await?;
			Ok(json_response(StatusCode::OK, &message))
		}

		(&Method::PUT, [id]) => {
			let id: MessageId = parse_id(id, "message id")?;
			let body: EditMessageBody = read_json(req).await?;
			let message = state.messaging.edit_message(&id, &body.user_id, body.text).await?;
			Ok(json_response(StatusCode::OK, &message))
		}

		(&Method::DELETE, [id]) => {
			let id: MessageId = parse_id(id, "message id")?;
			let body: ActorBody = read_json(req).await?;
			state.messaging.delete_message(&id, &body.user_id).await?;
			Ok(message_response(StatusCode::OK, "the message has been deleted"))
		}

		_ => Err(Error::NotFound("route")),
	}
}

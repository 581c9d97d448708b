#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use campus_domain::{ConversationId, NotificationKind, PostId, UserId};

/// Socket events sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
	/// Bind this connection to a user (per-user room).
	Register {
		user_id: UserId,
	},

	/// Realtime copy of a direct message. Durability comes from the REST
	/// write; this path is fire-and-forget for online receivers only.
	SendMessage {
		sender_id: UserId,
		sender_name: String,
		#[serde(default)]
		sender_profile_picture: Option<String>,
		receiver_id: UserId,
		text: String,
		conversation_id: ConversationId,
	},

	/// Tell the sender their messages were read.
	MarkAsRead {
		conversation_id: ConversationId,
		reader_id: UserId,
		sender_id: UserId,
	},

	Typing {
		conversation_id: ConversationId,
		user_id: UserId,
		receiver_id: UserId,
	},

	StopTyping {
		conversation_id: ConversationId,
		user_id: UserId,
		receiver_id: UserId,
	},
}

/// Socket events pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
	/// Full online roster, broadcast on every register/unregister.
	Roster {
		users: Vec<UserId>,
	},

	Message {
		sender_id: UserId,
		sender_name: String,
		#[serde(default)]
		sender_profile_picture: Option<String>,
		text: String,
		conversation_id: ConversationId,
		sent_at_unix_ms: i64,
	},

	MessageRead {
		conversation_id: ConversationId,
		reader_id: UserId,
		read_at_unix_ms: i64,
	},

	UserTyping {
		conversation_id: ConversationId,
		user_id: UserId,
	},

	UserStopTyping {
		conversation_id: ConversationId,
		user_id: UserId,
	},

	Notification {
		sender_id: UserId,
		sender_name: String,
		kind: NotificationKind,
		#[serde(default)]
		post_id: Option<PostId>,
	},

	NewPost {
		username: String,
		#[serde(default)]
		profile_picture: Option<String>,
		post_id: PostId,
	},
}

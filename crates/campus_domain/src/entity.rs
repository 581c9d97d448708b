#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CommentId, ConversationId, MessageId, NoteId, NotificationId, ParseIdError, PostId, SessionId, UserId};

/// Full user record as stored.
///
/// Credential material is either a bcrypt `password_hash` or federated
/// `google_id` + token pair; both may be absent only transiently during
/// account linking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
	pub id: UserId,
	pub username: String,
	pub email: String,

	#[serde(skip_serializing, default)]
	pub password_hash: Option<String>,

	pub google_id: Option<String>,
	#[serde(skip_serializing, default)]
	pub access_token: Option<String>,
	#[serde(skip_serializing, default)]
	pub refresh_token: Option<String>,

	pub profile_picture: Option<String>,
	pub cover_picture: Option<String>,
	pub bio: Option<String>,
	pub background_color: Option<String>,
	pub font: Option<String>,

	pub followers: Vec<UserId>,
	pub following: Vec<UserId>,

	/// Push registration token; cleared when the gateway reports it dead.
	pub device_token: Option<String>,

	pub created_at: DateTime<Utc>,
}

/// Denormalized user fields embedded in list views and notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
	pub id: UserId,
	pub username: String,
	pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
	pub id: PostId,
	pub user_id: UserId,
	pub text: String,
	pub media: Option<String>,

	/// Set semantics: membership toggles, no duplicates.
	pub likes: Vec<UserId>,

	/// Denormalized count of live comments referencing this post.
	pub comment_count: i64,

	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
	pub id: CommentId,
	pub post_id: PostId,
	pub user_id: UserId,
	pub text: String,
	pub media: Option<String>,
	pub created_at: DateTime<Utc>,
}

/// Two-or-more member direct conversation with a denormalized
/// last-message snapshot and per-member unread counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
	pub id: ConversationId,
	pub members: Vec<UserId>,

	pub last_message_id: Option<MessageId>,
	pub last_message_text: Option<String>,
	pub last_message_at: Option<DateTime<Utc>>,

	/// Keys are a subset of `members`; values are non-negative.
	pub unread: HashMap<UserId, u32>,

	pub created_at: DateTime<Utc>,
}

impl Conversation {
	pub fn unread_for(&self, user: &UserId) -> u32 {
		self.unread.get(user).copied().unwrap_or(0)
	}

	pub fn is_member(&self, user: &UserId) -> bool {
		self.members.contains(user)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
	Image,
	File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
	pub kind: AttachmentKind,
	pub url: String,
	pub filename: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
	pub id: MessageId,
	pub conversation_id: ConversationId,
	pub sender: UserId,
	pub text: String,
	pub attachments: Vec<Attachment>,

	pub read: bool,
	pub read_at: Option<DateTime<Utc>>,

	/// Soft delete: set means invisible to all read paths.
	pub deleted_at: Option<DateTime<Utc>>,

	pub edited: bool,
	pub edited_at: Option<DateTime<Utc>>,

	pub created_at: DateTime<Utc>,
}

/// Notification-worthy event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
	Like,
	Comment,
	Follow,
}

impl NotificationKind {
	pub const fn as_str(self) -> &'static str {
		match self {
			NotificationKind::Like => "like",
			NotificationKind::Comment => "comment",
			NotificationKind::Follow => "follow",
		}
	}
}

impl fmt::Display for NotificationKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for NotificationKind {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"like" => Ok(NotificationKind::Like),
			"comment" => Ok(NotificationKind::Comment),
			"follow" => Ok(NotificationKind::Follow),
			other => Err(ParseIdError::UnknownKind(other.to_string())),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
	pub id: NotificationId,
	pub sender: UserId,
	pub receiver: UserId,
	pub kind: NotificationKind,
	pub post_id: Option<PostId>,
	pub read: bool,
	pub created_at: DateTime<Utc>,
}

/// Per-(tag, day) occurrence counter used for trending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashtagCount {
	pub tag: String,
	/// `YYYY-MM-DD` (UTC) day bucket.
	pub day: String,
	pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningSession {
	pub id: SessionId,
	pub user_id: UserId,
	pub subject: String,
	pub started_at: DateTime<Utc>,
	pub ended_at: Option<DateTime<Utc>>,
	/// Whole minutes, computed when the session is stopped.
	pub duration_minutes: i64,
	pub active: bool,
}

/// Ephemeral status text; at most one live note per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
	pub id: NoteId,
	pub user_id: UserId,
	pub text: String,
	pub created_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
}

/// Maximum note length in characters.
pub const NOTE_MAX_CHARS: usize = 60;

/// Maximum post/comment body length in characters.
pub const BODY_MAX_CHARS: usize = 500;

/// Maximum hashtag length in characters (without the `#`).
pub const HASHTAG_MAX_CHARS: usize = 10;

/// One ranking row after joining display data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedUser {
	pub rank: u32,
	pub user: UserSummary,
	pub total_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedPost {
	pub rank: u32,
	pub post_id: PostId,
	pub excerpt: String,
	pub likes: i64,
}

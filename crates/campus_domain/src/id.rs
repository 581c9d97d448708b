#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("unknown kind: {0}")]
	UnknownKind(String),
}

macro_rules! entity_id {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(String);

		impl $name {
			/// Create a non-empty id.
			pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
				let id = id.into();
				if id.trim().is_empty() {
					return Err(ParseIdError::Empty);
				}
				Ok(Self(id))
			}

			/// Mint a fresh random id.
			pub fn generate() -> Self {
				Self(uuid::Uuid::new_v4().to_string())
			}

			pub fn as_str(&self) -> &str {
				&self.0
			}

			pub fn into_string(self) -> String {
				self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl FromStr for $name {
			type Err = ParseIdError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				$name::new(s.to_string())
			}
		}
	};
}

entity_id!(
	/// Application user identifier.
	UserId
);
entity_id!(
	/// Post identifier.
	PostId
);
entity_id!(
	/// Comment identifier.
	CommentId
);
entity_id!(
	/// Conversation identifier.
	ConversationId
);
entity_id!(
	/// Message identifier.
	MessageId
);
entity_id!(
	/// Notification identifier.
	NotificationId
);
entity_id!(
	/// Ephemeral note identifier.
	NoteId
);
entity_id!(
	/// Learning session identifier.
	SessionId
);

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ids_reject_empty_and_blank() {
		assert!(UserId::new("").is_err());
		assert!(PostId::new("   ").is_err());
		assert!("".parse::<ConversationId>().is_err());
	}

	#[test]
	fn id_display_roundtrip() {
		let id = UserId::new("u1").unwrap();
		assert_eq!(id.to_string(), "u1");
		assert_eq!("u1".parse::<UserId>().unwrap(), id);
	}

	#[test]
	fn generated_ids_are_unique() {
		assert_ne!(MessageId::generate(), MessageId::generate());
	}
}

#![forbid(unsafe_code)]

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;

use campus_domain::{
	Attachment, Conversation, ConversationId, Error, Message, MessageId, Result, UserId, UserSummary,
};
use campus_store::Store;

/// Conversation with hydrated member summaries and the caller's unread
/// count pulled out of the counter map.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationView {
	#[serde(flatten)]
	pub conversation: Conversation,
	pub member_profiles: Vec<UserSummary>,
	pub my_unread: u32,
}

/// Message with its sender hydrated for display.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
	#[serde(flatten)]
	pub message: Message,
	pub sender_summary: Option<UserSummary>,
}

/// Direct-messaging writes and reads.
///
/// Every mutating path writes the durable store first: the message row,
/// then the conversation's denormalized last-message snapshot, then the
/// per-member unread counters. Realtime delivery is the socket layer's
/// separate fire-and-forget path.
#[derive(Clone)]
pub struct MessagingService {
	store: Store,
}

impl MessagingService {
	pub fn new(store: Store) -> Self {
		Self { store }
	}

	/// Find the conversation between two users, creating it with zeroed
	/// unread counters when absent.
	pub async fn open_conversation(&self, sender: &UserId, receiver: &UserId) -> Result<Conversation> {
		if sender == receiver {
			return Err(Error::validation("cannot open a conversation with yourself"));
		}

		if let Some(existing) = self.store.find_conversation_by_pair(sender, receiver).await? {
			return Ok(existing);
		}

		let conversation = Conversation {
			id: ConversationId::generate(),
			members: vec![sender.clone(), receiver.clone()],
			last_message_id: None,
			last_message_text: None,
			last_message_at: None,
			unread: HashMap::from([(sender.clone(), 0), (receiver.clone(), 0)]),
			created_at: Utc::now(),
		};
		self.store.insert_conversation(&conversation).await?;
		metrics::counter!("campus_conversations_created_total").increment(1);
		Ok(conversation)
	}

	pub async fn list_conversations(&self, user: &UserId) -> Result<Vec<ConversationView>> {
		let conversations = self.store.conversations_for_user(user).await?;
		let mut views = Vec::with_capacity(conversations.len());
		for conversation in conversations {
			views.push(self.hydrate(conversation, user).await?);
		}
		Ok(views)
	}

	pub async fn find_pair(&self, a: &UserId, b: &UserId) -> Result<Option<ConversationView>> {
		match self.store.find_conversation_by_pair(a, b).await? {
			Some(conversation) => Ok(Some(self.hydrate(conversation, a).await?)),
			None => Ok(None),
		}
	}

	async fn hydrate(&self, conversation: Conversation, viewer: &UserId) -> Result<ConversationView> {
		let summaries = self.store.user_summaries(&conversation.members).await?;
		let member_profiles = conversation
			.members
			.iter()
			.filter_map(|id| summaries.get(id).cloned())
			.collect();
		let my_unread = conversation.unread_for(viewer);
		Ok(ConversationView {
			conversation,
			member_profiles,
			my_unread,
		})
	}

	/// Members only. Messages are soft-deleted (kept for audit), the
	/// conversation row itself is removed.
	pub async fn delete_conversation(&self, id: &ConversationId, acting: &UserId) -> Result<()> {
		let Some(conversation) = self.store.find_conversation(id).await? else {
			return Err(Error::NotFound("conversation"));
		};
		if !conversation.is_member(acting) {
			return Err(Error::authorization("only members can delete a conversation"));
		}

		self.store.soft_delete_conversation_messages(id, Utc::now()).await?;
		self.store.delete_conversation(id).await?;
		Ok(())
	}

	/// Total unread across all of a user's conversations.
	pub async fn unread_total(&self, user: &UserId) -> Result<u32> {
		let conversations = self.store.conversations_for_user(user).await?;
		Ok(conversations.iter().map(|c| c.unread_for(user)).sum())
	}

	/// Total plus per-conversation unread breakdown.
	pub async fn unread_breakdown(&self, user: &UserId) -> Result<(u32, HashMap<ConversationId, u32>)> {
		let conversations = self.store.conversations_for_user(user).await?;
		let mut by_conversation = HashMap::with_capacity(conversations.len());
		let mut total = 0;
		for conversation in conversations {
			let count = conversation.unread_for(user);
			total += count;
			by_conversation.insert(conversation.id, count);
		}
		Ok((total, by_conversation))
	}

	/// Append a message: insert, refresh the last-message snapshot, bump
	/// every other member's unread counter.
	pub async fn send_message(
		&self,
		conversation_id: &ConversationId,
		sender: &UserId,
		text: String,
		attachments: Vec<Attachment>,
	) -> Result<MessageView> {
		if text.trim().is_empty() && attachments.is_empty() {
			return Err(Error::validation("message must have text or attachments"));
		}

		let Some(conversation) = self.store.find_conversation(conversation_id).await? else {
			return Err(Error::NotFound("conversation"));
		};
		if !conversation.is_member(sender) {
			return Err(Error::authorization("only members can send messages"));
		}

		let message = Message {
			id: MessageId::generate(),
			conversation_id: conversation_id.clone(),
			sender: sender.clone(),
			text,
			attachments,
			read: false,
			read_at: None,
			deleted_at: None,
			edited: false,
			edited_at: None,
			created_at: Utc::now(),
		};

		self.store.insert_message(&message).await?;
		self.store
			.set_last_message(conversation_id, Some((&message.id, &message.text, message.created_at)))
			.await?;
		self.store.increment_unread_except(conversation_id, sender).await?;
		metrics::counter!("campus_messages_total").increment(1);

		let summaries = self.store.user_summaries(std::slice::from_ref(sender)).await?;
		Ok(MessageView {
			sender_summary: summaries.get(sender).cloned(),
			message,
		})
	}

	/// Visible messages, oldest first, senders hydrated.
	pub async fn messages(&self, conversation_id: &ConversationId) -> Result<Vec<MessageView>> {
		let messages = self.store.messages_for_conversation(conversation_id).await?;

		let sender_ids: Vec<UserId> = messages.iter().map(|m| m.sender.clone()).collect();
		let summaries = self.store.user_summaries(&sender_ids).await?;

		Ok(messages
			.into_iter()
			.map(|message| MessageView {
				sender_summary: summaries.get(&message.sender).cloned(),
				message,
			})
			.collect())
	}

	/// Sender-only edit; refreshes the conversation snapshot text when the
	/// edited message is the latest one.
	pub async fn edit_message(&self, id: &MessageId, acting: &UserId, text: String) -> Result<Message> {
		if text.trim().is_empty() {
			return Err(Error::validation("message text must be non-empty"));
		}

		let Some(message) = self.store.find_message(id).await? else {
			return Err(Error::NotFound("message"));
		};
		if message.deleted_at.is_some() {
			return Err(Error::NotFound("message"));
		}
		if &message.sender != acting {
			return Err(Error::authorization("only the sender can edit a message"));
		}

		self.store.update_message_body(id, &text, Utc::now()).await?;

		if let Some(conversation) = self.store.find_conversation(&message.conversation_id).await?
			&& conversation.last_message_id.as_ref() == Some(id)
		{
			self.store.set_last_message_text(&message.conversation_id, &text).await?;
		}

		self.store.find_message(id).await?.ok_or(Error::NotFound("message"))
	}

	/// Sender-only soft delete. When the deleted message was the latest,
	/// the conversation's snapshot is recomputed to the next visible
	/// message, or cleared when none remains.
	pub async fn delete_message(&self, id: &MessageId, acting: &UserId) -> Result<()> {
		let Some(message) = self.store.find_message(id).await? else {
			return Err(Error::NotFound("message"));
		};
		if message.deleted_at.is_some() {
			return Err(Error::NotFound("message"));
		}
		if &message.sender != acting {
			return Err(Error::authorization("only the sender can delete a message"));
		}

		self.store.soft_delete_message(id, Utc::now()).await?;

		if let Some(conversation) = self.store.find_conversation(&message.conversation_id).await?
			&& conversation.last_message_id.as_ref() == Some(id)
		{
			let snapshot = self.store.latest_visible_message(&message.conversation_id).await?;
			self.store
				.set_last_message(
					&message.conversation_id,
					snapshot.as_ref().map(|m| (&m.id, m.text.as_str(), m.created_at)),
				)
				.await?;
		}

		Ok(())
	}

	/// Readers other than the sender mark a single message read.
	pub async fn mark_message_read(&self, id: &MessageId, acting: &UserId) -> Result<Message> {
		let Some(message) = self.store.find_message(id).await? else {
			return Err(Error::NotFound("message"));
		};
		if &message.sender != acting && !message.read {
			self.store.mark_message_read(id, Utc::now()).await?;
		}
		self.store.find_message(id).await?.ok_or(Error::NotFound("message"))
	}

	/// Bulk-read everything the reader hasn't sent, then zero the reader's
	/// unread counter on the conversation.
	pub async fn mark_all_read(&self, conversation_id: &ConversationId, reader: &UserId) -> Result<u64> {
		let updated = self.store.mark_all_read(conversation_id, reader, Utc::now()).await?;
		self.store.zero_unread(conversation_id, reader).await?;
		Ok(updated)
	}
}

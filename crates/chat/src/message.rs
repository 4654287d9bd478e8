use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mingle_core::{ChatroomId, MessageId, UserId};

/// Maximum chat message length in characters.
pub const MAX_MESSAGE_LEN: usize = 1000;

/// Characters of the message body kept in the chatroom's last-message preview.
pub const PREVIEW_LEN: usize = 80;

/// Why an inbound chat send was refused.
///
/// These surface as an `error` event on the sender's socket; the connection
/// stays open.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatSendError {
    #[error("message body must not be empty")]
    EmptyBody,

    #[error("message exceeds {MAX_MESSAGE_LEN} characters")]
    BodyTooLong,

    #[error("chatroom not found")]
    UnknownChatroom,

    #[error("sender is not a member of this chatroom")]
    NotAMember,
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub chatroom: ChatroomId,
    pub sender: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Validate and build a message ready for persistence.
    pub fn create(
        chatroom: ChatroomId,
        sender: UserId,
        body: impl Into<String>,
    ) -> Result<Self, ChatSendError> {
        let body = body.into();
        if body.trim().is_empty() {
            return Err(ChatSendError::EmptyBody);
        }
        if body.chars().count() > MAX_MESSAGE_LEN {
            return Err(ChatSendError::BodyTooLong);
        }
        Ok(Self {
            id: MessageId::new(),
            chatroom,
            sender,
            body,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_validates_body() {
        let room = ChatroomId::new();
        let sender = UserId::new();
        assert!(ChatMessage::create(room, sender, "hey").is_ok());
        assert_eq!(
            ChatMessage::create(room, sender, "  "),
            Err(ChatSendError::EmptyBody)
        );
        assert_eq!(
            ChatMessage::create(room, sender, "x".repeat(MAX_MESSAGE_LEN + 1)),
            Err(ChatSendError::BodyTooLong)
        );
    }
}

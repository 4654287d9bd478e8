use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mingle_core::{ChatroomId, DomainError, DomainResult, MessageId, UserId};

use crate::message::{ChatMessage, PREVIEW_LEN};

/// Pointer to the most recent message in a chatroom, kept on the room so
/// chatroom listings don't need a message query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub message_id: MessageId,
    pub sender: UserId,
    pub preview: String,
    pub sent_at: DateTime<Utc>,
}

impl LastMessage {
    pub fn of(message: &ChatMessage) -> Self {
        Self {
            message_id: message.id,
            sender: message.sender,
            preview: message.body.chars().take(PREVIEW_LEN).collect(),
            sent_at: message.created_at,
        }
    }
}

/// A chatroom with a fixed member set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chatroom {
    pub id: ChatroomId,
    pub members: Vec<UserId>,
    pub last_message: Option<LastMessage>,
    pub created_at: DateTime<Utc>,
}

impl Chatroom {
    /// Create a chatroom. The creator must be a member; at least two distinct
    /// members are required.
    pub fn create(creator: UserId, mut members: Vec<UserId>) -> DomainResult<Self> {
        if !members.contains(&creator) {
            members.push(creator);
        }
        members.sort();
        members.dedup();
        if members.len() < 2 {
            return Err(DomainError::validation(
                "chatroom needs at least two distinct members",
            ));
        }
        Ok(Self {
            id: ChatroomId::new(),
            members,
            last_message: None,
            created_at: Utc::now(),
        })
    }

    pub fn is_member(&self, user: UserId) -> bool {
        self.members.contains(&user)
    }

    /// Record `message` as the room's most recent message.
    pub fn record_last_message(&mut self, message: &ChatMessage) {
        self.last_message = Some(LastMessage::of(message));
    }
}

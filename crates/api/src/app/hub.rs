//! Per-account realtime channels for the chat relay.
//!
//! Each connected account gets a broadcast channel; the websocket session
//! subscribes to its account's channel and the send path publishes to every
//! chatroom member's channel. Publishing to an account with no live socket
//! reports non-delivery so the caller can fall back to a notification.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use mingle_core::UserId;
use mingle_chat::ChatMessage;

/// Buffered events per account channel before slow consumers start lagging.
const CHANNEL_CAPACITY: usize = 64;

/// Event sent to a connected chat client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Message {
        chatroom_id: String,
        message_id: String,
        sender_id: String,
        body: String,
        sent_at: DateTime<Utc>,
    },
    Error {
        code: &'static str,
        message: String,
    },
}

impl ServerEvent {
    pub fn message(message: &ChatMessage) -> Self {
        Self::Message {
            chatroom_id: message.chatroom.to_string(),
            message_id: message.id.to_string(),
            sender_id: message.sender.to_string(),
            body: message.body.clone(),
            sent_at: message.created_at,
        }
    }

    pub fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

/// Event received from a chat client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Send { chatroom_id: String, body: String },
}

#[derive(Clone, Default)]
pub struct ChatHub {
    channels: Arc<Mutex<HashMap<UserId, broadcast::Sender<ServerEvent>>>>,
}

impl ChatHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe the account's channel, creating it on first connect.
    pub fn subscribe(&self, account: UserId) -> broadcast::Receiver<ServerEvent> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(account)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Deliver an event to the account's live sockets. Returns whether at
    /// least one socket received it.
    pub fn publish(&self, account: UserId, event: ServerEvent) -> bool {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        match channels.get(&account) {
            Some(tx) if tx.receiver_count() > 0 => tx.send(event).is_ok(),
            Some(_) => {
                // Last socket went away; drop the idle channel.
                channels.remove(&account);
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let hub = ChatHub::new();
        let account = UserId::new();
        let mut rx = hub.subscribe(account);

        assert!(hub.publish(account, ServerEvent::error("test", "hello")));
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ServerEvent::Error { code: "test", .. }));
    }

    #[tokio::test]
    async fn publish_without_subscriber_reports_non_delivery() {
        let hub = ChatHub::new();
        assert!(!hub.publish(UserId::new(), ServerEvent::error("test", "nobody home")));
    }

    #[tokio::test]
    async fn dropped_subscriber_counts_as_offline() {
        let hub = ChatHub::new();
        let account = UserId::new();
        let rx = hub.subscribe(account);
        drop(rx);

        assert!(!hub.publish(account, ServerEvent::error("test", "gone")));
    }
}

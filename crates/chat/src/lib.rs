//! Chat domain module: chatrooms, messages, and inbound payload validation
//! for the realtime relay.

pub mod chatroom;
pub mod message;

pub use chatroom::{Chatroom, LastMessage};
pub use message::{ChatMessage, ChatSendError, MAX_MESSAGE_LEN, PREVIEW_LEN};

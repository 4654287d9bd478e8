//! Request/response DTOs and JSON mapping helpers.

use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use mingle_accounts::Account;
use mingle_chat::{ChatMessage, Chatroom};
use mingle_core::{Page, PageRequest, UserId};
use mingle_follows::Follow;
use mingle_notifications::Notification;
use mingle_posts::{Comment, Post, ReactionKind};

#[derive(Debug, Deserialize)]
pub struct RegisterAccountRequest {
    pub username: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub media_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub kind: ReactionKind,
}

#[derive(Debug, Deserialize)]
pub struct CreateChatroomRequest {
    pub member_ids: Vec<UserId>,
}

/// Keyset paging query parameters, shared by every listing endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub before: Option<Uuid>,
    pub limit: Option<usize>,
}

impl From<PageQuery> for PageRequest {
    fn from(q: PageQuery) -> Self {
        PageRequest {
            before: q.before,
            limit: q.limit,
        }
    }
}

pub fn account_to_json(account: &Account) -> Value {
    json!({
        "id": account.id.to_string(),
        "username": account.username,
        "display_name": account.display_name,
        "status": account.status,
        "created_at": account.created_at,
    })
}

pub fn post_to_json(post: &Post) -> Value {
    json!({
        "id": post.id.to_string(),
        "author_id": post.author.to_string(),
        "body": post.body,
        "media": post.media,
        "created_at": post.created_at,
    })
}

pub fn comment_to_json(comment: &Comment) -> Value {
    json!({
        "id": comment.id.to_string(),
        "post_id": comment.post.to_string(),
        "author_id": comment.author.to_string(),
        "body": comment.body,
        "created_at": comment.created_at,
    })
}

pub fn follow_to_json(follow: &Follow) -> Value {
    json!({
        "follower_id": follow.follower.to_string(),
        "followee_id": follow.followee.to_string(),
        "status": follow.status,
        "created_at": follow.created_at,
    })
}

pub fn notification_to_json(notification: &Notification) -> Value {
    json!({
        "id": notification.id.to_string(),
        "sender_id": notification.sender.to_string(),
        "kind": notification.kind,
        "post_id": notification.post.map(|p| p.to_string()),
        "read": notification.read,
        "created_at": notification.created_at,
    })
}

pub fn chatroom_to_json(room: &Chatroom) -> Value {
    json!({
        "id": room.id.to_string(),
        "member_ids": room.members.iter().map(|m| m.to_string()).collect::<Vec<_>>(),
        "last_message": room.last_message,
        "created_at": room.created_at,
    })
}

pub fn message_to_json(message: &ChatMessage) -> Value {
    json!({
        "id": message.id.to_string(),
        "chatroom_id": message.chatroom.to_string(),
        "sender_id": message.sender.to_string(),
        "body": message.body,
        "created_at": message.created_at,
    })
}

/// `{ items, next_cursor }` envelope for paged listings.
pub fn page_to_json<T>(page: &Page<T>, item_to_json: impl Fn(&T) -> Value) -> Value {
    json!({
        "items": page.items.iter().map(item_to_json).collect::<Vec<_>>(),
        "next_cursor": page.next_cursor.map(|c| c.to_string()),
    })
}

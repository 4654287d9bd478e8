use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mingle_core::{NotificationId, PostId, UserId};

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A followed account published a new post.
    NewPost,
    /// Someone commented on the receiver's post.
    Comment,
    /// Someone reacted to the receiver's post.
    Reaction,
    /// Someone requested to follow the receiver.
    FollowRequest,
    /// The receiver's follow request was accepted.
    FollowAccepted,
    /// A direct message arrived while the receiver was offline.
    Message,
}

/// A notification document delivered to one receiver.
///
/// There is deliberately no uniqueness key on (sender, receiver, post): a
/// retried fan-out job may deliver the same notification twice. That matches
/// the delivery semantics the rest of the system is built around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub sender: UserId,
    pub receiver: UserId,
    pub kind: NotificationKind,
    pub post: Option<PostId>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(sender: UserId, receiver: UserId, kind: NotificationKind, post: Option<PostId>) -> Self {
        Self {
            id: NotificationId::new(),
            sender,
            receiver,
            kind,
            post,
            read: false,
            created_at: Utc::now(),
        }
    }

    /// Fan-out record: `sender` published `post`, notify `receiver`.
    pub fn new_post(sender: UserId, receiver: UserId, post: PostId) -> Self {
        Self::new(sender, receiver, NotificationKind::NewPost, Some(post))
    }
}

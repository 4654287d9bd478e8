//! Entity store traits.
//!
//! One trait per domain area, each with a Postgres implementation
//! ([`postgres::PgSocialStore`]) and an in-memory implementation
//! ([`in_memory::InMemorySocialStore`]) for tests and development.

use futures::stream::BoxStream;
use serde::Serialize;

use mingle_accounts::Account;
use mingle_chat::{ChatMessage, Chatroom};
use mingle_core::{ChatroomId, Page, PageRequest, PostId, UserId};
use mingle_follows::Follow;
use mingle_notifications::Notification;
use mingle_posts::{Comment, Post, Reaction};

use crate::txn::StoreError;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemorySocialStore;
pub use postgres::PgSocialStore;

#[async_trait::async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account; duplicate usernames are a [`StoreError::Conflict`].
    async fn insert(&self, account: Account) -> Result<(), StoreError>;

    async fn get(&self, id: UserId) -> Result<Option<Account>, StoreError>;

    async fn get_by_username(&self, username: &str) -> Result<Option<Account>, StoreError>;

    /// Soft-delete; the `cleanup_account` job removes the account's artifacts.
    async fn mark_deleted(&self, id: UserId) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait PostStore: Send + Sync {
    async fn insert(&self, post: Post) -> Result<(), StoreError>;

    async fn get(&self, id: PostId) -> Result<Option<Post>, StoreError>;

    /// Soft-delete; the `cleanup_post` job removes the post's artifacts.
    async fn mark_deleted(&self, id: PostId) -> Result<(), StoreError>;

    /// Posts authored by `viewer`'s accepted followees, newest first.
    async fn feed(&self, viewer: UserId, page: PageRequest) -> Result<Page<Post>, StoreError>;

    async fn insert_comment(&self, comment: Comment) -> Result<(), StoreError>;

    async fn comments(&self, post: PostId, page: PageRequest) -> Result<Page<Comment>, StoreError>;

    /// Insert or replace the reactor's reaction to the post.
    async fn upsert_reaction(&self, reaction: Reaction) -> Result<(), StoreError>;

    async fn delete_reaction(&self, post: PostId, reactor: UserId) -> Result<(), StoreError>;

    /// Record that the media job derived `variant_key` for attachment `key`.
    async fn mark_media_processed(
        &self,
        post: PostId,
        key: &str,
        variant_key: &str,
    ) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
pub trait FollowStore: Send + Sync {
    /// Insert a pending follow edge; an existing edge is a conflict.
    async fn request(&self, follow: Follow) -> Result<(), StoreError>;

    /// Flip a pending edge to accepted; missing/already-accepted edges are
    /// [`StoreError::NotFound`].
    async fn accept(&self, follower: UserId, followee: UserId) -> Result<(), StoreError>;

    async fn remove(&self, follower: UserId, followee: UserId) -> Result<(), StoreError>;

    async fn get(&self, follower: UserId, followee: UserId) -> Result<Option<Follow>, StoreError>;

    /// Edges pointing at `followee` (who follows them), any status.
    async fn followers_of(&self, followee: UserId) -> Result<Vec<Follow>, StoreError>;

    /// Edges originating at `follower` (who they follow), any status.
    async fn following_of(&self, follower: UserId) -> Result<Vec<Follow>, StoreError>;

    /// Lazy cursor over accepted followers of `followee` whose accounts are
    /// still active. Finite, consumed at most once; a fresh call issues a
    /// fresh query.
    fn accepted_followers(&self, followee: UserId) -> BoxStream<'_, Result<UserId, StoreError>>;
}

#[async_trait::async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, notification: Notification) -> Result<(), StoreError>;

    /// Bulk insert one fan-out batch. Returns the number of records written.
    async fn insert_many(&self, batch: &[Notification]) -> Result<u64, StoreError>;

    async fn for_receiver(
        &self,
        receiver: UserId,
        page: PageRequest,
    ) -> Result<Page<Notification>, StoreError>;

    /// Mark every unread notification for `receiver` read; returns how many.
    async fn mark_all_read(&self, receiver: UserId) -> Result<u64, StoreError>;
}

#[async_trait::async_trait]
pub trait ChatStore: Send + Sync {
    async fn create_chatroom(&self, room: Chatroom) -> Result<(), StoreError>;

    async fn get_chatroom(&self, id: ChatroomId) -> Result<Option<Chatroom>, StoreError>;

    async fn chatrooms_of(&self, member: UserId) -> Result<Vec<Chatroom>, StoreError>;

    /// Persist a message and update the parent chatroom's last-message
    /// pointer, atomically.
    async fn append_message(&self, message: ChatMessage) -> Result<(), StoreError>;

    async fn messages(
        &self,
        room: ChatroomId,
        page: PageRequest,
    ) -> Result<Page<ChatMessage>, StoreError>;
}

/// Destructive multi-record maintenance performed by cleanup jobs. Each
/// operation runs as one retryable transaction in the Postgres
/// implementation.
#[async_trait::async_trait]
pub trait MaintenanceStore: Send + Sync {
    /// Remove a deleted post's comments, reactions, and notifications.
    async fn cleanup_post(&self, post: PostId) -> Result<CleanupReport, StoreError>;

    /// Remove a deleted account's posts, follow edges (both directions), and
    /// notifications addressed to it.
    async fn cleanup_account(&self, account: UserId) -> Result<CleanupReport, StoreError>;
}

/// What a cleanup pass removed, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub posts: u64,
    pub comments: u64,
    pub reactions: u64,
    pub follows: u64,
    pub notifications: u64,
}

//! Postgres-backed stores.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE accounts (
//!     id           UUID PRIMARY KEY,
//!     username     TEXT NOT NULL UNIQUE,
//!     display_name TEXT NOT NULL,
//!     status       TEXT NOT NULL,
//!     created_at   TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE posts (
//!     id         UUID PRIMARY KEY,
//!     author_id  UUID NOT NULL REFERENCES accounts (id),
//!     body       TEXT NOT NULL,
//!     media      JSONB NOT NULL,
//!     deleted    BOOLEAN NOT NULL DEFAULT FALSE,
//!     created_at TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE comments (
//!     id         UUID PRIMARY KEY,
//!     post_id    UUID NOT NULL,
//!     author_id  UUID NOT NULL,
//!     body       TEXT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE reactions (
//!     post_id    UUID NOT NULL,
//!     reactor_id UUID NOT NULL,
//!     kind       TEXT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     PRIMARY KEY (post_id, reactor_id)
//! );
//!
//! CREATE TABLE follows (
//!     follower_id UUID NOT NULL,
//!     followee_id UUID NOT NULL,
//!     status      TEXT NOT NULL,
//!     created_at  TIMESTAMPTZ NOT NULL,
//!     PRIMARY KEY (follower_id, followee_id)
//! );
//!
//! CREATE TABLE notifications (
//!     id          UUID PRIMARY KEY,
//!     sender_id   UUID NOT NULL,
//!     receiver_id UUID NOT NULL,
//!     kind        TEXT NOT NULL,
//!     post_id     UUID,
//!     is_read     BOOLEAN NOT NULL DEFAULT FALSE,
//!     created_at  TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE chatrooms (
//!     id           UUID PRIMARY KEY,
//!     member_ids   UUID[] NOT NULL,
//!     last_message JSONB,
//!     created_at   TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE chat_messages (
//!     id          UUID PRIMARY KEY,
//!     chatroom_id UUID NOT NULL REFERENCES chatrooms (id),
//!     sender_id   UUID NOT NULL,
//!     body        TEXT NOT NULL,
//!     created_at  TIMESTAMPTZ NOT NULL
//! );
//! ```
//!
//! Listings page by keyset on the UUIDv7 primary key, so id order is creation
//! order. Multi-statement writes go through [`with_transaction`].

use futures::{FutureExt, StreamExt};
use futures::stream::BoxStream;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, QueryBuilder, Row};
use uuid::Uuid;

use mingle_accounts::{Account, AccountStatus};
use mingle_chat::{ChatMessage, Chatroom, LastMessage};
use mingle_core::{
    ChatroomId, CommentId, MessageId, NotificationId, Page, PageRequest, PostId, UserId,
};
use mingle_follows::{Follow, FollowStatus};
use mingle_notifications::{Notification, NotificationKind};
use mingle_posts::{Comment, MediaAttachment, MediaState, Post, Reaction, ReactionKind};

use super::{
    AccountStore, ChatStore, CleanupReport, FollowStore, MaintenanceStore, NotificationStore,
    PostStore,
};
use crate::txn::{PgTxnBackend, StoreError, map_sqlx_error, with_transaction};

/// All entity stores over one shared Postgres pool.
#[derive(Clone)]
pub struct PgSocialStore {
    pool: PgPool,
    txn: PgTxnBackend,
}

impl PgSocialStore {
    pub fn new(pool: PgPool) -> Self {
        let txn = PgTxnBackend::new(pool.clone());
        Self { pool, txn }
    }
}

fn account_status_str(status: AccountStatus) -> &'static str {
    match status {
        AccountStatus::Active => "active",
        AccountStatus::Deactivated => "deactivated",
        AccountStatus::Deleted => "deleted",
    }
}

fn parse_account_status(s: &str) -> Result<AccountStatus, StoreError> {
    match s {
        "active" => Ok(AccountStatus::Active),
        "deactivated" => Ok(AccountStatus::Deactivated),
        "deleted" => Ok(AccountStatus::Deleted),
        other => Err(StoreError::InvalidData(format!("unknown account status {other:?}"))),
    }
}

fn follow_status_str(status: FollowStatus) -> &'static str {
    match status {
        FollowStatus::Pending => "pending",
        FollowStatus::Accepted => "accepted",
    }
}

fn parse_follow_status(s: &str) -> Result<FollowStatus, StoreError> {
    match s {
        "pending" => Ok(FollowStatus::Pending),
        "accepted" => Ok(FollowStatus::Accepted),
        other => Err(StoreError::InvalidData(format!("unknown follow status {other:?}"))),
    }
}

fn reaction_kind_str(kind: ReactionKind) -> &'static str {
    match kind {
        ReactionKind::Like => "like",
        ReactionKind::Love => "love",
        ReactionKind::Laugh => "laugh",
        ReactionKind::Sad => "sad",
        ReactionKind::Angry => "angry",
    }
}

fn parse_reaction_kind(s: &str) -> Result<ReactionKind, StoreError> {
    match s {
        "like" => Ok(ReactionKind::Like),
        "love" => Ok(ReactionKind::Love),
        "laugh" => Ok(ReactionKind::Laugh),
        "sad" => Ok(ReactionKind::Sad),
        "angry" => Ok(ReactionKind::Angry),
        other => Err(StoreError::InvalidData(format!("unknown reaction kind {other:?}"))),
    }
}

fn notification_kind_str(kind: NotificationKind) -> &'static str {
    match kind {
        NotificationKind::NewPost => "new_post",
        NotificationKind::Comment => "comment",
        NotificationKind::Reaction => "reaction",
        NotificationKind::FollowRequest => "follow_request",
        NotificationKind::FollowAccepted => "follow_accepted",
        NotificationKind::Message => "message",
    }
}

fn parse_notification_kind(s: &str) -> Result<NotificationKind, StoreError> {
    match s {
        "new_post" => Ok(NotificationKind::NewPost),
        "comment" => Ok(NotificationKind::Comment),
        "reaction" => Ok(NotificationKind::Reaction),
        "follow_request" => Ok(NotificationKind::FollowRequest),
        "follow_accepted" => Ok(NotificationKind::FollowAccepted),
        "message" => Ok(NotificationKind::Message),
        other => Err(StoreError::InvalidData(format!(
            "unknown notification kind {other:?}"
        ))),
    }
}

fn decode_err(err: sqlx::Error) -> StoreError {
    map_sqlx_error("decode", err)
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    let status: String = row.try_get("status").map_err(decode_err)?;
    Ok(Account {
        id: UserId::from_uuid(row.try_get("id").map_err(decode_err)?),
        username: row.try_get("username").map_err(decode_err)?,
        display_name: row.try_get("display_name").map_err(decode_err)?,
        status: parse_account_status(&status)?,
        created_at: row.try_get("created_at").map_err(decode_err)?,
    })
}

fn post_from_row(row: &PgRow) -> Result<Post, StoreError> {
    let media: Json<Vec<MediaAttachment>> = row.try_get("media").map_err(decode_err)?;
    Ok(Post {
        id: PostId::from_uuid(row.try_get("id").map_err(decode_err)?),
        author: UserId::from_uuid(row.try_get("author_id").map_err(decode_err)?),
        body: row.try_get("body").map_err(decode_err)?,
        media: media.0,
        deleted: row.try_get("deleted").map_err(decode_err)?,
        created_at: row.try_get("created_at").map_err(decode_err)?,
    })
}

fn comment_from_row(row: &PgRow) -> Result<Comment, StoreError> {
    Ok(Comment {
        id: CommentId::from_uuid(row.try_get("id").map_err(decode_err)?),
        post: PostId::from_uuid(row.try_get("post_id").map_err(decode_err)?),
        author: UserId::from_uuid(row.try_get("author_id").map_err(decode_err)?),
        body: row.try_get("body").map_err(decode_err)?,
        created_at: row.try_get("created_at").map_err(decode_err)?,
    })
}

fn follow_from_row(row: &PgRow) -> Result<Follow, StoreError> {
    let status: String = row.try_get("status").map_err(decode_err)?;
    Ok(Follow {
        follower: UserId::from_uuid(row.try_get("follower_id").map_err(decode_err)?),
        followee: UserId::from_uuid(row.try_get("followee_id").map_err(decode_err)?),
        status: parse_follow_status(&status)?,
        created_at: row.try_get("created_at").map_err(decode_err)?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<Notification, StoreError> {
    let kind: String = row.try_get("kind").map_err(decode_err)?;
    let post: Option<Uuid> = row.try_get("post_id").map_err(decode_err)?;
    Ok(Notification {
        id: NotificationId::from_uuid(row.try_get("id").map_err(decode_err)?),
        sender: UserId::from_uuid(row.try_get("sender_id").map_err(decode_err)?),
        receiver: UserId::from_uuid(row.try_get("receiver_id").map_err(decode_err)?),
        kind: parse_notification_kind(&kind)?,
        post: post.map(PostId::from_uuid),
        read: row.try_get("is_read").map_err(decode_err)?,
        created_at: row.try_get("created_at").map_err(decode_err)?,
    })
}

fn chatroom_from_row(row: &PgRow) -> Result<Chatroom, StoreError> {
    let members: Vec<Uuid> = row.try_get("member_ids").map_err(decode_err)?;
    let last_message: Option<Json<LastMessage>> =
        row.try_get("last_message").map_err(decode_err)?;
    Ok(Chatroom {
        id: ChatroomId::from_uuid(row.try_get("id").map_err(decode_err)?),
        members: members.into_iter().map(UserId::from_uuid).collect(),
        last_message: last_message.map(|m| m.0),
        created_at: row.try_get("created_at").map_err(decode_err)?,
    })
}

fn message_from_row(row: &PgRow) -> Result<ChatMessage, StoreError> {
    Ok(ChatMessage {
        id: MessageId::from_uuid(row.try_get("id").map_err(decode_err)?),
        chatroom: ChatroomId::from_uuid(row.try_get("chatroom_id").map_err(decode_err)?),
        sender: UserId::from_uuid(row.try_get("sender_id").map_err(decode_err)?),
        body: row.try_get("body").map_err(decode_err)?,
        created_at: row.try_get("created_at").map_err(decode_err)?,
    })
}

#[async_trait::async_trait]
impl AccountStore for PgSocialStore {
    async fn insert(&self, account: Account) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO accounts (id, username, display_name, status, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(*account.id.as_uuid())
        .bind(&account.username)
        .bind(&account.display_name)
        .bind(account_status_str(account.status))
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_account", e))?;
        Ok(())
    }

    async fn get(&self, id: UserId) -> Result<Option<Account>, StoreError> {
        sqlx::query("SELECT * FROM accounts WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_account", e))?
            .map(|row| account_from_row(&row))
            .transpose()
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        sqlx::query("SELECT * FROM accounts WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_account_by_username", e))?
            .map(|row| account_from_row(&row))
            .transpose()
    }

    async fn mark_deleted(&self, id: UserId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE accounts SET status = 'deleted' WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("mark_account_deleted", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl PostStore for PgSocialStore {
    async fn insert(&self, post: Post) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO posts (id, author_id, body, media, deleted, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(*post.id.as_uuid())
        .bind(*post.author.as_uuid())
        .bind(&post.body)
        .bind(Json(&post.media))
        .bind(post.deleted)
        .bind(post.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_post", e))?;
        Ok(())
    }

    async fn get(&self, id: PostId) -> Result<Option<Post>, StoreError> {
        sqlx::query("SELECT * FROM posts WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_post", e))?
            .map(|row| post_from_row(&row))
            .transpose()
    }

    async fn mark_deleted(&self, id: PostId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE posts SET deleted = TRUE WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("mark_post_deleted", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn feed(&self, viewer: UserId, page: PageRequest) -> Result<Page<Post>, StoreError> {
        let size = page.size();
        let rows = sqlx::query(
            "SELECT p.* FROM posts p \
             JOIN follows f ON f.followee_id = p.author_id \
             WHERE f.follower_id = $1 AND f.status = 'accepted' AND NOT p.deleted \
               AND ($2::uuid IS NULL OR p.id < $2) \
             ORDER BY p.id DESC LIMIT $3",
        )
        .bind(*viewer.as_uuid())
        .bind(page.before)
        .bind(size as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("feed", e))?;

        let items = rows
            .iter()
            .map(post_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::from_items(items, size, |p| *p.id.as_uuid()))
    }

    async fn insert_comment(&self, comment: Comment) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO comments (id, post_id, author_id, body, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(*comment.id.as_uuid())
        .bind(*comment.post.as_uuid())
        .bind(*comment.author.as_uuid())
        .bind(&comment.body)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_comment", e))?;
        Ok(())
    }

    async fn comments(&self, post: PostId, page: PageRequest) -> Result<Page<Comment>, StoreError> {
        let size = page.size();
        let rows = sqlx::query(
            "SELECT * FROM comments WHERE post_id = $1 \
               AND ($2::uuid IS NULL OR id < $2) \
             ORDER BY id DESC LIMIT $3",
        )
        .bind(*post.as_uuid())
        .bind(page.before)
        .bind(size as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_comments", e))?;

        let items = rows
            .iter()
            .map(comment_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::from_items(items, size, |c| *c.id.as_uuid()))
    }

    async fn upsert_reaction(&self, reaction: Reaction) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO reactions (post_id, reactor_id, kind, created_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (post_id, reactor_id) DO UPDATE SET kind = EXCLUDED.kind",
        )
        .bind(*reaction.post.as_uuid())
        .bind(*reaction.reactor.as_uuid())
        .bind(reaction_kind_str(reaction.kind))
        .bind(reaction.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_reaction", e))?;
        Ok(())
    }

    async fn delete_reaction(&self, post: PostId, reactor: UserId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM reactions WHERE post_id = $1 AND reactor_id = $2")
            .bind(*post.as_uuid())
            .bind(*reactor.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_reaction", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn mark_media_processed(
        &self,
        post: PostId,
        key: &str,
        variant_key: &str,
    ) -> Result<(), StoreError> {
        // Read-modify-write of the media document; the row lock keeps two
        // concurrent media jobs for the same post from losing an update.
        with_transaction(&self.txn, |tx| {
            let key = key.to_owned();
            let variant_key = variant_key.to_owned();
            async move {
                let row = sqlx::query("SELECT media FROM posts WHERE id = $1 FOR UPDATE")
                    .bind(*post.as_uuid())
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(|e| map_sqlx_error("lock_post_media", e))?
                    .ok_or(StoreError::NotFound)?;

                let mut media: Json<Vec<MediaAttachment>> =
                    row.try_get("media").map_err(decode_err)?;
                let attachment = media
                    .0
                    .iter_mut()
                    .find(|m| m.key == key)
                    .ok_or(StoreError::NotFound)?;
                attachment.variant_key = Some(variant_key);
                attachment.state = MediaState::Processed;

                sqlx::query("UPDATE posts SET media = $2 WHERE id = $1")
                    .bind(*post.as_uuid())
                    .bind(Json(&media.0))
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| map_sqlx_error("update_post_media", e))?;
                Ok(())
            }
            .boxed()
        })
        .await
    }
}

#[async_trait::async_trait]
impl FollowStore for PgSocialStore {
    async fn request(&self, follow: Follow) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO follows (follower_id, followee_id, status, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(*follow.follower.as_uuid())
        .bind(*follow.followee.as_uuid())
        .bind(follow_status_str(follow.status))
        .bind(follow.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_follow", e))?;
        Ok(())
    }

    async fn accept(&self, follower: UserId, followee: UserId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE follows SET status = 'accepted' \
             WHERE follower_id = $1 AND followee_id = $2 AND status = 'pending'",
        )
        .bind(*follower.as_uuid())
        .bind(*followee.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("accept_follow", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn remove(&self, follower: UserId, followee: UserId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
            .bind(*follower.as_uuid())
            .bind(*followee.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("remove_follow", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn get(&self, follower: UserId, followee: UserId) -> Result<Option<Follow>, StoreError> {
        sqlx::query("SELECT * FROM follows WHERE follower_id = $1 AND followee_id = $2")
            .bind(*follower.as_uuid())
            .bind(*followee.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_follow", e))?
            .map(|row| follow_from_row(&row))
            .transpose()
    }

    async fn followers_of(&self, followee: UserId) -> Result<Vec<Follow>, StoreError> {
        let rows = sqlx::query("SELECT * FROM follows WHERE followee_id = $1")
            .bind(*followee.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("followers_of", e))?;
        rows.iter().map(follow_from_row).collect()
    }

    async fn following_of(&self, follower: UserId) -> Result<Vec<Follow>, StoreError> {
        let rows = sqlx::query("SELECT * FROM follows WHERE follower_id = $1")
            .bind(*follower.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("following_of", e))?;
        rows.iter().map(follow_from_row).collect()
    }

    fn accepted_followers(&self, followee: UserId) -> BoxStream<'_, Result<UserId, StoreError>> {
        // Server-side cursor: rows arrive as the worker consumes them, so a
        // million-follower fan-out never materializes the full list.
        sqlx::query(
            "SELECT f.follower_id FROM follows f \
             JOIN accounts a ON a.id = f.follower_id \
             WHERE f.followee_id = $1 AND f.status = 'accepted' AND a.status = 'active' \
             ORDER BY f.follower_id",
        )
        .bind(*followee.as_uuid())
        .fetch(&self.pool)
        .map(|row| {
            let row = row.map_err(|e| map_sqlx_error("accepted_followers", e))?;
            let id: Uuid = row.try_get("follower_id").map_err(decode_err)?;
            Ok(UserId::from_uuid(id))
        })
        .boxed()
    }
}

#[async_trait::async_trait]
impl NotificationStore for PgSocialStore {
    async fn insert(&self, notification: Notification) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO notifications (id, sender_id, receiver_id, kind, post_id, is_read, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(*notification.id.as_uuid())
        .bind(*notification.sender.as_uuid())
        .bind(*notification.receiver.as_uuid())
        .bind(notification_kind_str(notification.kind))
        .bind(notification.post.map(|p| *p.as_uuid()))
        .bind(notification.read)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_notification", e))?;
        Ok(())
    }

    async fn insert_many(&self, batch: &[Notification]) -> Result<u64, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let mut builder = QueryBuilder::new(
            "INSERT INTO notifications (id, sender_id, receiver_id, kind, post_id, is_read, created_at) ",
        );
        builder.push_values(batch, |mut b, n| {
            b.push_bind(*n.id.as_uuid())
                .push_bind(*n.sender.as_uuid())
                .push_bind(*n.receiver.as_uuid())
                .push_bind(notification_kind_str(n.kind))
                .push_bind(n.post.map(|p| *p.as_uuid()))
                .push_bind(n.read)
                .push_bind(n.created_at);
        });
        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_notifications", e))?;
        Ok(result.rows_affected())
    }

    async fn for_receiver(
        &self,
        receiver: UserId,
        page: PageRequest,
    ) -> Result<Page<Notification>, StoreError> {
        let size = page.size();
        let rows = sqlx::query(
            "SELECT * FROM notifications WHERE receiver_id = $1 \
               AND ($2::uuid IS NULL OR id < $2) \
             ORDER BY id DESC LIMIT $3",
        )
        .bind(*receiver.as_uuid())
        .bind(page.before)
        .bind(size as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_notifications", e))?;

        let items = rows
            .iter()
            .map(notification_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::from_items(items, size, |n| *n.id.as_uuid()))
    }

    async fn mark_all_read(&self, receiver: UserId) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE receiver_id = $1 AND NOT is_read",
        )
        .bind(*receiver.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_notifications_read", e))?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl ChatStore for PgSocialStore {
    async fn create_chatroom(&self, room: Chatroom) -> Result<(), StoreError> {
        let member_ids: Vec<Uuid> = room.members.iter().map(|m| *m.as_uuid()).collect();
        sqlx::query(
            "INSERT INTO chatrooms (id, member_ids, last_message, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(*room.id.as_uuid())
        .bind(member_ids)
        .bind(room.last_message.as_ref().map(Json))
        .bind(room.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_chatroom", e))?;
        Ok(())
    }

    async fn get_chatroom(&self, id: ChatroomId) -> Result<Option<Chatroom>, StoreError> {
        sqlx::query("SELECT * FROM chatrooms WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_chatroom", e))?
            .map(|row| chatroom_from_row(&row))
            .transpose()
    }

    async fn chatrooms_of(&self, member: UserId) -> Result<Vec<Chatroom>, StoreError> {
        let rows = sqlx::query("SELECT * FROM chatrooms WHERE $1 = ANY(member_ids) ORDER BY id DESC")
            .bind(*member.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("chatrooms_of", e))?;
        rows.iter().map(chatroom_from_row).collect()
    }

    async fn append_message(&self, message: ChatMessage) -> Result<(), StoreError> {
        with_transaction(&self.txn, |tx| {
            let message = message.clone();
            async move {
                let updated = sqlx::query("UPDATE chatrooms SET last_message = $2 WHERE id = $1")
                    .bind(*message.chatroom.as_uuid())
                    .bind(Json(LastMessage::of(&message)))
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| map_sqlx_error("update_last_message", e))?;
                if updated.rows_affected() == 0 {
                    return Err(StoreError::NotFound);
                }

                sqlx::query(
                    "INSERT INTO chat_messages (id, chatroom_id, sender_id, body, created_at) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(*message.id.as_uuid())
                .bind(*message.chatroom.as_uuid())
                .bind(*message.sender.as_uuid())
                .bind(&message.body)
                .bind(message.created_at)
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("insert_chat_message", e))?;
                Ok(())
            }
            .boxed()
        })
        .await
    }

    async fn messages(
        &self,
        room: ChatroomId,
        page: PageRequest,
    ) -> Result<Page<ChatMessage>, StoreError> {
        let size = page.size();
        let rows = sqlx::query(
            "SELECT * FROM chat_messages WHERE chatroom_id = $1 \
               AND ($2::uuid IS NULL OR id < $2) \
             ORDER BY id DESC LIMIT $3",
        )
        .bind(*room.as_uuid())
        .bind(page.before)
        .bind(size as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_chat_messages", e))?;

        let items = rows
            .iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::from_items(items, size, |m| *m.id.as_uuid()))
    }
}

#[async_trait::async_trait]
impl MaintenanceStore for PgSocialStore {
    async fn cleanup_post(&self, post: PostId) -> Result<CleanupReport, StoreError> {
        with_transaction(&self.txn, |tx| {
            async move {
                let comments = sqlx::query("DELETE FROM comments WHERE post_id = $1")
                    .bind(*post.as_uuid())
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| map_sqlx_error("cleanup_post_comments", e))?
                    .rows_affected();
                let reactions = sqlx::query("DELETE FROM reactions WHERE post_id = $1")
                    .bind(*post.as_uuid())
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| map_sqlx_error("cleanup_post_reactions", e))?
                    .rows_affected();
                let notifications = sqlx::query("DELETE FROM notifications WHERE post_id = $1")
                    .bind(*post.as_uuid())
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| map_sqlx_error("cleanup_post_notifications", e))?
                    .rows_affected();
                let posts = sqlx::query("DELETE FROM posts WHERE id = $1")
                    .bind(*post.as_uuid())
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| map_sqlx_error("cleanup_post_row", e))?
                    .rows_affected();

                Ok(CleanupReport {
                    posts,
                    comments,
                    reactions,
                    follows: 0,
                    notifications,
                })
            }
            .boxed()
        })
        .await
    }

    async fn cleanup_account(&self, account: UserId) -> Result<CleanupReport, StoreError> {
        with_transaction(&self.txn, |tx| {
            async move {
                let posts = sqlx::query(
                    "UPDATE posts SET deleted = TRUE WHERE author_id = $1 AND NOT deleted",
                )
                .bind(*account.as_uuid())
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("cleanup_account_posts", e))?
                .rows_affected();
                let follows = sqlx::query(
                    "DELETE FROM follows WHERE follower_id = $1 OR followee_id = $1",
                )
                .bind(*account.as_uuid())
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("cleanup_account_follows", e))?
                .rows_affected();
                let notifications =
                    sqlx::query("DELETE FROM notifications WHERE receiver_id = $1")
                        .bind(*account.as_uuid())
                        .execute(&mut **tx)
                        .await
                        .map_err(|e| map_sqlx_error("cleanup_account_notifications", e))?
                        .rows_affected();

                Ok(CleanupReport {
                    posts,
                    follows,
                    notifications,
                    ..CleanupReport::default()
                })
            }
            .boxed()
        })
        .await
    }
}

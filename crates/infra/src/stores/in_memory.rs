//! In-memory store used by tests and by local development without Postgres.
//!
//! Everything lives in one `RwLock`ed map bundle. Operations take the lock
//! for their whole duration, which makes each store call atomic; there is no
//! cross-call transaction and no retry, so this backend never reports a
//! transient conflict.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use futures::StreamExt;
use futures::stream::BoxStream;

use mingle_accounts::Account;
use mingle_chat::{ChatMessage, Chatroom};
use mingle_core::{ChatroomId, CommentId, MessageId, NotificationId, Page, PageRequest, PostId, UserId};
use mingle_follows::{Follow, FollowStatus};
use mingle_notifications::Notification;
use mingle_posts::{Comment, Post, Reaction};

use super::{
    AccountStore, ChatStore, CleanupReport, FollowStore, MaintenanceStore, NotificationStore,
    PostStore,
};
use crate::txn::StoreError;

#[derive(Default)]
struct Inner {
    accounts: HashMap<UserId, Account>,
    posts: BTreeMap<PostId, Post>,
    comments: BTreeMap<CommentId, Comment>,
    reactions: HashMap<(PostId, UserId), Reaction>,
    follows: HashMap<(UserId, UserId), Follow>,
    notifications: BTreeMap<NotificationId, Notification>,
    chatrooms: HashMap<ChatroomId, Chatroom>,
    messages: BTreeMap<MessageId, ChatMessage>,
}

#[derive(Default)]
pub struct InMemorySocialStore {
    inner: RwLock<Inner>,
}

impl InMemorySocialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Newest-first keyset page over items already sorted ascending by id.
fn page_desc<T: Clone>(
    sorted_asc: impl DoubleEndedIterator<Item = T>,
    page: PageRequest,
    id_of: impl Fn(&T) -> uuid::Uuid,
) -> Page<T> {
    let size = page.size();
    let items: Vec<T> = sorted_asc
        .rev()
        .filter(|item| page.before.is_none_or(|cursor| id_of(item) < cursor))
        .take(size)
        .collect();
    Page::from_items(items, size, id_of)
}

#[async_trait::async_trait]
impl AccountStore for InMemorySocialStore {
    async fn insert(&self, account: Account) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.accounts.contains_key(&account.id)
            || inner.accounts.values().any(|a| a.username == account.username)
        {
            return Err(StoreError::Conflict(format!(
                "account {} already exists",
                account.username
            )));
        }
        inner.accounts.insert(account.id, account);
        Ok(())
    }

    async fn get(&self, id: UserId) -> Result<Option<Account>, StoreError> {
        Ok(self.read().accounts.get(&id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .read()
            .accounts
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn mark_deleted(&self, id: UserId) -> Result<(), StoreError> {
        let mut inner = self.write();
        let account = inner.accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        account.mark_deleted();
        Ok(())
    }
}

#[async_trait::async_trait]
impl PostStore for InMemorySocialStore {
    async fn insert(&self, post: Post) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.posts.contains_key(&post.id) {
            return Err(StoreError::Conflict(format!("post {} already exists", post.id)));
        }
        inner.posts.insert(post.id, post);
        Ok(())
    }

    async fn get(&self, id: PostId) -> Result<Option<Post>, StoreError> {
        Ok(self.read().posts.get(&id).cloned())
    }

    async fn mark_deleted(&self, id: PostId) -> Result<(), StoreError> {
        let mut inner = self.write();
        let post = inner.posts.get_mut(&id).ok_or(StoreError::NotFound)?;
        post.deleted = true;
        Ok(())
    }

    async fn feed(&self, viewer: UserId, page: PageRequest) -> Result<Page<Post>, StoreError> {
        let inner = self.read();
        let followees: Vec<UserId> = inner
            .follows
            .values()
            .filter(|f| f.follower == viewer && f.is_accepted())
            .map(|f| f.followee)
            .collect();
        Ok(page_desc(
            inner
                .posts
                .values()
                .filter(|p| !p.deleted && followees.contains(&p.author))
                .cloned(),
            page,
            |p: &Post| *p.id.as_uuid(),
        ))
    }

    async fn insert_comment(&self, comment: Comment) -> Result<(), StoreError> {
        let mut inner = self.write();
        if !inner.posts.contains_key(&comment.post) {
            return Err(StoreError::NotFound);
        }
        inner.comments.insert(comment.id, comment);
        Ok(())
    }

    async fn comments(&self, post: PostId, page: PageRequest) -> Result<Page<Comment>, StoreError> {
        let inner = self.read();
        Ok(page_desc(
            inner.comments.values().filter(|c| c.post == post).cloned(),
            page,
            |c: &Comment| *c.id.as_uuid(),
        ))
    }

    async fn upsert_reaction(&self, reaction: Reaction) -> Result<(), StoreError> {
        let mut inner = self.write();
        if !inner.posts.contains_key(&reaction.post) {
            return Err(StoreError::NotFound);
        }
        inner
            .reactions
            .insert((reaction.post, reaction.reactor), reaction);
        Ok(())
    }

    async fn delete_reaction(&self, post: PostId, reactor: UserId) -> Result<(), StoreError> {
        self.write()
            .reactions
            .remove(&(post, reactor))
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn mark_media_processed(
        &self,
        post: PostId,
        key: &str,
        variant_key: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.write();
        let post = inner.posts.get_mut(&post).ok_or(StoreError::NotFound)?;
        post.mark_media_processed(key, variant_key)
            .map_err(|_| StoreError::NotFound)
    }
}

#[async_trait::async_trait]
impl FollowStore for InMemorySocialStore {
    async fn request(&self, follow: Follow) -> Result<(), StoreError> {
        let mut inner = self.write();
        let key = (follow.follower, follow.followee);
        if inner.follows.contains_key(&key) {
            return Err(StoreError::Conflict("follow edge already exists".into()));
        }
        inner.follows.insert(key, follow);
        Ok(())
    }

    async fn accept(&self, follower: UserId, followee: UserId) -> Result<(), StoreError> {
        let mut inner = self.write();
        match inner.follows.get_mut(&(follower, followee)) {
            Some(follow) if follow.status == FollowStatus::Pending => {
                follow.status = FollowStatus::Accepted;
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    async fn remove(&self, follower: UserId, followee: UserId) -> Result<(), StoreError> {
        self.write()
            .follows
            .remove(&(follower, followee))
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn get(&self, follower: UserId, followee: UserId) -> Result<Option<Follow>, StoreError> {
        Ok(self.read().follows.get(&(follower, followee)).cloned())
    }

    async fn followers_of(&self, followee: UserId) -> Result<Vec<Follow>, StoreError> {
        Ok(self
            .read()
            .follows
            .values()
            .filter(|f| f.followee == followee)
            .cloned()
            .collect())
    }

    async fn following_of(&self, follower: UserId) -> Result<Vec<Follow>, StoreError> {
        Ok(self
            .read()
            .follows
            .values()
            .filter(|f| f.follower == follower)
            .cloned()
            .collect())
    }

    fn accepted_followers(&self, followee: UserId) -> BoxStream<'_, Result<UserId, StoreError>> {
        let inner = self.read();
        let mut ids: Vec<UserId> = inner
            .follows
            .values()
            .filter(|f| f.followee == followee && f.is_accepted())
            .filter(|f| inner.accounts.get(&f.follower).is_some_and(Account::is_active))
            .map(|f| f.follower)
            .collect();
        ids.sort();
        futures::stream::iter(ids.into_iter().map(Ok)).boxed()
    }
}

#[async_trait::async_trait]
impl NotificationStore for InMemorySocialStore {
    async fn insert(&self, notification: Notification) -> Result<(), StoreError> {
        self.write().notifications.insert(notification.id, notification);
        Ok(())
    }

    async fn insert_many(&self, batch: &[Notification]) -> Result<u64, StoreError> {
        let mut inner = self.write();
        for record in batch {
            inner.notifications.insert(record.id, record.clone());
        }
        Ok(batch.len() as u64)
    }

    async fn for_receiver(
        &self,
        receiver: UserId,
        page: PageRequest,
    ) -> Result<Page<Notification>, StoreError> {
        let inner = self.read();
        Ok(page_desc(
            inner
                .notifications
                .values()
                .filter(|n| n.receiver == receiver)
                .cloned(),
            page,
            |n: &Notification| *n.id.as_uuid(),
        ))
    }

    async fn mark_all_read(&self, receiver: UserId) -> Result<u64, StoreError> {
        let mut inner = self.write();
        let mut updated = 0;
        for notification in inner.notifications.values_mut() {
            if notification.receiver == receiver && !notification.read {
                notification.read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[async_trait::async_trait]
impl ChatStore for InMemorySocialStore {
    async fn create_chatroom(&self, room: Chatroom) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.chatrooms.contains_key(&room.id) {
            return Err(StoreError::Conflict(format!("chatroom {} already exists", room.id)));
        }
        inner.chatrooms.insert(room.id, room);
        Ok(())
    }

    async fn get_chatroom(&self, id: ChatroomId) -> Result<Option<Chatroom>, StoreError> {
        Ok(self.read().chatrooms.get(&id).cloned())
    }

    async fn chatrooms_of(&self, member: UserId) -> Result<Vec<Chatroom>, StoreError> {
        Ok(self
            .read()
            .chatrooms
            .values()
            .filter(|r| r.is_member(member))
            .cloned()
            .collect())
    }

    async fn append_message(&self, message: ChatMessage) -> Result<(), StoreError> {
        let mut inner = self.write();
        let room = inner
            .chatrooms
            .get_mut(&message.chatroom)
            .ok_or(StoreError::NotFound)?;
        room.record_last_message(&message);
        inner.messages.insert(message.id, message);
        Ok(())
    }

    async fn messages(
        &self,
        room: ChatroomId,
        page: PageRequest,
    ) -> Result<Page<ChatMessage>, StoreError> {
        let inner = self.read();
        Ok(page_desc(
            inner.messages.values().filter(|m| m.chatroom == room).cloned(),
            page,
            |m: &ChatMessage| *m.id.as_uuid(),
        ))
    }
}

#[async_trait::async_trait]
impl MaintenanceStore for InMemorySocialStore {
    async fn cleanup_post(&self, post: PostId) -> Result<CleanupReport, StoreError> {
        let mut inner = self.write();
        let mut report = CleanupReport::default();

        report.posts = u64::from(inner.posts.remove(&post).is_some());

        let comment_ids: Vec<CommentId> = inner
            .comments
            .values()
            .filter(|c| c.post == post)
            .map(|c| c.id)
            .collect();
        report.comments = comment_ids.len() as u64;
        for id in comment_ids {
            inner.comments.remove(&id);
        }

        let before = inner.reactions.len();
        inner.reactions.retain(|(p, _), _| *p != post);
        report.reactions = (before - inner.reactions.len()) as u64;

        let before = inner.notifications.len();
        inner.notifications.retain(|_, n| n.post != Some(post));
        report.notifications = (before - inner.notifications.len()) as u64;

        Ok(report)
    }

    async fn cleanup_account(&self, account: UserId) -> Result<CleanupReport, StoreError> {
        let mut inner = self.write();
        let mut report = CleanupReport::default();

        let mut posts = 0;
        for post in inner.posts.values_mut() {
            if post.author == account && !post.deleted {
                post.deleted = true;
                posts += 1;
            }
        }
        report.posts = posts;

        let before = inner.follows.len();
        inner
            .follows
            .retain(|(follower, followee), _| *follower != account && *followee != account);
        report.follows = (before - inner.follows.len()) as u64;

        let before = inner.notifications.len();
        inner.notifications.retain(|_, n| n.receiver != account);
        report.notifications = (before - inner.notifications.len()) as u64;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn active_account(store: &InMemorySocialStore, username: &str) -> Account {
        let account = Account::register(username, username).unwrap();
        AccountStore::insert(store, account.clone()).await.unwrap();
        account
    }

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let store = InMemorySocialStore::new();
        active_account(&store, "alice").await;
        let dup = Account::register("alice", "Other Alice").unwrap();
        assert!(matches!(
            AccountStore::insert(&store, dup).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn feed_shows_accepted_followees_newest_first() {
        let store = InMemorySocialStore::new();
        let viewer = active_account(&store, "viewer").await;
        let followed = active_account(&store, "followed").await;
        let stranger = active_account(&store, "stranger").await;

        store
            .request(Follow::request(viewer.id, followed.id).unwrap())
            .await
            .unwrap();
        store.accept(viewer.id, followed.id).await.unwrap();

        let first = Post::create(followed.id, "first", vec![]).unwrap();
        let second = Post::create(followed.id, "second", vec![]).unwrap();
        let unrelated = Post::create(stranger.id, "hidden", vec![]).unwrap();
        PostStore::insert(&store, first.clone()).await.unwrap();
        PostStore::insert(&store, second.clone()).await.unwrap();
        PostStore::insert(&store, unrelated).await.unwrap();

        let page = store.feed(viewer.id, PageRequest::default()).await.unwrap();
        let bodies: Vec<&str> = page.items.iter().map(|p| p.body.as_str()).collect();
        assert_eq!(bodies, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn feed_pages_by_cursor() {
        let store = InMemorySocialStore::new();
        let viewer = active_account(&store, "viewer").await;
        let followed = active_account(&store, "followed").await;
        store
            .request(Follow::request(viewer.id, followed.id).unwrap())
            .await
            .unwrap();
        store.accept(viewer.id, followed.id).await.unwrap();

        for i in 0..5 {
            let post = Post::create(followed.id, format!("post {i}"), vec![]).unwrap();
            PostStore::insert(&store, post).await.unwrap();
        }

        let first = store.feed(viewer.id, PageRequest::first(2)).await.unwrap();
        assert_eq!(first.items.len(), 2);
        let cursor = first.next_cursor.unwrap();

        let second = store
            .feed(
                viewer.id,
                PageRequest {
                    before: Some(cursor),
                    limit: Some(2),
                },
            )
            .await
            .unwrap();
        assert_eq!(second.items.len(), 2);
        assert!(second.items.iter().all(|p| *p.id.as_uuid() < cursor));
    }

    #[tokio::test]
    async fn accept_requires_a_pending_edge() {
        let store = InMemorySocialStore::new();
        let a = active_account(&store, "aaa").await;
        let b = active_account(&store, "bbb").await;

        assert!(matches!(
            store.accept(a.id, b.id).await,
            Err(StoreError::NotFound)
        ));

        store
            .request(Follow::request(a.id, b.id).unwrap())
            .await
            .unwrap();
        store.accept(a.id, b.id).await.unwrap();
        // Accepting again finds no pending edge.
        assert!(matches!(
            store.accept(a.id, b.id).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn accepted_followers_skips_pending_and_inactive() {
        let store = InMemorySocialStore::new();
        let author = active_account(&store, "author").await;
        let accepted = active_account(&store, "accepted").await;
        let pending = active_account(&store, "pending").await;
        let deleted = active_account(&store, "deleted").await;

        for follower in [accepted.id, pending.id, deleted.id] {
            store
                .request(Follow::request(follower, author.id).unwrap())
                .await
                .unwrap();
        }
        store.accept(accepted.id, author.id).await.unwrap();
        store.accept(deleted.id, author.id).await.unwrap();
        AccountStore::mark_deleted(&store, deleted.id).await.unwrap();

        let followers: Vec<UserId> = store
            .accepted_followers(author.id)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(followers, vec![accepted.id]);
    }

    #[tokio::test]
    async fn append_message_updates_last_message_pointer() {
        let store = InMemorySocialStore::new();
        let a = active_account(&store, "aaa").await;
        let b = active_account(&store, "bbb").await;

        let room = Chatroom::create(a.id, vec![b.id]).unwrap();
        store.create_chatroom(room.clone()).await.unwrap();

        let message = ChatMessage::create(room.id, a.id, "hello").unwrap();
        store.append_message(message.clone()).await.unwrap();

        let room = store.get_chatroom(room.id).await.unwrap().unwrap();
        let last = room.last_message.unwrap();
        assert_eq!(last.message_id, message.id);
        assert_eq!(last.preview, "hello");
    }

    #[tokio::test]
    async fn cleanup_post_removes_dependents() {
        let store = InMemorySocialStore::new();
        let author = active_account(&store, "author").await;
        let commenter = active_account(&store, "commenter").await;

        let post = Post::create(author.id, "doomed", vec![]).unwrap();
        PostStore::insert(&store, post.clone()).await.unwrap();
        store
            .insert_comment(Comment::create(post.id, commenter.id, "rip").unwrap())
            .await
            .unwrap();
        store
            .upsert_reaction(Reaction::new(post.id, commenter.id, mingle_posts::ReactionKind::Like))
            .await
            .unwrap();
        NotificationStore::insert(
            &store,
            Notification::new_post(author.id, commenter.id, post.id),
        )
        .await
        .unwrap();

        let report = store.cleanup_post(post.id).await.unwrap();
        assert_eq!(report.posts, 1);
        assert_eq!(report.comments, 1);
        assert_eq!(report.reactions, 1);
        assert_eq!(report.notifications, 1);
        assert!(PostStore::get(&store, post.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_account_removes_both_follow_directions() {
        let store = InMemorySocialStore::new();
        let doomed = active_account(&store, "doomed").await;
        let other = active_account(&store, "other").await;

        store
            .request(Follow::request(doomed.id, other.id).unwrap())
            .await
            .unwrap();
        store
            .request(Follow::request(other.id, doomed.id).unwrap())
            .await
            .unwrap();
        let post = Post::create(doomed.id, "mine", vec![]).unwrap();
        PostStore::insert(&store, post.clone()).await.unwrap();

        let report = store.cleanup_account(doomed.id).await.unwrap();
        assert_eq!(report.follows, 2);
        assert_eq!(report.posts, 1);
        assert!(store.followers_of(other.id).await.unwrap().is_empty());

        // Posts are soft-deleted, not dropped.
        let post = PostStore::get(&store, post.id).await.unwrap().unwrap();
        assert!(post.deleted);
    }

    #[tokio::test]
    async fn mark_all_read_counts_only_unread() {
        let store = InMemorySocialStore::new();
        let sender = active_account(&store, "sender").await;
        let receiver = active_account(&store, "receiver").await;

        for _ in 0..3 {
            NotificationStore::insert(
                &store,
                Notification::new_post(sender.id, receiver.id, PostId::new()),
            )
            .await
            .unwrap();
        }

        assert_eq!(store.mark_all_read(receiver.id).await.unwrap(), 3);
        assert_eq!(store.mark_all_read(receiver.id).await.unwrap(), 0);
    }
}

//! New-post notification fan-out.
//!
//! Walks the author's accepted-follower cursor, buffering records into
//! fixed-size batches and bulk-inserting each full batch, so memory stays
//! bounded by the batch size no matter how many followers the author has.

use futures::TryStreamExt;
use tracing::info;

use mingle_core::{PostId, UserId};
use mingle_notifications::{FANOUT_BATCH_SIZE, Notification, NotificationBatch};

use crate::stores::{FollowStore, NotificationStore};
use crate::txn::StoreError;

/// What one fan-out pass wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutSummary {
    /// Followers notified.
    pub receivers: u64,
    /// Bulk inserts issued.
    pub batches: u64,
}

/// Fan a new-post notification out to every accepted, active follower of
/// `author`, in batches of [`FANOUT_BATCH_SIZE`].
pub async fn fan_out_post_notifications(
    follows: &dyn FollowStore,
    notifications: &dyn NotificationStore,
    author: UserId,
    post: PostId,
) -> Result<FanOutSummary, StoreError> {
    let summary =
        fan_out_with_capacity(follows, notifications, author, post, FANOUT_BATCH_SIZE).await?;
    info!(
        author = %author,
        post = %post,
        receivers = summary.receivers,
        batches = summary.batches,
        "post fan-out complete"
    );
    Ok(summary)
}

async fn fan_out_with_capacity(
    follows: &dyn FollowStore,
    notifications: &dyn NotificationStore,
    author: UserId,
    post: PostId,
    capacity: usize,
) -> Result<FanOutSummary, StoreError> {
    let mut cursor = follows.accepted_followers(author);
    let mut batch = NotificationBatch::new(capacity);
    let mut summary = FanOutSummary::default();

    while let Some(follower) = cursor.try_next().await? {
        if let Some(full) = batch.push(Notification::new_post(author, follower, post)) {
            summary.receivers += notifications.insert_many(&full).await?;
            summary.batches += 1;
        }
    }

    let remainder = batch.take_remainder();
    if !remainder.is_empty() {
        summary.receivers += notifications.insert_many(&remainder).await?;
        summary.batches += 1;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use futures::StreamExt;
    use futures::stream::BoxStream;

    use mingle_core::{Page, PageRequest};
    use mingle_follows::Follow;

    /// Follow store that only serves a fixed follower cursor.
    struct StaticFollowers {
        followers: Vec<UserId>,
    }

    #[async_trait::async_trait]
    impl FollowStore for StaticFollowers {
        async fn request(&self, _follow: Follow) -> Result<(), StoreError> {
            unimplemented!("not exercised by fan-out")
        }

        async fn accept(&self, _follower: UserId, _followee: UserId) -> Result<(), StoreError> {
            unimplemented!("not exercised by fan-out")
        }

        async fn remove(&self, _follower: UserId, _followee: UserId) -> Result<(), StoreError> {
            unimplemented!("not exercised by fan-out")
        }

        async fn get(
            &self,
            _follower: UserId,
            _followee: UserId,
        ) -> Result<Option<Follow>, StoreError> {
            unimplemented!("not exercised by fan-out")
        }

        async fn followers_of(&self, _followee: UserId) -> Result<Vec<Follow>, StoreError> {
            unimplemented!("not exercised by fan-out")
        }

        async fn following_of(&self, _follower: UserId) -> Result<Vec<Follow>, StoreError> {
            unimplemented!("not exercised by fan-out")
        }

        fn accepted_followers(
            &self,
            _followee: UserId,
        ) -> BoxStream<'_, Result<UserId, StoreError>> {
            futures::stream::iter(self.followers.clone().into_iter().map(Ok)).boxed()
        }
    }

    /// Notification store that records the size of every bulk insert.
    #[derive(Default)]
    struct RecordingNotifications {
        batch_sizes: Mutex<Vec<usize>>,
        records: Mutex<Vec<Notification>>,
    }

    #[async_trait::async_trait]
    impl NotificationStore for RecordingNotifications {
        async fn insert(&self, notification: Notification) -> Result<(), StoreError> {
            self.records.lock().unwrap().push(notification);
            Ok(())
        }

        async fn insert_many(&self, batch: &[Notification]) -> Result<u64, StoreError> {
            self.batch_sizes.lock().unwrap().push(batch.len());
            self.records.lock().unwrap().extend_from_slice(batch);
            Ok(batch.len() as u64)
        }

        async fn for_receiver(
            &self,
            _receiver: UserId,
            _page: PageRequest,
        ) -> Result<Page<Notification>, StoreError> {
            unimplemented!("not exercised by fan-out")
        }

        async fn mark_all_read(&self, _receiver: UserId) -> Result<u64, StoreError> {
            unimplemented!("not exercised by fan-out")
        }
    }

    fn followers(count: usize) -> StaticFollowers {
        StaticFollowers {
            followers: (0..count).map(|_| UserId::new()).collect(),
        }
    }

    #[tokio::test]
    async fn large_fanout_splits_into_full_batches_plus_remainder() {
        let follows = followers(2500);
        let notifications = RecordingNotifications::default();

        let summary = fan_out_post_notifications(
            &follows,
            &notifications,
            UserId::new(),
            PostId::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.receivers, 2500);
        assert_eq!(summary.batches, 3);
        assert_eq!(*notifications.batch_sizes.lock().unwrap(), vec![1000, 1000, 500]);
    }

    #[tokio::test]
    async fn exact_multiple_has_no_remainder_insert() {
        let follows = followers(2000);
        let notifications = RecordingNotifications::default();

        let summary = fan_out_post_notifications(
            &follows,
            &notifications,
            UserId::new(),
            PostId::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.batches, 2);
        assert_eq!(*notifications.batch_sizes.lock().unwrap(), vec![1000, 1000]);
    }

    #[tokio::test]
    async fn zero_followers_inserts_nothing() {
        let follows = followers(0);
        let notifications = RecordingNotifications::default();

        let summary = fan_out_post_notifications(
            &follows,
            &notifications,
            UserId::new(),
            PostId::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary, FanOutSummary::default());
        assert!(notifications.batch_sizes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_record_targets_a_distinct_follower() {
        let follows = followers(42);
        let notifications = RecordingNotifications::default();
        let author = UserId::new();
        let post = PostId::new();

        fan_out_post_notifications(&follows, &notifications, author, post)
            .await
            .unwrap();

        let records = notifications.records.lock().unwrap();
        assert_eq!(records.len(), 42);
        let mut receivers: Vec<UserId> = records.iter().map(|n| n.receiver).collect();
        receivers.sort();
        receivers.dedup();
        assert_eq!(receivers.len(), 42);
        assert!(records.iter().all(|n| n.sender == author && n.post == Some(post)));
    }

    #[tokio::test]
    async fn small_capacity_batches() {
        let follows = followers(7);
        let notifications = RecordingNotifications::default();

        let summary = fan_out_with_capacity(
            &follows,
            &notifications,
            UserId::new(),
            PostId::new(),
            3,
        )
        .await
        .unwrap();

        assert_eq!(summary.receivers, 7);
        assert_eq!(*notifications.batch_sizes.lock().unwrap(), vec![3, 3, 1]);
    }
}

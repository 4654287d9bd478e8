//! Media processing job handler.
//!
//! Reads the staged original, publishes the display variant under a derived
//! key, then flips the attachment's state on the post. A failed publish
//! removes the partially written variant so storage never holds an object
//! the post doesn't reference.

use tracing::info;

use crate::jobs::{JobResult, ProcessMediaPayload};
use crate::media::MediaStorage;
use crate::stores::PostStore;

/// Storage key of the display variant derived from `key`.
pub fn variant_key(key: &str) -> String {
    format!("{key}.display")
}

/// Derive the display variant bytes from the staged original.
///
/// Currently a straight copy under the variant key; the call site only
/// depends on the key contract, so a real transcoder can replace this
/// without touching the handler.
fn derive_display_variant(original: &[u8]) -> Vec<u8> {
    original.to_vec()
}

pub async fn run_process_media(
    posts: &dyn PostStore,
    storage: &dyn MediaStorage,
    payload: ProcessMediaPayload,
) -> JobResult {
    let original = match storage.fetch_staged(&payload.media_key).await {
        Ok(bytes) => bytes,
        Err(e) => return JobResult::Failure(format!("fetch staged media: {e}")),
    };

    let variant = derive_display_variant(&original);
    let variant_key = variant_key(&payload.media_key);

    if let Err(e) = storage.publish(&variant_key, variant).await {
        let _ = storage.remove(&variant_key).await;
        return JobResult::Failure(format!("publish media variant: {e}"));
    }

    if let Err(e) = posts
        .mark_media_processed(payload.post_id, &payload.media_key, &variant_key)
        .await
    {
        // The variant is orphaned if we stop here; drop it so a retry starts
        // from a clean slate.
        let _ = storage.remove(&variant_key).await;
        return JobResult::Failure(format!("mark media processed: {e}"));
    }

    info!(post = %payload.post_id, key = %payload.media_key, "media attachment processed");
    JobResult::Success
}

#[cfg(test)]
mod tests {
    use super::*;
    use mingle_core::{PostId, UserId};
    use mingle_posts::{MediaState, Post};

    use crate::media::InMemoryMediaStorage;
    use crate::stores::{InMemorySocialStore, PostStore};

    #[tokio::test]
    async fn processes_staged_media_end_to_end() {
        let store = InMemorySocialStore::new();
        let storage = InMemoryMediaStorage::new();

        let post = Post::create(UserId::new(), "with media", vec!["m/1".into()]).unwrap();
        PostStore::insert(&store, post.clone()).await.unwrap();
        storage.stage("m/1", vec![1, 2, 3]);

        let result = run_process_media(
            &store,
            &storage,
            ProcessMediaPayload {
                post_id: post.id,
                media_key: "m/1".into(),
            },
        )
        .await;
        assert!(matches!(result, JobResult::Success));

        assert!(storage.contains("m/1.display"));
        let post = PostStore::get(&store, post.id).await.unwrap().unwrap();
        assert_eq!(post.media[0].state, MediaState::Processed);
        assert_eq!(post.media[0].variant_key.as_deref(), Some("m/1.display"));
    }

    #[tokio::test]
    async fn missing_staged_object_fails_the_job() {
        let store = InMemorySocialStore::new();
        let storage = InMemoryMediaStorage::new();

        let result = run_process_media(
            &store,
            &storage,
            ProcessMediaPayload {
                post_id: PostId::new(),
                media_key: "m/ghost".into(),
            },
        )
        .await;
        assert!(matches!(result, JobResult::Failure(_)));
    }

    #[tokio::test]
    async fn missing_post_discards_the_published_variant() {
        let store = InMemorySocialStore::new();
        let storage = InMemoryMediaStorage::new();
        storage.stage("m/1", vec![1]);

        let result = run_process_media(
            &store,
            &storage,
            ProcessMediaPayload {
                post_id: PostId::new(),
                media_key: "m/1".into(),
            },
        )
        .await;

        assert!(matches!(result, JobResult::Failure(_)));
        assert!(!storage.contains("m/1.display"));
    }
}

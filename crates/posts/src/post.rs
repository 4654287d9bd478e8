use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mingle_core::{DomainError, DomainResult, PostId, UserId};

/// Maximum post body length in characters.
pub const MAX_BODY_LEN: usize = 2000;

/// Maximum number of media attachments per post.
pub const MAX_MEDIA_PER_POST: usize = 4;

/// Processing state of one media attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaState {
    /// Uploaded original awaiting the processing job.
    Pending,
    /// Variant derived; `variant_key` points at the processed object.
    Processed,
}

/// A media object attached to a post, referenced by storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    /// Storage key of the uploaded original.
    pub key: String,
    /// Storage key of the processed variant, set by the media job.
    pub variant_key: Option<String>,
    pub state: MediaState,
}

impl MediaAttachment {
    pub fn pending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            variant_key: None,
            state: MediaState::Pending,
        }
    }
}

/// A post on the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author: UserId,
    pub body: String,
    pub media: Vec<MediaAttachment>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Create a post, validating body and media count.
    pub fn create(author: UserId, body: impl Into<String>, media_keys: Vec<String>) -> DomainResult<Self> {
        let body = body.into();
        if body.trim().is_empty() && media_keys.is_empty() {
            return Err(DomainError::validation("post needs a body or media"));
        }
        if body.chars().count() > MAX_BODY_LEN {
            return Err(DomainError::validation(format!(
                "post body exceeds {MAX_BODY_LEN} characters"
            )));
        }
        if media_keys.len() > MAX_MEDIA_PER_POST {
            return Err(DomainError::validation(format!(
                "at most {MAX_MEDIA_PER_POST} media attachments per post"
            )));
        }

        Ok(Self {
            id: PostId::new(),
            author,
            body,
            media: media_keys.into_iter().map(MediaAttachment::pending).collect(),
            deleted: false,
            created_at: Utc::now(),
        })
    }

    /// Whether any attachment still awaits the media processing job.
    pub fn has_pending_media(&self) -> bool {
        self.media.iter().any(|m| m.state == MediaState::Pending)
    }

    /// Mark the attachment with `key` processed, recording its variant key.
    pub fn mark_media_processed(&mut self, key: &str, variant_key: impl Into<String>) -> DomainResult<()> {
        let attachment = self
            .media
            .iter_mut()
            .find(|m| m.key == key)
            .ok_or(DomainError::NotFound)?;
        attachment.variant_key = Some(variant_key.into());
        attachment.state = MediaState::Processed;
        Ok(())
    }
}

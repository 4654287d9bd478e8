use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mingle_core::{CommentId, DomainError, DomainResult, PostId, UserId};

/// Maximum comment length in characters.
pub const MAX_COMMENT_LEN: usize = 500;

/// A comment on a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post: PostId,
    pub author: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn create(post: PostId, author: UserId, body: impl Into<String>) -> DomainResult<Self> {
        let body = body.into();
        if body.trim().is_empty() {
            return Err(DomainError::validation("comment body must not be empty"));
        }
        if body.chars().count() > MAX_COMMENT_LEN {
            return Err(DomainError::validation(format!(
                "comment exceeds {MAX_COMMENT_LEN} characters"
            )));
        }
        Ok(Self {
            id: CommentId::new(),
            post,
            author,
            body,
            created_at: Utc::now(),
        })
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mingle_core::{PostId, UserId};

/// Reaction kinds a post accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Love,
    Laugh,
    Sad,
    Angry,
}

/// A reaction to a post.
///
/// At most one reaction per (post, reactor); reacting again replaces the kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub post: PostId,
    pub reactor: UserId,
    pub kind: ReactionKind,
    pub created_at: DateTime<Utc>,
}

impl Reaction {
    pub fn new(post: PostId, reactor: UserId, kind: ReactionKind) -> Self {
        Self {
            post,
            reactor,
            kind,
            created_at: Utc::now(),
        }
    }
}

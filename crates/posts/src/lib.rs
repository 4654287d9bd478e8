//! Posts domain module: posts, comments, and reactions.
//!
//! Pure domain logic; persistence lives in `mingle-infra`.

pub mod comment;
pub mod post;
pub mod reaction;

pub use comment::Comment;
pub use post::{MediaAttachment, MediaState, Post, MAX_BODY_LEN, MAX_MEDIA_PER_POST};
pub use reaction::{Reaction, ReactionKind};

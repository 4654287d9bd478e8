//! `mingle-core` — shared kernel: typed identifiers, the domain error model,
//! and pagination primitives.
//!
//! This crate is pure (no IO, no HTTP, no storage) and is depended on by every
//! other crate in the workspace.

pub mod error;
pub mod id;
pub mod pagination;

pub use error::{DomainError, DomainResult};
pub use id::{ChatroomId, CommentId, MessageId, NotificationId, PostId, UserId};
pub use pagination::{Page, PageRequest};

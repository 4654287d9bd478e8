//! Follows domain module: the directed follow relationship and its
//! pending → accepted lifecycle.

pub mod follow;

pub use follow::{Follow, FollowStatus};

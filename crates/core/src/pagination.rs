//! Keyset pagination over UUIDv7 identifiers.
//!
//! Listings are ordered newest-first by id. Because ids are time-ordered, the
//! id of the last returned item doubles as the cursor for the next page.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Page size applied when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Upper bound on a caller-requested page size.
pub const MAX_PAGE_SIZE: usize = 100;

/// Caller-supplied paging parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    /// Return items with id strictly before this cursor.
    pub before: Option<Uuid>,
    pub limit: Option<usize>,
}

impl PageRequest {
    pub fn first(limit: usize) -> Self {
        Self {
            before: None,
            limit: Some(limit),
        }
    }

    /// Effective page size: requested, clamped to `1..=MAX_PAGE_SIZE`.
    pub fn size(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

/// One page of results plus the cursor for the next one.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the next page; `None` when this page was not full.
    pub next_cursor: Option<Uuid>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }

    /// Build a page from at most `requested` items, deriving the cursor from
    /// the last item when the page came back full.
    pub fn from_items(items: Vec<T>, requested: usize, cursor_of: impl Fn(&T) -> Uuid) -> Self {
        let next_cursor = if items.len() == requested {
            items.last().map(&cursor_of)
        } else {
            None
        };
        Self { items, next_cursor }
    }
}

//! Fixed-capacity accumulation buffer for bulk notification inserts.

use crate::notification::Notification;

/// How many notification records accumulate before one bulk insert.
pub const FANOUT_BATCH_SIZE: usize = 1000;

/// Transient in-memory buffer used while walking a follower cursor.
///
/// Never persisted: the worker drains it into a bulk insert whenever it fills,
/// and flushes the remainder when the cursor is exhausted.
#[derive(Debug)]
pub struct NotificationBatch {
    capacity: usize,
    buf: Vec<Notification>,
}

impl NotificationBatch {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "batch capacity must be positive");
        Self {
            capacity,
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Add one record. Returns the full batch to flush when this push reached
    /// capacity; the buffer is left empty in that case.
    #[must_use]
    pub fn push(&mut self, record: Notification) -> Option<Vec<Notification>> {
        self.buf.push(record);
        if self.buf.len() == self.capacity {
            Some(std::mem::replace(
                &mut self.buf,
                Vec::with_capacity(self.capacity),
            ))
        } else {
            None
        }
    }

    /// Drain whatever is left after the cursor ends. Empty when the stream
    /// length was an exact multiple of the capacity (or zero).
    pub fn take_remainder(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.buf)
    }
}

impl Default for NotificationBatch {
    fn default() -> Self {
        Self::new(FANOUT_BATCH_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mingle_core::{PostId, UserId};
    use proptest::prelude::*;

    fn record() -> Notification {
        Notification::new_post(UserId::new(), UserId::new(), PostId::new())
    }

    /// Push `count` records and report (full drains, remainder length).
    fn run(capacity: usize, count: usize) -> (Vec<usize>, usize) {
        let mut batch = NotificationBatch::new(capacity);
        let mut drains = Vec::new();
        for _ in 0..count {
            if let Some(full) = batch.push(record()) {
                drains.push(full.len());
            }
        }
        let remainder = batch.take_remainder().len();
        (drains, remainder)
    }

    #[test]
    fn fills_and_drains_at_capacity() {
        let (drains, remainder) = run(3, 7);
        assert_eq!(drains, vec![3, 3]);
        assert_eq!(remainder, 1);
    }

    #[test]
    fn exact_multiple_leaves_no_remainder() {
        let (drains, remainder) = run(3, 6);
        assert_eq!(drains, vec![3, 3]);
        assert_eq!(remainder, 0);
    }

    #[test]
    fn empty_stream_flushes_nothing() {
        let (drains, remainder) = run(1000, 0);
        assert!(drains.is_empty());
        assert_eq!(remainder, 0);
    }

    proptest! {
        /// M records through a capacity-B buffer always produce
        /// floor(M/B) full drains plus a remainder of M mod B.
        #[test]
        fn drain_arithmetic(capacity in 1usize..50, count in 0usize..500) {
            let (drains, remainder) = run(capacity, count);
            prop_assert_eq!(drains.len(), count / capacity);
            prop_assert!(drains.iter().all(|&d| d == capacity));
            prop_assert_eq!(remainder, count % capacity);
        }
    }
}

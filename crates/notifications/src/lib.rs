//! Notifications domain module: the notification record and the fixed-size
//! batch buffer used by the fan-out worker.

pub mod batch;
pub mod notification;

pub use batch::{NotificationBatch, FANOUT_BATCH_SIZE};
pub use notification::{Notification, NotificationKind};

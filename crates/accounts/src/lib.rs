//! Accounts domain module.
//!
//! Business rules for account identity and lifecycle, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod account;

pub use account::{Account, AccountStatus};

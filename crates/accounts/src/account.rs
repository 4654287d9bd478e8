use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mingle_core::{DomainError, DomainResult, UserId};

/// Account lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Account is active: may authenticate, post, follow, and chat.
    #[default]
    Active,
    /// Temporarily disabled by the owner; invisible but recoverable.
    Deactivated,
    /// Soft-deleted; cleanup jobs remove the account's artifacts.
    Deleted,
}

/// An account on the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub username: String,
    pub display_name: String,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Register a new active account, validating the username.
    pub fn register(username: impl Into<String>, display_name: impl Into<String>) -> DomainResult<Self> {
        let username = username.into();
        validate_username(&username)?;

        let display_name = display_name.into();
        if display_name.trim().is_empty() || display_name.len() > 80 {
            return Err(DomainError::validation(
                "display name must be 1-80 characters",
            ));
        }

        Ok(Self {
            id: UserId::new(),
            username,
            display_name,
            status: AccountStatus::Active,
            created_at: Utc::now(),
        })
    }

    /// Invariant helper: whether this account may act on the network.
    ///
    /// Deactivated and deleted accounts cannot authenticate, post, follow,
    /// or connect to chat.
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Whether the account still exists from other users' point of view.
    pub fn is_visible(&self) -> bool {
        self.status != AccountStatus::Deleted
    }

    /// Soft-delete the account.
    pub fn mark_deleted(&mut self) {
        self.status = AccountStatus::Deleted;
    }
}

/// Usernames: 3-30 characters, lowercase alphanumerics plus `_` and `.`,
/// must start with a letter.
pub fn validate_username(username: &str) -> DomainResult<()> {
    if username.len() < 3 || username.len() > 30 {
        return Err(DomainError::validation("username must be 3-30 characters"));
    }
    let mut chars = username.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => {
            return Err(DomainError::validation(
                "username must start with a lowercase letter",
            ));
        }
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '.')
    {
        return Err(DomainError::validation(
            "username may contain lowercase letters, digits, '_' and '.'",
        ));
    }
    Ok(())
}

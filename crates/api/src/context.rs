use mingle_core::UserId;

/// Authenticated identity for a request, derived from the bearer token.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    account_id: UserId,
}

impl PrincipalContext {
    pub fn new(account_id: UserId) -> Self {
        Self { account_id }
    }

    pub fn account_id(&self) -> UserId {
        self.account_id
    }
}

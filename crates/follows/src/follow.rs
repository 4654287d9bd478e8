use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mingle_core::{DomainError, DomainResult, UserId};

/// Follow relationship status.
///
/// Follow requests start pending and become accepted when the followee
/// approves them. Only accepted follows feed the timeline and the
/// notification fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowStatus {
    Pending,
    Accepted,
}

/// A directed follow edge: `follower` follows `followee`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follow {
    pub follower: UserId,
    pub followee: UserId,
    pub status: FollowStatus,
    pub created_at: DateTime<Utc>,
}

impl Follow {
    /// Create a pending follow request.
    pub fn request(follower: UserId, followee: UserId) -> DomainResult<Self> {
        if follower == followee {
            return Err(DomainError::invariant("cannot follow yourself"));
        }
        Ok(Self {
            follower,
            followee,
            status: FollowStatus::Pending,
            created_at: Utc::now(),
        })
    }

    /// Accept a pending request. Accepting twice is a conflict.
    pub fn accept(&mut self) -> DomainResult<()> {
        match self.status {
            FollowStatus::Pending => {
                self.status = FollowStatus::Accepted;
                Ok(())
            }
            FollowStatus::Accepted => Err(DomainError::conflict("follow already accepted")),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == FollowStatus::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_and_accept() {
        let mut follow = Follow::request(UserId::new(), UserId::new()).unwrap();
        assert_eq!(follow.status, FollowStatus::Pending);
        assert!(!follow.is_accepted());

        follow.accept().unwrap();
        assert!(follow.is_accepted());

        assert!(matches!(follow.accept(), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn self_follow_is_rejected() {
        let me = UserId::new();
        assert!(matches!(
            Follow::request(me, me),
            Err(DomainError::InvariantViolation(_))
        ));
    }
}

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::user::UserSummary;
use crate::error::{AppError, Result};

/// The unordered pair of users a direct conversation belongs to, kept in
/// canonical order (`low < high`) so that it can serve as a lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticipantPair {
    low: Uuid,
    high: Uuid,
}

impl ParticipantPair {
    /// Builds the canonical pair for two distinct users.
    ///
    /// # Errors
    /// Returns `AppError::InvalidArgument` if both ids are the same user.
    pub fn new(a: Uuid, b: Uuid) -> Result<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Ok(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Ok(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => {
                Err(AppError::InvalidArgument("a conversation needs two distinct participants".into()))
            }
        }
    }

    #[must_use]
    pub const fn low(&self) -> Uuid {
        self.low
    }

    #[must_use]
    pub const fn high(&self) -> Uuid {
        self.high
    }

    #[must_use]
    pub fn contains(&self, user_id: Uuid) -> bool {
        self.low == user_id || self.high == user_id
    }

    #[must_use]
    pub const fn as_array(&self) -> [Uuid; 2] {
        [self.low, self.high]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: Uuid,
    pub participants: ParticipantPair,
    pub created_at: OffsetDateTime,
}

/// A conversation with its participants resolved for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationView {
    pub id: Uuid,
    pub participants: Vec<UserSummary>,
    #[serde(serialize_with = "crate::domain::serialize_unix_millis")]
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let ab = ParticipantPair::new(a, b).expect("distinct users");
        let ba = ParticipantPair::new(b, a).expect("distinct users");

        assert_eq!(ab, ba);
        assert!(ab.low() < ab.high());
        assert!(ab.contains(a) && ab.contains(b));
        assert!(!ab.contains(Uuid::new_v4()));
    }

    #[test]
    fn test_pair_rejects_self_conversation() {
        let a = Uuid::new_v4();
        assert!(matches!(ParticipantPair::new(a, a), Err(AppError::InvalidArgument(_))));
    }
}

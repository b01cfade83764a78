use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::user::UserSummary;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendRequest {
    pub id: Uuid,
    pub sender: Uuid,
    pub recipient: Uuid,
    pub created_at: OffsetDateTime,
}

/// A pending request addressed to the caller, with the sender resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingFriendRequest {
    pub id: Uuid,
    pub sender: UserSummary,
    #[serde(serialize_with = "crate::domain::serialize_unix_millis")]
    pub created_at: OffsetDateTime,
}

use crate::domain::friend_request::FriendRequest;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct FriendRequestRecord {
    pub(crate) id: Uuid,
    pub(crate) sender_id: Uuid,
    pub(crate) recipient_id: Uuid,
    pub(crate) created_at: OffsetDateTime,
}

impl From<FriendRequestRecord> for FriendRequest {
    fn from(record: FriendRequestRecord) -> Self {
        Self { id: record.id, sender: record.sender_id, recipient: record.recipient_id, created_at: record.created_at }
    }
}

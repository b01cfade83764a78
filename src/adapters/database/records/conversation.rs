use crate::domain::conversation::{Conversation, ParticipantPair};
use crate::error::AppError;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct ConversationRecord {
    pub(crate) id: Uuid,
    pub(crate) participant_low: Uuid,
    pub(crate) participant_high: Uuid,
    pub(crate) created_at: OffsetDateTime,
}

impl TryFrom<ConversationRecord> for Conversation {
    type Error = AppError;

    fn try_from(record: ConversationRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id,
            participants: ParticipantPair::new(record.participant_low, record.participant_high)?,
            created_at: record.created_at,
        })
    }
}

use crate::domain::message::Message;
use crate::error::AppError;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct MessageRecord {
    pub(crate) id: Uuid,
    pub(crate) conversation_id: Uuid,
    pub(crate) sender_id: Uuid,
    pub(crate) recipient_id: Uuid,
    pub(crate) message_type: String,
    pub(crate) text: String,
    pub(crate) created_at: OffsetDateTime,
}

impl TryFrom<MessageRecord> for Message {
    type Error = AppError;

    fn try_from(record: MessageRecord) -> Result<Self, Self::Error> {
        let kind = record.message_type.parse().map_err(|e: String| {
            tracing::error!(message_id = %record.id, error = %e, "Stored message has an unknown type");
            AppError::Internal
        })?;

        Ok(Self {
            id: record.id,
            conversation_id: record.conversation_id,
            to: record.recipient_id,
            from: record.sender_id,
            kind,
            text: record.text,
            created_at: record.created_at,
        })
    }
}

use crate::adapters::database::records::MessageRecord;
use crate::domain::message::{Message, NewMessage};
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct MessageRepository {}

impl MessageRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Appends a message to a conversation.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the conversation does not exist.
    /// Returns `AppError::Database` if the insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, message))]
    pub(crate) async fn create(&self, conn: &mut PgConnection, conversation_id: Uuid, message: NewMessage) -> Result<Message> {
        let result = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, recipient_id, message_type, text)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, conversation_id, sender_id, recipient_id, message_type, text, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(conversation_id)
        .bind(message.from)
        .bind(message.to)
        .bind(message.kind.as_str())
        .bind(message.text)
        .fetch_one(conn)
        .await;

        match result {
            Ok(record) => record.try_into(),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23503") => {
                // Either the conversation or one of the users is gone.
                Err(AppError::NotFound("conversation"))
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    /// Messages of a conversation in append order.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn list_for_conversation(&self, conn: &mut PgConnection, conversation_id: Uuid) -> Result<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, conversation_id, sender_id, recipient_id, message_type, text, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(conn)
        .await?;

        records.into_iter().map(TryInto::try_into).collect()
    }
}

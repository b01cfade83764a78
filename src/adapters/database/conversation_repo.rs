use crate::adapters::database::records::ConversationRecord;
use crate::domain::conversation::{Conversation, ParticipantPair};
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct ConversationRepository {}

impl ConversationRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Creates the conversation for a participant pair.
    ///
    /// # Errors
    /// Returns `AppError::Conflict` if the pair already has a conversation.
    /// Returns `AppError::NotFound` if either participant does not exist.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn create(&self, conn: &mut PgConnection, pair: ParticipantPair) -> Result<Conversation> {
        let result = sqlx::query_as::<_, ConversationRecord>(
            r#"
            INSERT INTO conversations (id, participant_low, participant_high)
            VALUES ($1, $2, $3)
            RETURNING id, participant_low, participant_high, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(pair.low())
        .bind(pair.high())
        .fetch_one(conn)
        .await;

        match result {
            Ok(record) => record.try_into(),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23505") => {
                Err(AppError::Conflict("conversation already exists for this pair".into()))
            }
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23503") => Err(AppError::NotFound("user")),
            Err(e) => Err(AppError::Database(e)),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn find_by_participants(
        &self,
        conn: &mut PgConnection,
        pair: ParticipantPair,
    ) -> Result<Option<Conversation>> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            r#"
            SELECT id, participant_low, participant_high, created_at
            FROM conversations
            WHERE participant_low = $1 AND participant_high = $2
            "#,
        )
        .bind(pair.low())
        .bind(pair.high())
        .fetch_optional(conn)
        .await?;

        record.map(TryInto::try_into).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn find_by_id(&self, conn: &mut PgConnection, id: Uuid) -> Result<Option<Conversation>> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            "SELECT id, participant_low, participant_high, created_at FROM conversations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        record.map(TryInto::try_into).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn list_for_user(&self, conn: &mut PgConnection, user_id: Uuid) -> Result<Vec<Conversation>> {
        let records = sqlx::query_as::<_, ConversationRecord>(
            r#"
            SELECT id, participant_low, participant_high, created_at
            FROM conversations
            WHERE participant_low = $1 OR participant_high = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(conn)
        .await?;

        records.into_iter().map(TryInto::try_into).collect()
    }
}

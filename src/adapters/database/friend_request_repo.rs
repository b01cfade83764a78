use crate::adapters::database::records::FriendRequestRecord;
use crate::domain::friend_request::FriendRequest;
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct FriendRequestRepository {}

impl FriendRequestRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Records a pending friend request.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if either user does not exist.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn create(&self, conn: &mut PgConnection, sender_id: Uuid, recipient_id: Uuid) -> Result<FriendRequest> {
        let result = sqlx::query_as::<_, FriendRequestRecord>(
            r#"
            INSERT INTO friend_requests (id, sender_id, recipient_id)
            VALUES ($1, $2, $3)
            RETURNING id, sender_id, recipient_id, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(sender_id)
        .bind(recipient_id)
        .fetch_one(conn)
        .await;

        match result {
            Ok(record) => Ok(record.into()),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23503") => Err(AppError::NotFound("user")),
            Err(e) => Err(AppError::Database(e)),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn find_by_id(&self, conn: &mut PgConnection, id: Uuid) -> Result<Option<FriendRequest>> {
        let record = sqlx::query_as::<_, FriendRequestRecord>(
            "SELECT id, sender_id, recipient_id, created_at FROM friend_requests WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(record.map(Into::into))
    }

    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn list_for_recipient(&self, conn: &mut PgConnection, recipient_id: Uuid) -> Result<Vec<FriendRequest>> {
        let records = sqlx::query_as::<_, FriendRequestRecord>(
            r#"
            SELECT id, sender_id, recipient_id, created_at
            FROM friend_requests
            WHERE recipient_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(recipient_id)
        .fetch_all(conn)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    /// Removes the request and returns it. Concurrent callers see it at most once.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn delete_returning(&self, conn: &mut PgConnection, id: Uuid) -> Result<Option<FriendRequest>> {
        let record = sqlx::query_as::<_, FriendRequestRecord>(
            "DELETE FROM friend_requests WHERE id = $1 RETURNING id, sender_id, recipient_id, created_at",
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(record.map(Into::into))
    }
}

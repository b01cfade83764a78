use crate::adapters::database::records::{UserRecord, UserSummaryRecord};
use crate::domain::user::{NewUser, PresenceStatus, User, UserSummary};
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct UserRepository {}

impl UserRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Inserts a user record.
    ///
    /// # Errors
    /// Returns `AppError::Conflict` if the email is already registered.
    #[tracing::instrument(level = "debug", skip(self, conn, new_user))]
    pub(crate) async fn create(&self, conn: &mut PgConnection, new_user: NewUser) -> Result<User> {
        let result = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (id, first_name, last_name, email)
            VALUES ($1, $2, $3, $4)
            RETURNING id, first_name, last_name, email, status, connection_id, friends, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(new_user.first_name)
        .bind(new_user.last_name)
        .bind(new_user.email)
        .fetch_one(conn)
        .await;

        match result {
            Ok(record) => Ok(record.into()),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23505") => {
                Err(AppError::Conflict("email already registered".into()))
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn find_by_id(&self, conn: &mut PgConnection, id: Uuid) -> Result<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, first_name, last_name, email, status, connection_id, friends, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(record.map(Into::into))
    }

    /// Display fields for `ids`, in the order the ids were given.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn find_summaries(&self, conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<UserSummary>> {
        let records = sqlx::query_as::<_, UserSummaryRecord>(
            r#"
            SELECT u.id, u.first_name, u.last_name, u.email, u.status
            FROM unnest($1::uuid[]) WITH ORDINALITY AS wanted(id, ord)
            JOIN users u ON u.id = wanted.id
            ORDER BY wanted.ord
            "#,
        )
        .bind(ids)
        .fetch_all(conn)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    /// Records `connection_id` unless a newer connection is already on record.
    /// Returns whether the user exists.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn mark_online(&self, conn: &mut PgConnection, id: Uuid, connection_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users SET status = $2, connection_id = $3
            WHERE id = $1 AND (connection_id IS NULL OR connection_id < $3)
            "#,
        )
        .bind(id)
        .bind(PresenceStatus::Online.as_str())
        .bind(connection_id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(exists)
    }

    /// Only clears presence that still belongs to `connection_id`.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn mark_offline(&self, conn: &mut PgConnection, id: Uuid, connection_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users SET status = $2, connection_id = NULL
            WHERE id = $1 AND connection_id = $3
            "#,
        )
        .bind(id)
        .bind(PresenceStatus::Offline.as_str())
        .bind(connection_id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Row-locks the given users in id order. Returns the ids that exist.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn lock_for_update(&self, conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<Uuid>> {
        let locked = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(ids)
            .fetch_all(conn)
            .await?;

        Ok(locked)
    }

    /// Appends `friend_id` to the user's friend list unless it is already there.
    #[tracing::instrument(level = "debug", skip(self, conn), err)]
    pub(crate) async fn add_friend(&self, conn: &mut PgConnection, id: Uuid, friend_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users SET friends = array_append(friends, $2)
            WHERE id = $1 AND NOT ($2 = ANY(friends))
            "#,
        )
        .bind(id)
        .bind(friend_id)
        .execute(conn)
        .await?;

        Ok(())
    }
}

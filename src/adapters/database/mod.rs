pub mod conversation_repo;
pub mod friend_request_repo;
pub mod message_repo;
pub mod records;
pub mod user_repo;

use crate::adapters::database::conversation_repo::ConversationRepository;
use crate::adapters::database::friend_request_repo::FriendRequestRepository;
use crate::adapters::database::message_repo::MessageRepository;
use crate::adapters::database::user_repo::UserRepository;
use crate::config::DatabaseConfig;
use crate::domain::conversation::{Conversation, ParticipantPair};
use crate::domain::friend_request::FriendRequest;
use crate::domain::message::{Message, NewMessage};
use crate::domain::user::{NewUser, User, UserSummary};
use crate::error::{AppError, Result};
use crate::storage::Store;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use uuid::Uuid;

pub type DbPool = Pool<Postgres>;

/// Initializes the database connection pool.
///
/// # Errors
/// Returns `sqlx::Error` if the connection fails.
pub async fn init_pool(config: &DatabaseConfig, url: &str) -> std::result::Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .connect(url)
        .await
}

/// Postgres-backed [`Store`].
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: DbPool,
    users: UserRepository,
    friend_requests: FriendRequestRepository,
    conversations: ConversationRepository,
    messages: MessageRepository,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self {
            pool,
            users: UserRepository::new(),
            friend_requests: FriendRequestRepository::new(),
            conversations: ConversationRepository::new(),
            messages: MessageRepository::new(),
        }
    }

    /// Seeds a user record.
    ///
    /// # Errors
    /// Returns `AppError::Conflict` if the email is taken.
    pub async fn insert_user(&self, new_user: NewUser) -> Result<User> {
        let mut conn = self.pool.acquire().await?;
        self.users.create(&mut conn, new_user).await
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        self.users.find_by_id(&mut conn, id).await
    }

    async fn find_user_summaries(&self, ids: &[Uuid]) -> Result<Vec<UserSummary>> {
        let mut conn = self.pool.acquire().await?;
        self.users.find_summaries(&mut conn, ids).await
    }

    async fn mark_online(&self, user_id: Uuid, connection_id: Uuid) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        self.users.mark_online(&mut conn, user_id, connection_id).await
    }

    async fn mark_offline(&self, user_id: Uuid, connection_id: Uuid) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        self.users.mark_offline(&mut conn, user_id, connection_id).await
    }

    async fn create_friend_request(&self, sender: Uuid, recipient: Uuid) -> Result<FriendRequest> {
        let mut conn = self.pool.acquire().await?;
        self.friend_requests.create(&mut conn, sender, recipient).await
    }

    async fn find_friend_request(&self, id: Uuid) -> Result<Option<FriendRequest>> {
        let mut conn = self.pool.acquire().await?;
        self.friend_requests.find_by_id(&mut conn, id).await
    }

    async fn list_friend_requests_for(&self, recipient: Uuid) -> Result<Vec<FriendRequest>> {
        let mut conn = self.pool.acquire().await?;
        self.friend_requests.list_for_recipient(&mut conn, recipient).await
    }

    async fn accept_friend_request(&self, id: Uuid) -> Result<Option<FriendRequest>> {
        let mut tx = self.pool.begin().await?;

        let Some(request) = self.friend_requests.delete_returning(&mut tx, id).await? else {
            return Ok(None);
        };

        let locked = self.users.lock_for_update(&mut tx, &[request.sender, request.recipient]).await?;
        if locked.len() != 2 {
            // Dropping the transaction rolls the delete back.
            return Err(AppError::NotFound("user"));
        }

        self.users.add_friend(&mut tx, request.sender, request.recipient).await?;
        self.users.add_friend(&mut tx, request.recipient, request.sender).await?;

        tx.commit().await?;
        Ok(Some(request))
    }

    async fn find_conversation_by_participants(&self, pair: ParticipantPair) -> Result<Option<Conversation>> {
        let mut conn = self.pool.acquire().await?;
        self.conversations.find_by_participants(&mut conn, pair).await
    }

    async fn create_conversation(&self, pair: ParticipantPair) -> Result<Conversation> {
        let mut conn = self.pool.acquire().await?;
        self.conversations.create(&mut conn, pair).await
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let mut conn = self.pool.acquire().await?;
        self.conversations.find_by_id(&mut conn, id).await
    }

    async fn list_conversations_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let mut conn = self.pool.acquire().await?;
        self.conversations.list_for_user(&mut conn, user_id).await
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let mut conn = self.pool.acquire().await?;
        self.messages.list_for_conversation(&mut conn, conversation_id).await
    }

    async fn append_message(&self, conversation_id: Uuid, message: NewMessage) -> Result<Message> {
        let mut conn = self.pool.acquire().await?;
        self.messages.create(&mut conn, conversation_id, message).await
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

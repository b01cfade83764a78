//! Persistence port of the relay.
//!
//! Services only talk to a [`Store`]; the Postgres and in-memory adapters live
//! under `crate::adapters`, and [`ResilientStore`] bounds every call in time.

pub mod resilient;

use crate::domain::conversation::{Conversation, ParticipantPair};
use crate::domain::friend_request::FriendRequest;
use crate::domain::message::{Message, NewMessage};
use crate::domain::user::{User, UserSummary};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

pub use resilient::ResilientStore;

pub type SharedStore = Arc<dyn Store>;

#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;

    /// Display fields for the given users. Unknown ids are skipped.
    async fn find_user_summaries(&self, ids: &[Uuid]) -> Result<Vec<UserSummary>>;

    /// Marks the user online on `connection_id` unless a newer connection is
    /// already on record. Returns `false` for an unknown user.
    async fn mark_online(&self, user_id: Uuid, connection_id: Uuid) -> Result<bool>;

    /// Marks the user offline, but only while `connection_id` is still the one on record.
    async fn mark_offline(&self, user_id: Uuid, connection_id: Uuid) -> Result<bool>;

    async fn create_friend_request(&self, sender: Uuid, recipient: Uuid) -> Result<FriendRequest>;

    async fn find_friend_request(&self, id: Uuid) -> Result<Option<FriendRequest>>;

    async fn list_friend_requests_for(&self, recipient: Uuid) -> Result<Vec<FriendRequest>>;

    /// Atomically consumes the request and makes both parties friends of each other.
    ///
    /// Returns `Ok(None)` when the request does not exist (or was already consumed),
    /// and `AppError::NotFound` when either party no longer exists.
    async fn accept_friend_request(&self, id: Uuid) -> Result<Option<FriendRequest>>;

    async fn find_conversation_by_participants(&self, pair: ParticipantPair) -> Result<Option<Conversation>>;

    /// Creates the conversation for `pair`.
    ///
    /// Fails with `AppError::Conflict` if one already exists for the pair.
    async fn create_conversation(&self, pair: ParticipantPair) -> Result<Conversation>;

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>>;

    async fn list_conversations_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>>;

    /// Messages of a conversation in append order.
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>>;

    async fn append_message(&self, conversation_id: Uuid, message: NewMessage) -> Result<Message>;

    async fn ping(&self) -> Result<()>;
}

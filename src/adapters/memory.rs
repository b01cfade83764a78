use crate::domain::conversation::{Conversation, ParticipantPair};
use crate::domain::friend_request::FriendRequest;
use crate::domain::message::{Message, NewMessage};
use crate::domain::user::{NewUser, PresenceStatus, User, UserSummary};
use crate::error::{AppError, Result};
use crate::storage::Store;
use async_trait::async_trait;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug)]
struct ConversationEntry {
    conversation: Conversation,
    messages: Vec<Message>,
}

#[derive(Debug, Default)]
struct State {
    users: HashMap<Uuid, User>,
    friend_requests: HashMap<Uuid, FriendRequest>,
    // Insertion order doubles as the natural listing order.
    conversations: Vec<ConversationEntry>,
    by_id: HashMap<Uuid, usize>,
    by_pair: HashMap<ParticipantPair, usize>,
}

/// Process-local store used when no database is configured, and by tests.
///
/// A single lock guards all state, so every operation is atomic with respect to
/// every other, which gives the same guarantees the Postgres adapter gets from
/// transactions and unique constraints.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a user record. Registration is owned by the identity service, so
    /// this is the only way users enter the in-memory store.
    pub async fn insert_user(&self, new_user: NewUser) -> User {
        let user = User {
            id: Uuid::now_v7(),
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            email: new_user.email,
            status: PresenceStatus::Offline,
            connection_id: None,
            friends: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.state.lock().await.users.insert(user.id, user.clone());
        user
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn find_user_summaries(&self, ids: &[Uuid]) -> Result<Vec<UserSummary>> {
        let state = self.state.lock().await;
        Ok(ids.iter().filter_map(|id| state.users.get(id)).map(User::summary).collect())
    }

    async fn mark_online(&self, user_id: Uuid, connection_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(false);
        };
        if user.connection_id.is_none_or(|current| current < connection_id) {
            user.status = PresenceStatus::Online;
            user.connection_id = Some(connection_id);
        }
        Ok(true)
    }

    async fn mark_offline(&self, user_id: Uuid, connection_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.users.get_mut(&user_id) {
            Some(user) if user.connection_id == Some(connection_id) => {
                user.status = PresenceStatus::Offline;
                user.connection_id = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_friend_request(&self, sender: Uuid, recipient: Uuid) -> Result<FriendRequest> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&sender) || !state.users.contains_key(&recipient) {
            return Err(AppError::NotFound("user"));
        }

        let request = FriendRequest { id: Uuid::now_v7(), sender, recipient, created_at: OffsetDateTime::now_utc() };
        state.friend_requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_friend_request(&self, id: Uuid) -> Result<Option<FriendRequest>> {
        Ok(self.state.lock().await.friend_requests.get(&id).cloned())
    }

    async fn list_friend_requests_for(&self, recipient: Uuid) -> Result<Vec<FriendRequest>> {
        let state = self.state.lock().await;
        let mut requests: Vec<_> =
            state.friend_requests.values().filter(|r| r.recipient == recipient).cloned().collect();
        requests.sort_by_key(|r| (r.created_at, r.id));
        Ok(requests)
    }

    async fn accept_friend_request(&self, id: Uuid) -> Result<Option<FriendRequest>> {
        let mut state = self.state.lock().await;
        let Some(request) = state.friend_requests.get(&id).cloned() else {
            return Ok(None);
        };

        if !state.users.contains_key(&request.sender) || !state.users.contains_key(&request.recipient) {
            return Err(AppError::NotFound("user"));
        }

        if let Some(sender) = state.users.get_mut(&request.sender) {
            sender.add_friend(request.recipient);
        }
        if let Some(recipient) = state.users.get_mut(&request.recipient) {
            recipient.add_friend(request.sender);
        }
        state.friend_requests.remove(&id);

        Ok(Some(request))
    }

    async fn find_conversation_by_participants(&self, pair: ParticipantPair) -> Result<Option<Conversation>> {
        let state = self.state.lock().await;
        Ok(state.by_pair.get(&pair).map(|&idx| state.conversations[idx].conversation.clone()))
    }

    async fn create_conversation(&self, pair: ParticipantPair) -> Result<Conversation> {
        let mut state = self.state.lock().await;
        if state.by_pair.contains_key(&pair) {
            return Err(AppError::Conflict("conversation already exists for this pair".into()));
        }
        if !state.users.contains_key(&pair.low()) || !state.users.contains_key(&pair.high()) {
            return Err(AppError::NotFound("user"));
        }

        let conversation = Conversation { id: Uuid::now_v7(), participants: pair, created_at: OffsetDateTime::now_utc() };
        let idx = state.conversations.len();
        state.conversations.push(ConversationEntry { conversation: conversation.clone(), messages: Vec::new() });
        state.by_id.insert(conversation.id, idx);
        state.by_pair.insert(pair, idx);

        Ok(conversation)
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let state = self.state.lock().await;
        Ok(state.by_id.get(&id).map(|&idx| state.conversations[idx].conversation.clone()))
    }

    async fn list_conversations_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let state = self.state.lock().await;
        Ok(state
            .conversations
            .iter()
            .filter(|entry| entry.conversation.participants.contains(user_id))
            .map(|entry| entry.conversation.clone())
            .collect())
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let state = self.state.lock().await;
        Ok(state.by_id.get(&conversation_id).map(|&idx| state.conversations[idx].messages.clone()).unwrap_or_default())
    }

    async fn append_message(&self, conversation_id: Uuid, message: NewMessage) -> Result<Message> {
        let mut state = self.state.lock().await;
        let idx = *state.by_id.get(&conversation_id).ok_or(AppError::NotFound("conversation"))?;

        let message = Message {
            id: Uuid::now_v7(),
            conversation_id,
            to: message.to,
            from: message.from,
            kind: message.kind,
            text: message.text,
            created_at: OffsetDateTime::now_utc(),
        };
        state.conversations[idx].messages.push(message.clone());

        Ok(message)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

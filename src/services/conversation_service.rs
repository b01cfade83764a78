use crate::domain::conversation::{Conversation, ConversationView, ParticipantPair};
use crate::domain::event::MessageHistory;
use crate::domain::user::UserSummary;
use crate::error::{AppError, Result};
use crate::storage::SharedStore;
use opentelemetry::{global, metrics::Counter};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) created_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            created_total: meter
                .u64_counter("parley_conversations_created_total")
                .with_description("Direct conversations created")
                .build(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConversationService {
    store: SharedStore,
    metrics: Metrics,
}

impl ConversationService {
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        Self { store, metrics: Metrics::new() }
    }

    /// Returns the conversation between two users, creating it on first use.
    ///
    /// Concurrent callers for the same pair all resolve to the same conversation:
    /// the store rejects a second create for a pair, and the loser re-reads the winner.
    ///
    /// # Errors
    /// Returns `AppError::InvalidArgument` if both ids are the same user.
    /// Returns `AppError::NotFound` if either user does not exist.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn find_or_create(&self, user_a: Uuid, user_b: Uuid) -> Result<ConversationView> {
        let pair = ParticipantPair::new(user_a, user_b)?;

        let participants = self.store.find_user_summaries(&pair.as_array()).await?;
        if participants.len() != 2 {
            return Err(AppError::NotFound("user"));
        }

        let conversation = match self.store.find_conversation_by_participants(pair).await? {
            Some(existing) => existing,
            None => self.create_or_reload(pair).await?,
        };

        Ok(ConversationView { id: conversation.id, participants, created_at: conversation.created_at })
    }

    async fn create_or_reload(&self, pair: ParticipantPair) -> Result<Conversation> {
        match self.store.create_conversation(pair).await {
            Ok(conversation) => {
                self.metrics.created_total.add(1, &[]);
                tracing::info!(conversation_id = %conversation.id, "Conversation created");
                Ok(conversation)
            }
            Err(AppError::Conflict(_)) => {
                tracing::debug!("Lost the race to create the conversation, reloading");
                self.store.find_conversation_by_participants(pair).await?.ok_or_else(|| {
                    tracing::error!(low = %pair.low(), high = %pair.high(), "Conflicting conversation vanished");
                    AppError::Internal
                })
            }
            Err(e) => Err(e),
        }
    }

    /// All conversations `user_id` takes part in, with participants resolved.
    ///
    /// # Errors
    /// Returns `AppError::StoreUnavailable` if the store cannot be reached.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ConversationView>> {
        let conversations = self.store.list_conversations_for_user(user_id).await?;

        let mut ids: Vec<Uuid> = conversations.iter().flat_map(|c| c.participants.as_array()).collect();
        ids.sort_unstable();
        ids.dedup();

        let users: HashMap<Uuid, UserSummary> =
            self.store.find_user_summaries(&ids).await?.into_iter().map(|u| (u.id, u)).collect();

        Ok(conversations
            .into_iter()
            .map(|c| ConversationView {
                id: c.id,
                participants: c.participants.as_array().iter().filter_map(|id| users.get(id).cloned()).collect(),
                created_at: c.created_at,
            })
            .collect())
    }

    /// # Errors
    /// Returns `AppError::NotFound` if the conversation does not exist.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn get_messages(&self, conversation_id: Uuid) -> Result<MessageHistory> {
        if self.store.find_conversation(conversation_id).await?.is_none() {
            return Err(AppError::NotFound("conversation"));
        }

        let messages = self.store.list_messages(conversation_id).await?;
        Ok(MessageHistory { conversation_id, messages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::domain::user::NewUser;
    use crate::storage::Store;
    use std::sync::Arc;

    async fn user(store: &MemoryStore, name: &str) -> Uuid {
        store
            .insert_user(NewUser { first_name: name.into(), last_name: "Jones".into(), email: format!("{name}@example.com") })
            .await
            .id
    }

    #[tokio::test]
    async fn test_find_or_create_is_idempotent_and_order_independent() {
        let store = Arc::new(MemoryStore::new());
        let service = ConversationService::new(store.clone());
        let a = user(&store, "amy").await;
        let b = user(&store, "bo").await;

        let first = service.find_or_create(b, a).await.expect("created");
        let second = service.find_or_create(a, b).await.expect("found");

        assert_eq!(first.id, second.id);
        let expected = if a < b { vec![a, b] } else { vec![b, a] };
        assert_eq!(first.participants.iter().map(|p| p.id).collect::<Vec<_>>(), expected);
    }

    #[tokio::test]
    async fn test_concurrent_find_or_create_yields_one_conversation() {
        let store = Arc::new(MemoryStore::new());
        let service = ConversationService::new(store.clone());
        let a = user(&store, "amy").await;
        let b = user(&store, "bo").await;

        let mut handles = Vec::new();
        for i in 0..16 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 { service.find_or_create(a, b).await } else { service.find_or_create(b, a).await }
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.expect("task joined").expect("resolved").id);
        }
        ids.dedup();

        assert_eq!(ids.len(), 1);
        assert_eq!(store.list_conversations_for_user(a).await.expect("store op").len(), 1);
    }

    #[tokio::test]
    async fn test_find_or_create_rejects_bad_participants() {
        let store = Arc::new(MemoryStore::new());
        let service = ConversationService::new(store.clone());
        let a = user(&store, "amy").await;

        assert!(matches!(service.find_or_create(a, a).await, Err(AppError::InvalidArgument(_))));
        assert!(matches!(service.find_or_create(a, Uuid::new_v4()).await, Err(AppError::NotFound("user"))));
    }

    #[tokio::test]
    async fn test_list_for_user_resolves_participants() {
        let store = Arc::new(MemoryStore::new());
        let service = ConversationService::new(store.clone());
        let a = user(&store, "amy").await;
        let b = user(&store, "bo").await;
        let c = user(&store, "cy").await;

        service.find_or_create(a, b).await.expect("created");
        service.find_or_create(a, c).await.expect("created");
        service.find_or_create(b, c).await.expect("created");

        let listed = service.list_for_user(a).await.expect("listed");
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|view| view.participants.len() == 2));
        assert!(listed.iter().all(|view| view.participants.iter().any(|p| p.id == a)));
    }

    #[tokio::test]
    async fn test_get_messages_of_unknown_conversation() {
        let service = ConversationService::new(Arc::new(MemoryStore::new()));
        assert!(matches!(service.get_messages(Uuid::new_v4()).await, Err(AppError::NotFound("conversation"))));
    }
}

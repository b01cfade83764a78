use crate::config::StoreConfig;
use crate::domain::conversation::{Conversation, ParticipantPair};
use crate::domain::friend_request::FriendRequest;
use crate::domain::message::{Message, NewMessage};
use crate::domain::user::{User, UserSummary};
use crate::error::{AppError, Result};
use crate::storage::{SharedStore, Store};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    timeouts_total: Counter<u64>,
    retries_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            timeouts_total: meter
                .u64_counter("parley_store_timeouts_total")
                .with_description("Persistence calls that exceeded the configured timeout")
                .build(),
            retries_total: meter
                .u64_counter("parley_store_read_retries_total")
                .with_description("Read retries after a retryable persistence failure")
                .build(),
        }
    }
}

/// Bounds every persistence call in time and retries idempotent reads.
///
/// Writes are attempted exactly once: a timed-out write may or may not have been
/// applied, and repeating it could apply it twice.
#[derive(Clone, Debug)]
pub struct ResilientStore {
    inner: SharedStore,
    timeout: Duration,
    backoff: ExponentialBuilder,
    metrics: Metrics,
}

impl ResilientStore {
    #[must_use]
    pub fn new(inner: SharedStore, config: &StoreConfig) -> Self {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(config.min_backoff_ms))
            .with_max_delay(Duration::from_millis(config.max_backoff_ms))
            .with_max_times(config.read_retries);

        Self { inner, timeout: Duration::from_millis(config.timeout_ms), backoff, metrics: Metrics::new() }
    }

    async fn bounded<T>(&self, op: &'static str, fut: impl Future<Output = Result<T>> + Send) -> Result<T> {
        if let Ok(result) = tokio::time::timeout(self.timeout, fut).await {
            result
        } else {
            tracing::warn!(operation = op, timeout_ms = self.timeout.as_millis(), "Store call timed out");
            self.metrics.timeouts_total.add(1, &[KeyValue::new("operation", op)]);
            Err(AppError::StoreUnavailable(format!("{op} timed out")))
        }
    }

    async fn read<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        (|| self.bounded(op, call()))
            .retry(self.backoff)
            .when(AppError::is_retryable)
            .notify(|e, delay| {
                tracing::debug!(operation = op, error = %e, ?delay, "Retrying store read");
                self.metrics.retries_total.add(1, &[KeyValue::new("operation", op)]);
            })
            .await
    }
}

#[async_trait]
impl Store for ResilientStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        self.read("find_user", || self.inner.find_user(id)).await
    }

    async fn find_user_summaries(&self, ids: &[Uuid]) -> Result<Vec<UserSummary>> {
        self.read("find_user_summaries", || self.inner.find_user_summaries(ids)).await
    }

    async fn mark_online(&self, user_id: Uuid, connection_id: Uuid) -> Result<bool> {
        self.bounded("mark_online", self.inner.mark_online(user_id, connection_id)).await
    }

    async fn mark_offline(&self, user_id: Uuid, connection_id: Uuid) -> Result<bool> {
        self.bounded("mark_offline", self.inner.mark_offline(user_id, connection_id)).await
    }

    async fn create_friend_request(&self, sender: Uuid, recipient: Uuid) -> Result<FriendRequest> {
        self.bounded("create_friend_request", self.inner.create_friend_request(sender, recipient)).await
    }

    async fn find_friend_request(&self, id: Uuid) -> Result<Option<FriendRequest>> {
        self.read("find_friend_request", || self.inner.find_friend_request(id)).await
    }

    async fn list_friend_requests_for(&self, recipient: Uuid) -> Result<Vec<FriendRequest>> {
        self.read("list_friend_requests_for", || self.inner.list_friend_requests_for(recipient)).await
    }

    async fn accept_friend_request(&self, id: Uuid) -> Result<Option<FriendRequest>> {
        self.bounded("accept_friend_request", self.inner.accept_friend_request(id)).await
    }

    async fn find_conversation_by_participants(&self, pair: ParticipantPair) -> Result<Option<Conversation>> {
        self.read("find_conversation_by_participants", || self.inner.find_conversation_by_participants(pair)).await
    }

    async fn create_conversation(&self, pair: ParticipantPair) -> Result<Conversation> {
        self.bounded("create_conversation", self.inner.create_conversation(pair)).await
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.read("find_conversation", || self.inner.find_conversation(id)).await
    }

    async fn list_conversations_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        self.read("list_conversations_for_user", || self.inner.list_conversations_for_user(user_id)).await
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        self.read("list_messages", || self.inner.list_messages(conversation_id)).await
    }

    async fn append_message(&self, conversation_id: Uuid, message: NewMessage) -> Result<Message> {
        self.bounded("append_message", self.inner.append_message(conversation_id, message)).await
    }

    async fn ping(&self) -> Result<()> {
        self.bounded("ping", self.inner.ping()).await
    }
}

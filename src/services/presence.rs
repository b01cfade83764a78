//! Process-local presence: which user is reachable through which connection.

use crate::domain::event::ServerEvent;
use crate::error::{AppError, Result};
use crate::storage::SharedStore;
use dashmap::{DashMap, mapref::entry::Entry};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, UpDownCounter},
};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) online_users: UpDownCounter<i64>,
    pub(crate) dropped_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            online_users: meter
                .i64_up_down_counter("parley_online_users")
                .with_description("Users with a live, addressable connection on this node")
                .build(),
            dropped_total: meter
                .u64_counter("parley_outbound_dropped_total")
                .with_description("Outbound events dropped because the target buffer was full or closed")
                .build(),
        }
    }
}

/// Outbound side of a live connection.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    connection_id: Uuid,
    sender: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    #[must_use]
    pub const fn new(connection_id: Uuid, sender: mpsc::Sender<ServerEvent>) -> Self {
        Self { connection_id, sender }
    }

    #[must_use]
    pub const fn connection_id(&self) -> Uuid {
        self.connection_id
    }
}

/// Outcome of a best-effort delivery. Neither variant is a failure of the
/// operation that produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Undeliverable,
}

#[derive(Clone, Debug)]
pub struct PresenceRegistry {
    connections: Arc<DashMap<Uuid, ConnectionHandle>>,
    store: SharedStore,
    metrics: Metrics,
}

impl PresenceRegistry {
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        Self { connections: Arc::new(DashMap::new()), store, metrics: Metrics::new() }
    }

    /// Binds `user_id` to `handle`, replacing any earlier connection of the same user.
    ///
    /// Connection ids are time-ordered and only a newer connection may take over,
    /// both here and in the persisted record, so concurrent registrations of one
    /// user settle on the most recent connection whatever order they finish in.
    /// A store outage does not prevent the binding, since this registry is what
    /// delivery consults.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the user does not exist.
    #[tracing::instrument(err(level = "info"), skip(self, handle), fields(connection_id = %handle.connection_id))]
    pub async fn register(&self, user_id: Uuid, handle: ConnectionHandle) -> Result<()> {
        let connection_id = handle.connection_id;

        match self.store.mark_online(user_id, connection_id).await {
            Ok(true) => {}
            Ok(false) => return Err(AppError::NotFound("user")),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to persist online status");
            }
        }

        match self.connections.entry(user_id) {
            Entry::Occupied(mut entry) => {
                let current = entry.get().connection_id;
                if current > connection_id {
                    tracing::info!(current_connection_id = %current, "A newer connection already owns presence");
                    return Ok(());
                }
                let previous = entry.insert(handle);
                tracing::info!(previous_connection_id = %previous.connection_id, "Connection taken over by a newer one");
            }
            Entry::Vacant(entry) => {
                entry.insert(handle);
                self.metrics.online_users.add(1, &[]);
            }
        }

        tracing::debug!("Presence registered");
        Ok(())
    }

    /// Clears presence for `user_id` if `connection_id` still owns it.
    /// Returns whether anything was cleared.
    #[tracing::instrument(skip(self))]
    pub async fn unregister(&self, user_id: Uuid, connection_id: Uuid) -> bool {
        if self.connections.remove_if(&user_id, |_, handle| handle.connection_id == connection_id).is_none() {
            tracing::debug!("Connection no longer owns presence");
            return false;
        }
        self.metrics.online_users.add(-1, &[]);

        if let Err(e) = self.store.mark_offline(user_id, connection_id).await {
            tracing::warn!(error = %e, "Failed to persist offline status");
        }

        tracing::debug!("Presence unregistered");
        true
    }

    #[must_use]
    pub fn lookup(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.connections.get(&user_id).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.connections.contains_key(&user_id)
    }

    /// Queues `event` for the user's live connection without waiting.
    pub fn deliver(&self, user_id: Uuid, event: ServerEvent) -> Delivery {
        let Some(handle) = self.lookup(user_id) else {
            tracing::debug!(%user_id, event = event.name(), "Recipient offline, event not delivered");
            return Delivery::Undeliverable;
        };

        let name = event.name();
        match handle.sender.try_send(event) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(%user_id, event = name, "Outbound buffer full, dropping event");
                self.metrics.dropped_total.add(1, &[KeyValue::new("reason", "full")]);
                Delivery::Undeliverable
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(%user_id, event = name, "Connection closed, dropping event");
                self.metrics.dropped_total.add(1, &[KeyValue::new("reason", "closed")]);
                Delivery::Undeliverable
            }
        }
    }
}

use crate::domain::event::{FriendRequestNotice, ServerEvent};
use crate::domain::friend_request::{FriendRequest, PendingFriendRequest};
use crate::domain::user::UserSummary;
use crate::error::{AppError, Result};
use crate::services::presence::PresenceRegistry;
use crate::storage::SharedStore;
use opentelemetry::{global, metrics::Counter};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) sent_total: Counter<u64>,
    pub(crate) accepted_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            sent_total: meter
                .u64_counter("parley_friend_requests_sent_total")
                .with_description("Friend requests created")
                .build(),
            accepted_total: meter
                .u64_counter("parley_friend_requests_accepted_total")
                .with_description("Friend requests accepted")
                .build(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FriendService {
    store: SharedStore,
    presence: PresenceRegistry,
    metrics: Metrics,
}

impl FriendService {
    #[must_use]
    pub fn new(store: SharedStore, presence: PresenceRegistry) -> Self {
        Self { store, presence, metrics: Metrics::new() }
    }

    /// Creates a friend request and notifies both parties if they are online.
    ///
    /// # Errors
    /// Returns `AppError::InvalidArgument` if a user befriends themselves.
    /// Returns `AppError::NotFound` if either user does not exist.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn send_request(&self, from: Uuid, to: Uuid) -> Result<FriendRequest> {
        if from == to {
            return Err(AppError::InvalidArgument("cannot send a friend request to yourself".into()));
        }

        let (sender, recipient) = tokio::try_join!(self.store.find_user(from), self.store.find_user(to))?;
        let (Some(sender), Some(_)) = (sender, recipient) else {
            return Err(AppError::NotFound("user"));
        };

        let request = self.store.create_friend_request(from, to).await?;
        self.metrics.sent_total.add(1, &[]);
        tracing::info!(request_id = %request.id, "Friend request created");

        let notice = |message: String| FriendRequestNotice {
            request_id: request.id,
            sender: request.sender,
            recipient: request.recipient,
            message,
        };

        self.presence.deliver(
            to,
            ServerEvent::NewFriendRequest(notice(format!(
                "{} {} sent you a friend request",
                sender.first_name, sender.last_name
            ))),
        );
        self.presence.deliver(from, ServerEvent::RequestSent(notice("Friend request sent".into())));

        Ok(request)
    }

    /// Consumes a pending request and makes both users friends.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the request does not exist or was already accepted.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn accept_request(&self, request_id: Uuid) -> Result<FriendRequest> {
        let request = self.store.accept_friend_request(request_id).await?.ok_or(AppError::NotFound("friend request"))?;
        self.metrics.accepted_total.add(1, &[]);
        tracing::info!(sender = %request.sender, recipient = %request.recipient, "Friend request accepted");

        let notice = FriendRequestNotice {
            request_id: request.id,
            sender: request.sender,
            recipient: request.recipient,
            message: "Friend request accepted".into(),
        };
        self.presence.deliver(request.sender, ServerEvent::RequestAccepted(notice.clone()));
        self.presence.deliver(request.recipient, ServerEvent::RequestAccepted(notice));

        Ok(request)
    }

    /// Pending requests addressed to `user_id`, oldest first.
    ///
    /// # Errors
    /// Returns `AppError::StoreUnavailable` if the store cannot be reached.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn list_pending(&self, user_id: Uuid) -> Result<Vec<PendingFriendRequest>> {
        let requests = self.store.list_friend_requests_for(user_id).await?;

        let mut sender_ids: Vec<Uuid> = requests.iter().map(|r| r.sender).collect();
        sender_ids.sort_unstable();
        sender_ids.dedup();

        let senders: HashMap<Uuid, UserSummary> =
            self.store.find_user_summaries(&sender_ids).await?.into_iter().map(|s| (s.id, s)).collect();

        Ok(requests
            .into_iter()
            .filter_map(|request| {
                senders.get(&request.sender).map(|sender| PendingFriendRequest {
                    id: request.id,
                    sender: sender.clone(),
                    created_at: request.created_at,
                })
            })
            .collect())
    }

    /// # Errors
    /// Returns `AppError::NotFound` if the user does not exist.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn list_friends(&self, user_id: Uuid) -> Result<Vec<UserSummary>> {
        let user = self.store.find_user(user_id).await?.ok_or(AppError::NotFound("user"))?;
        self.store.find_user_summaries(&user.friends).await
    }
}

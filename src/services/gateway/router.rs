use crate::domain::event::{CallbackReply, ClientEvent, ServerEvent, TextMessagePayload};
use crate::domain::message::NewMessage;
use crate::error::{AppError, Result};
use crate::services::conversation_service::ConversationService;
use crate::services::friend_service::FriendService;
use crate::services::message_service::MessageService;
use uuid::Uuid;

/// Identity of the connection an event arrived on.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionContext {
    pub(crate) connection_id: Uuid,
    /// `None` for anonymous connections.
    pub(crate) user_id: Option<Uuid>,
}

/// What the session has to do after an event was handled.
#[derive(Debug)]
pub(crate) enum Dispatch {
    Done,
    /// Event addressed to the calling connection only.
    Reply(ServerEvent),
    Callback(Result<CallbackReply>),
    Failed(AppError),
    Close,
}

#[derive(Clone, Debug)]
pub struct EventRouter {
    friends: FriendService,
    conversations: ConversationService,
    messages: MessageService,
}

impl EventRouter {
    #[must_use]
    pub const fn new(friends: FriendService, conversations: ConversationService, messages: MessageService) -> Self {
        Self { friends, conversations, messages }
    }

    #[tracing::instrument(
        name = "dispatch_event",
        skip(self, ctx, event),
        fields(event = event.name(), connection_id = %ctx.connection_id)
    )]
    pub(crate) async fn dispatch(&self, ctx: &ConnectionContext, event: ClientEvent) -> Dispatch {
        match event {
            ClientEvent::FriendRequest(p) => settle(self.friends.send_request(p.from, p.to).await),
            ClientEvent::AcceptRequest(p) => settle(self.friends.accept_request(p.request_id).await),
            ClientEvent::GetDirectConversations(p) => {
                Dispatch::Callback(self.conversations.list_for_user(p.user_id).await.map(CallbackReply::Conversations))
            }
            ClientEvent::StartConversation(p) => match self.conversations.find_or_create(p.from, p.to).await {
                Ok(view) => Dispatch::Reply(ServerEvent::StartChat(view)),
                Err(e) => Dispatch::Failed(e),
            },
            ClientEvent::GetMessages(p) => {
                Dispatch::Callback(self.conversations.get_messages(p.conversation_id).await.map(CallbackReply::Messages))
            }
            ClientEvent::TextMessage(p) => settle(self.send_text(p).await),
            ClientEvent::GetFriendRequests(p) => {
                Dispatch::Callback(self.friends.list_pending(p.user_id).await.map(CallbackReply::FriendRequests))
            }
            ClientEvent::GetFriends(p) => {
                Dispatch::Callback(self.friends.list_friends(p.user_id).await.map(CallbackReply::Friends))
            }
            ClientEvent::End(p) => {
                if let Some(claimed) = p.user_id.filter(|claimed| ctx.user_id != Some(*claimed)) {
                    tracing::warn!(%claimed, "end event names a user other than the connection's, ignoring the id");
                }
                Dispatch::Close
            }
        }
    }

    async fn send_text(&self, p: TextMessagePayload) -> Result<()> {
        let message = NewMessage { to: p.to, from: p.from, kind: p.kind, text: p.message };
        self.messages.send(p.conversation_id, message).await.map(|_| ())
    }
}

fn settle<T>(result: Result<T>) -> Dispatch {
    match result {
        Ok(_) => Dispatch::Done,
        Err(e) => Dispatch::Failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::config::MessagingConfig;
    use crate::domain::event::{
        AcceptRequestPayload, ConversationPayload, EndPayload, StartConversationPayload, UserPayload,
    };
    use crate::domain::message::MessageType;
    use crate::domain::user::NewUser;
    use crate::services::presence::PresenceRegistry;
    use std::sync::Arc;

    async fn setup() -> (EventRouter, Uuid, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let presence = PresenceRegistry::new(store.clone());
        let router = EventRouter::new(
            FriendService::new(store.clone(), presence.clone()),
            ConversationService::new(store.clone()),
            MessageService::new(store.clone(), presence, MessagingConfig::default()),
        );
        let a = store
            .insert_user(NewUser { first_name: "Eve".into(), last_name: "E".into(), email: "eve@example.com".into() })
            .await;
        let b = store
            .insert_user(NewUser { first_name: "Finn".into(), last_name: "F".into(), email: "finn@example.com".into() })
            .await;
        (router, a.id, b.id)
    }

    fn ctx(user_id: Option<Uuid>) -> ConnectionContext {
        ConnectionContext { connection_id: Uuid::new_v4(), user_id }
    }

    #[tokio::test]
    async fn test_start_conversation_replies_to_caller() {
        let (router, a, b) = setup().await;

        let dispatch = router
            .dispatch(&ctx(Some(a)), ClientEvent::StartConversation(StartConversationPayload { to: b, from: a }))
            .await;

        match dispatch {
            Dispatch::Reply(ServerEvent::StartChat(view)) => assert_eq!(view.participants.len(), 2),
            other => panic!("expected start_chat reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_text_message_then_history_callback() {
        let (router, a, b) = setup().await;
        let caller = ctx(Some(a));
        let Dispatch::Reply(ServerEvent::StartChat(view)) =
            router.dispatch(&caller, ClientEvent::StartConversation(StartConversationPayload { to: b, from: a })).await
        else {
            panic!("expected start_chat reply");
        };

        let sent = router
            .dispatch(
                &caller,
                ClientEvent::TextMessage(TextMessagePayload {
                    to: b,
                    from: a,
                    message: "hi".into(),
                    conversation_id: view.id,
                    kind: MessageType::Text,
                }),
            )
            .await;
        assert!(matches!(sent, Dispatch::Done));

        let history =
            router.dispatch(&caller, ClientEvent::GetMessages(ConversationPayload { conversation_id: view.id })).await;
        match history {
            Dispatch::Callback(Ok(CallbackReply::Messages(history))) => {
                assert_eq!(history.messages.last().map(|m| m.text.as_str()), Some("hi"));
            }
            other => panic!("expected message history, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failures_are_reported_not_raised() {
        let (router, a, _) = setup().await;

        let accept = router
            .dispatch(&ctx(Some(a)), ClientEvent::AcceptRequest(AcceptRequestPayload { request_id: Uuid::new_v4() }))
            .await;
        assert!(matches!(accept, Dispatch::Failed(AppError::NotFound("friend request"))));

        let friends = router.dispatch(&ctx(None), ClientEvent::GetFriends(UserPayload { user_id: Uuid::new_v4() })).await;
        assert!(matches!(friends, Dispatch::Callback(Err(AppError::NotFound("user")))));
    }

    #[tokio::test]
    async fn test_end_closes_even_with_mismatched_user() {
        let (router, a, b) = setup().await;
        let dispatch = router.dispatch(&ctx(Some(a)), ClientEvent::End(EndPayload { user_id: Some(b) })).await;
        assert!(matches!(dispatch, Dispatch::Close));
    }
}

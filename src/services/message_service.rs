use crate::config::MessagingConfig;
use crate::domain::event::{MessageEnvelope, ServerEvent};
use crate::domain::message::{Message, MessageType, NewMessage};
use crate::error::{AppError, Result};
use crate::services::presence::PresenceRegistry;
use crate::storage::SharedStore;
use opentelemetry::{KeyValue, global, metrics::Counter};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) sent_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            sent_total: meter
                .u64_counter("parley_messages_sent_total")
                .with_description("Total messages successfully appended")
                .build(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MessageService {
    store: SharedStore,
    presence: PresenceRegistry,
    config: MessagingConfig,
    metrics: Metrics,
}

impl MessageService {
    #[must_use]
    pub fn new(store: SharedStore, presence: PresenceRegistry, config: MessagingConfig) -> Self {
        Self { store, presence, config, metrics: Metrics::new() }
    }

    /// Appends a message to a conversation and pushes it to both participants.
    ///
    /// # Errors
    /// Returns `AppError::InvalidArgument` for file messages, empty or oversized text.
    /// Returns `AppError::NotFound` if the conversation does not exist.
    /// Returns `AppError::Forbidden` if sender and recipient are not its two participants.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, message),
        fields(from = %message.from, to = %message.to, kind = %message.kind)
    )]
    pub async fn send(&self, conversation_id: Uuid, message: NewMessage) -> Result<Message> {
        self.validate(&message)?;

        let conversation =
            self.store.find_conversation(conversation_id).await?.ok_or(AppError::NotFound("conversation"))?;
        if !conversation.participants.contains(message.from) || !conversation.participants.contains(message.to) {
            return Err(AppError::Forbidden("sender and recipient must be the conversation's participants".into()));
        }

        let message = self.store.append_message(conversation_id, message).await?;
        self.metrics.sent_total.add(1, &[KeyValue::new("type", message.kind.as_str())]);
        tracing::debug!(message_id = %message.id, "Message appended");

        let envelope = MessageEnvelope { conversation_id, message: message.clone() };
        self.presence.deliver(message.to, ServerEvent::NewMessage(envelope.clone()));
        self.presence.deliver(message.from, ServerEvent::NewMessage(envelope));

        Ok(message)
    }

    fn validate(&self, message: &NewMessage) -> Result<()> {
        if message.kind == MessageType::File {
            return Err(AppError::InvalidArgument("file messages are not supported".into()));
        }
        if message.to == message.from {
            return Err(AppError::InvalidArgument("sender and recipient must differ".into()));
        }
        if message.text.trim().is_empty() {
            return Err(AppError::InvalidArgument("message text is empty".into()));
        }
        if message.text.chars().count() > self.config.max_text_length {
            return Err(AppError::InvalidArgument(format!(
                "message text exceeds {} characters",
                self.config.max_text_length
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::domain::conversation::ParticipantPair;
    use crate::domain::user::NewUser;
    use crate::services::presence::ConnectionHandle;
    use crate::storage::Store;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct Fixture {
        store: Arc<MemoryStore>,
        presence: PresenceRegistry,
        service: MessageService,
        a: Uuid,
        b: Uuid,
        conversation_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let presence = PresenceRegistry::new(store.clone());
        let service = MessageService::new(store.clone(), presence.clone(), MessagingConfig { max_text_length: 16 });

        let mut ids = Vec::new();
        for name in ["ida", "jon"] {
            let user = store
                .insert_user(NewUser { first_name: name.into(), last_name: "Doe".into(), email: format!("{name}@example.com") })
                .await;
            ids.push(user.id);
        }
        let pair = ParticipantPair::new(ids[0], ids[1]).expect("distinct users");
        let conversation = store.create_conversation(pair).await.expect("created");

        Fixture { store, presence, service, a: ids[0], b: ids[1], conversation_id: conversation.id }
    }

    fn text(from: Uuid, to: Uuid, body: &str) -> NewMessage {
        NewMessage { to, from, kind: MessageType::Text, text: body.into() }
    }

    #[tokio::test]
    async fn test_messages_are_listed_in_send_order() {
        let f = fixture().await;

        for i in 0..5 {
            let (from, to) = if i % 2 == 0 { (f.a, f.b) } else { (f.b, f.a) };
            f.service.send(f.conversation_id, text(from, to, &format!("msg {i}"))).await.expect("sent");
        }

        let messages = f.store.list_messages(f.conversation_id).await.expect("store op");
        let bodies: Vec<_> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(bodies, vec!["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"]);
    }

    #[tokio::test]
    async fn test_send_to_offline_recipient_succeeds() {
        let f = fixture().await;
        let message = f.service.send(f.conversation_id, text(f.a, f.b, "hi")).await.expect("sent");
        assert_eq!(message.text, "hi");
    }

    #[tokio::test]
    async fn test_send_echoes_to_both_participants() {
        let f = fixture().await;
        let (a_tx, mut a_rx) = mpsc::channel(4);
        let (b_tx, mut b_rx) = mpsc::channel(4);
        f.presence.register(f.a, ConnectionHandle::new(Uuid::new_v4(), a_tx)).await.expect("registered");
        f.presence.register(f.b, ConnectionHandle::new(Uuid::new_v4(), b_tx)).await.expect("registered");

        let sent = f.service.send(f.conversation_id, text(f.a, f.b, "hi")).await.expect("sent");

        for rx in [&mut a_rx, &mut b_rx] {
            match rx.try_recv().expect("event delivered") {
                ServerEvent::NewMessage(envelope) => {
                    assert_eq!(envelope.conversation_id, f.conversation_id);
                    assert_eq!(envelope.message, sent);
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_send_rejects_outsiders_and_bad_input() {
        let f = fixture().await;
        let outsider = Uuid::new_v4();

        assert!(matches!(
            f.service.send(f.conversation_id, text(outsider, f.b, "hi")).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            f.service.send(Uuid::new_v4(), text(f.a, f.b, "hi")).await,
            Err(AppError::NotFound("conversation"))
        ));
        assert!(matches!(
            f.service.send(f.conversation_id, text(f.a, f.b, "   ")).await,
            Err(AppError::InvalidArgument(_))
        ));
        assert!(matches!(
            f.service.send(f.conversation_id, text(f.a, f.b, "this is far too long")).await,
            Err(AppError::InvalidArgument(_))
        ));
        let file = NewMessage { kind: MessageType::File, ..text(f.a, f.b, "doc.pdf") };
        assert!(matches!(f.service.send(f.conversation_id, file).await, Err(AppError::InvalidArgument(_))));
        assert!(f.store.list_messages(f.conversation_id).await.expect("store op").is_empty());
    }
}

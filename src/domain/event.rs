//! Events exchanged with connected clients.
//!
//! Inbound events are decoded into [`ClientEvent`] commands and handled by the
//! event router; outbound events are [`ServerEvent`]s addressed to a single
//! connection through the presence registry.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::conversation::ConversationView;
use crate::domain::friend_request::PendingFriendRequest;
use crate::domain::message::{Message, MessageType};
use crate::domain::user::UserSummary;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FriendRequestPayload {
    pub from: Uuid,
    pub to: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AcceptRequestPayload {
    pub request_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserPayload {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StartConversationPayload {
    pub to: Uuid,
    pub from: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConversationPayload {
    pub conversation_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TextMessagePayload {
    pub to: Uuid,
    pub from: Uuid,
    pub message: String,
    pub conversation_id: Uuid,
    #[serde(rename = "type", default)]
    pub kind: MessageType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EndPayload {
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    FriendRequest(FriendRequestPayload),
    AcceptRequest(AcceptRequestPayload),
    GetDirectConversations(UserPayload),
    StartConversation(StartConversationPayload),
    GetMessages(ConversationPayload),
    TextMessage(TextMessagePayload),
    GetFriendRequests(UserPayload),
    GetFriends(UserPayload),
    End(EndPayload),
}

impl ClientEvent {
    /// Decodes an event from its wire name and JSON payload.
    ///
    /// # Errors
    /// Returns `AppError::InvalidArgument` for unknown events or malformed payloads.
    pub fn decode(name: &str, data: Value) -> Result<Self> {
        // Events without a payload may omit `data` entirely.
        let data = if data.is_null() { Value::Object(serde_json::Map::new()) } else { data };

        let event = match name {
            "friend_request" => Self::FriendRequest(payload(name, data)?),
            "accept_request" => Self::AcceptRequest(payload(name, data)?),
            "get_direct_conversations" => Self::GetDirectConversations(payload(name, data)?),
            "start_conversation" => Self::StartConversation(payload(name, data)?),
            "get_messages" => Self::GetMessages(payload(name, data)?),
            "text_message" => Self::TextMessage(payload(name, data)?),
            "get_friend_requests" => Self::GetFriendRequests(payload(name, data)?),
            "get_friends" => Self::GetFriends(payload(name, data)?),
            "end" => Self::End(payload(name, data)?),
            "file_message" => {
                return Err(AppError::InvalidArgument("file messages are not supported".into()));
            }
            other => return Err(AppError::InvalidArgument(format!("unknown event: {other}"))),
        };

        Ok(event)
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::FriendRequest(_) => "friend_request",
            Self::AcceptRequest(_) => "accept_request",
            Self::GetDirectConversations(_) => "get_direct_conversations",
            Self::StartConversation(_) => "start_conversation",
            Self::GetMessages(_) => "get_messages",
            Self::TextMessage(_) => "text_message",
            Self::GetFriendRequests(_) => "get_friend_requests",
            Self::GetFriends(_) => "get_friends",
            Self::End(_) => "end",
        }
    }

    /// Request/response events answer through the caller's ack id.
    #[must_use]
    pub const fn expects_callback(&self) -> bool {
        matches!(
            self,
            Self::GetDirectConversations(_) | Self::GetMessages(_) | Self::GetFriendRequests(_) | Self::GetFriends(_)
        )
    }
}

fn payload<T: for<'de> Deserialize<'de>>(event: &str, data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| AppError::InvalidArgument(format!("malformed {event} payload: {e}")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FriendRequestNotice {
    pub request_id: Uuid,
    pub sender: Uuid,
    pub recipient: Uuid,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageEnvelope {
    pub conversation_id: Uuid,
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    pub code: String,
    pub message: String,
}

impl ErrorPayload {
    #[must_use]
    pub fn from_error(event: Option<&str>, error: &AppError) -> Self {
        Self { event: event.map(str::to_owned), code: error.code().to_string(), message: error.public_message() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    NewFriendRequest(FriendRequestNotice),
    RequestSent(FriendRequestNotice),
    RequestAccepted(FriendRequestNotice),
    StartChat(ConversationView),
    NewMessage(MessageEnvelope),
    Error(ErrorPayload),
}

impl ServerEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NewFriendRequest(_) => "new_friend_request",
            Self::RequestSent(_) => "request_sent",
            Self::RequestAccepted(_) => "request_accepted",
            Self::StartChat(_) => "start_chat",
            Self::NewMessage(_) => "new_message",
            Self::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageHistory {
    pub conversation_id: Uuid,
    pub messages: Vec<Message>,
}

/// Payload returned through an ack for request/response events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CallbackReply {
    Conversations(Vec<ConversationView>),
    Messages(MessageHistory),
    FriendRequests(Vec<PendingFriendRequest>),
    Friends(Vec<UserSummary>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_text_message() {
        let to = Uuid::new_v4();
        let from = Uuid::new_v4();
        let conversation_id = Uuid::new_v4();

        let event = ClientEvent::decode(
            "text_message",
            json!({ "to": to, "from": from, "message": "hi", "conversation_id": conversation_id, "type": "link" }),
        )
        .expect("valid payload");

        assert_eq!(
            event,
            ClientEvent::TextMessage(TextMessagePayload {
                to,
                from,
                message: "hi".into(),
                conversation_id,
                kind: MessageType::Link,
            })
        );
        assert!(!event.expects_callback());
    }

    #[test]
    fn test_decode_end_without_payload() {
        let event = ClientEvent::decode("end", Value::Null).expect("end needs no payload");
        assert_eq!(event, ClientEvent::End(EndPayload::default()));
    }

    #[test]
    fn test_decode_rejects_unknown_and_malformed_events() {
        assert!(matches!(ClientEvent::decode("dance", json!({})), Err(AppError::InvalidArgument(_))));
        assert!(matches!(
            ClientEvent::decode("accept_request", json!({ "request_id": "not-a-uuid" })),
            Err(AppError::InvalidArgument(_))
        ));
        assert!(matches!(ClientEvent::decode("file_message", json!({})), Err(AppError::InvalidArgument(_))));
    }

    #[test]
    fn test_server_event_wire_shape() {
        let error = ServerEvent::Error(ErrorPayload::from_error(Some("accept_request"), &AppError::NotFound("friend request")));
        let value = serde_json::to_value(&error).expect("serializable");

        assert_eq!(value["event"], "error");
        assert_eq!(value["data"]["event"], "accept_request");
        assert_eq!(value["data"]["code"], "not_found");
    }
}

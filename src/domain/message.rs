use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Link,
    /// Declared by the protocol; attachment transfer is not implemented.
    File,
}

impl MessageType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Link => "link",
            Self::File => "file",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "link" => Ok(Self::Link),
            "file" => Ok(Self::File),
            other => Err(format!("unknown message type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: Uuid,
    #[serde(skip)]
    pub conversation_id: Uuid,
    pub to: Uuid,
    pub from: Uuid,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub text: String,
    #[serde(serialize_with = "crate::domain::serialize_unix_millis")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub to: Uuid,
    pub from: Uuid,
    pub kind: MessageType,
    pub text: String,
}

use crate::domain::event::CallbackReply;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// A client event as it arrives on the socket.
#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub ack: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AckError {
    pub code: String,
    pub message: String,
}

/// Answer to a callback event, correlated by the client's ack id.
#[derive(Debug, Serialize)]
pub struct AckFrame {
    pub ack: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<CallbackReply>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AckError>,
}

impl AckFrame {
    #[must_use]
    pub fn from_result(ack: u64, result: Result<CallbackReply, AppError>) -> Self {
        match result {
            Ok(reply) => Self { ack, data: Some(reply), error: None },
            Err(e) => Self::error(ack, &e),
        }
    }

    #[must_use]
    pub fn error(ack: u64, error: &AppError) -> Self {
        Self {
            ack,
            data: None,
            error: Some(AckError { code: error.code().to_string(), message: error.public_message() }),
        }
    }
}

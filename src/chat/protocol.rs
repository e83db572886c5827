use serde::{Deserialize, Serialize};

use crate::db::ChatMessage;

/// Frames a client may send over the chat socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientEvent {
    Join {
        #[serde(rename = "chatKey")]
        chat_key: String,
    },
    Message {
        sender: String,
        message: String,
    },
}

/// Frames the server sends back.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    History { messages: Vec<ChatMessage> },
    Message { message: ChatMessage },
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

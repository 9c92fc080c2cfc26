//! Wire protocol between clients and the room server.
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": <payload>}`.

use crate::chat::ChatMessage;
use crate::element::{DrawingElement, ElementError, ElementId};
use crate::presence::User;
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// A user's pointer position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPosition {
    pub user_id: String,
    pub cursor: Point,
}

/// Messages sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    UserCursor(CursorPosition),
    ElementCreated(DrawingElement),
    ElementUpdated(DrawingElement),
    ElementDeleted(ElementId),
    ChatMessage(ChatMessage),
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::UserCursor(_) => "user-cursor",
            ClientMessage::ElementCreated(_) => "element-created",
            ClientMessage::ElementUpdated(_) => "element-updated",
            ClientMessage::ElementDeleted(_) => "element-deleted",
            ClientMessage::ChatMessage(_) => "chat-message",
        }
    }

    /// Check any carried element before it is applied or relayed.
    pub fn validate(&self) -> Result<(), ElementError> {
        match self {
            ClientMessage::ElementCreated(element) | ClientMessage::ElementUpdated(element) => {
                element.validate()
            }
            ClientMessage::ElementDeleted(id) if id.is_empty() => Err(ElementError::MissingId),
            _ => Ok(()),
        }
    }
}

/// Messages sent from the server to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    UserJoined(User),
    /// Id of the user who left.
    UserLeft(String),
    UserCursor(CursorPosition),
    ElementCreated(DrawingElement),
    ElementUpdated(DrawingElement),
    ElementDeleted(ElementId),
    /// Full element list sent to a client when it joins.
    ElementsBatch(Vec<DrawingElement>),
    ChatMessage(ChatMessage),
    /// Retained chat history sent to a client when it joins.
    ChatHistory(Vec<ChatMessage>),
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Event name, for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::UserJoined(_) => "user-joined",
            ServerMessage::UserLeft(_) => "user-left",
            ServerMessage::UserCursor(_) => "user-cursor",
            ServerMessage::ElementCreated(_) => "element-created",
            ServerMessage::ElementUpdated(_) => "element-updated",
            ServerMessage::ElementDeleted(_) => "element-deleted",
            ServerMessage::ElementsBatch(_) => "elements-batch",
            ServerMessage::ChatMessage(_) => "chat-message",
            ServerMessage::ChatHistory(_) => "chat-history",
        }
    }
}

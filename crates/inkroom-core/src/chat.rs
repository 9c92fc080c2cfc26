//! Room chat messages and the bounded chat log.

use crate::element::now_ms;
use crate::presence::User;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Number of messages a room keeps.
pub const CHAT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    #[default]
    Message,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_color: String,
    pub message: String,
    pub timestamp: u64,
    #[serde(rename = "type", default)]
    pub kind: ChatKind,
}

impl ChatMessage {
    /// A message from `user`. The text is trimmed.
    pub fn new(user: &User, text: &str) -> Self {
        let timestamp = now_ms();
        Self {
            id: format!("{timestamp}-{}", Uuid::new_v4().simple()),
            user_id: user.id.clone(),
            user_name: user.name.clone(),
            user_color: user.color.clone(),
            message: text.trim().to_string(),
            timestamp,
            kind: ChatKind::Message,
        }
    }

    /// A system notice not attributed to any user.
    pub fn system(text: &str) -> Self {
        let timestamp = now_ms();
        Self {
            id: format!("{timestamp}-{}", Uuid::new_v4().simple()),
            user_id: String::new(),
            user_name: "System".to_string(),
            user_color: "#888888".to_string(),
            message: text.trim().to_string(),
            timestamp,
            kind: ChatKind::System,
        }
    }
}

/// FIFO chat history that drops the oldest message past its capacity.
#[derive(Debug, Clone)]
pub struct ChatLog {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
}

impl Default for ChatLog {
    fn default() -> Self {
        Self::with_capacity(CHAT_HISTORY_LIMIT)
    }
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a message, returning the evicted oldest one if the log was full.
    pub fn push(&mut self, message: ChatMessage) -> Option<ChatMessage> {
        let evicted = if self.messages.len() >= self.capacity {
            self.messages.pop_front()
        } else {
            None
        };
        self.messages.push_back(message);
        evicted
    }

    /// Replace the history, keeping the newest `capacity` messages.
    pub fn replace(&mut self, messages: Vec<ChatMessage>) {
        let skip = messages.len().saturating_sub(self.capacity);
        self.messages = messages.into_iter().skip(skip).collect();
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    pub fn to_vec(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.back()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new("abcdef42", "User abcdef", "#4ECDC4")
    }

    #[test]
    fn test_new_trims_and_attributes() {
        let message = ChatMessage::new(&user(), "  hello  ");
        assert_eq!(message.message, "hello");
        assert_eq!(message.user_name, "User abcdef");
        assert_eq!(message.kind, ChatKind::Message);
        let (millis, _) = message.id.split_once('-').unwrap();
        assert_eq!(millis, message.timestamp.to_string());
    }

    #[test]
    fn test_log_drops_oldest_past_limit() {
        let mut log = ChatLog::new();
        let author = user();
        let mut first_id = None;
        for i in 0..=CHAT_HISTORY_LIMIT {
            let message = ChatMessage::new(&author, &format!("msg {i}"));
            first_id.get_or_insert_with(|| message.id.clone());
            let evicted = log.push(message);
            if i < CHAT_HISTORY_LIMIT {
                assert!(evicted.is_none());
            } else {
                assert_eq!(evicted.map(|m| m.id), first_id.clone());
            }
        }
        assert_eq!(log.len(), CHAT_HISTORY_LIMIT);
        assert_eq!(log.iter().next().unwrap().message, "msg 1");
        assert_eq!(log.last().unwrap().message, format!("msg {CHAT_HISTORY_LIMIT}"));
    }

    #[test]
    fn test_replace_keeps_newest() {
        let mut log = ChatLog::with_capacity(2);
        let author = user();
        log.replace(vec![
            ChatMessage::new(&author, "a"),
            ChatMessage::new(&author, "b"),
            ChatMessage::new(&author, "c"),
        ]);
        let texts: Vec<_> = log.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, vec!["b", "c"]);
    }

    #[test]
    fn test_wire_format() {
        let value = serde_json::to_value(ChatMessage::system("welcome")).unwrap();
        assert_eq!(value["type"], "system");
        assert!(value.get("userColor").is_some());
    }
}

//! Room members and their cursors.

use crate::element::now_ms;
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Colors handed out to users as they join.
pub const USER_COLORS: [&str; 10] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
    "#BB8FCE", "#85C1E9",
];

/// Display name derived from a user id: "User " plus its first six characters.
pub fn display_name(user_id: &str) -> String {
    let prefix: String = user_id.chars().take(6).collect();
    format!("User {prefix}")
}

/// A member of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Point>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub joined_at: u64,
}

fn default_active() -> bool {
    true
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: color.into(),
            cursor: None,
            is_active: true,
            joined_at: now_ms(),
        }
    }
}

/// Client-side roster of the other users in the room, in join order.
#[derive(Debug, Clone, Default)]
pub struct Presence {
    users: Vec<User>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user or replace the entry with the same id.
    pub fn upsert(&mut self, user: User) {
        match self.users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user,
            None => self.users.push(user),
        }
    }

    pub fn remove(&mut self, user_id: &str) -> Option<User> {
        let index = self.users.iter().position(|u| u.id == user_id)?;
        Some(self.users.remove(index))
    }

    /// Move a user's cursor. Returns false for unknown users.
    pub fn update_cursor(&mut self, user_id: &str, cursor: Point) -> bool {
        match self.users.iter_mut().find(|u| u.id == user_id) {
            Some(user) => {
                user.cursor = Some(cursor);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, user_id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == user_id)
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }
}

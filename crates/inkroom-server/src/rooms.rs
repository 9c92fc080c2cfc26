//! Authoritative room state.
//!
//! A room exists while it has at least one member. It holds the element list,
//! the chat history and a broadcast channel that fans server messages out to
//! every connection in the room.

use dashmap::DashMap;
use inkroom_core::presence::{USER_COLORS, display_name};
use inkroom_core::{ChatLog, ChatMessage, CursorPosition, DrawingElement, ServerMessage, User};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

/// Capacity of each room's broadcast channel.
pub const CHANNEL_CAPACITY: usize = 256;

/// Identifies one websocket connection.
pub type ConnectionId = Uuid;

/// A message fanned out to a room, optionally skipping the sending connection.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub exclude: Option<ConnectionId>,
    pub message: ServerMessage,
}

impl Envelope {
    /// Whether the connection `conn` should receive this message.
    pub fn is_for(&self, conn: ConnectionId) -> bool {
        self.exclude != Some(conn)
    }
}

/// A member record and the connection that currently owns it.
struct Member {
    user: User,
    conn: ConnectionId,
}

struct Room {
    /// Keyed by user id. A reconnecting user takes the entry over.
    members: HashMap<String, Member>,
    elements: Vec<DrawingElement>,
    chat: ChatLog,
    tx: broadcast::Sender<Envelope>,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            members: HashMap::new(),
            elements: Vec::new(),
            chat: ChatLog::new(),
            tx,
        }
    }

    fn broadcast(&self, exclude: Option<ConnectionId>, message: ServerMessage) {
        // No receivers just means nobody is listening right now.
        let _ = self.tx.send(Envelope { exclude, message });
    }
}

/// Everything a new member needs after joining.
pub struct JoinOutcome {
    /// The member record created for the joiner.
    pub user: User,
    pub elements: Vec<DrawingElement>,
    pub chat_history: Vec<ChatMessage>,
    /// Members already in the room.
    pub others: Vec<User>,
    /// Subscription to the room's broadcasts.
    pub rx: broadcast::Receiver<Envelope>,
}

/// Read-only copy of a room, for diagnostics and tests.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub users: Vec<User>,
    pub elements: Vec<DrawingElement>,
    pub chat: Vec<ChatMessage>,
}

/// All live rooms, keyed by room id.
#[derive(Default)]
pub struct RoomStore {
    rooms: DashMap<String, Room>,
}

fn random_color() -> &'static str {
    USER_COLORS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_COLORS[0])
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `user_id` to `room_id`, creating the room if needed.
    ///
    /// The other members are told about the joiner; the caller is responsible
    /// for sending the returned state to the joiner itself.
    pub fn join(&self, room_id: &str, user_id: &str, conn: ConnectionId) -> JoinOutcome {
        let mut room = self.rooms.entry(room_id.to_string()).or_insert_with(|| {
            info!(room = %room_id, "room created");
            Room::new()
        });

        let user = User::new(user_id, display_name(user_id), random_color());
        let others: Vec<User> = room
            .members
            .values()
            .filter(|m| m.user.id != user_id)
            .map(|m| m.user.clone())
            .collect();
        room.members.insert(
            user_id.to_string(),
            Member {
                user: user.clone(),
                conn,
            },
        );
        room.broadcast(Some(conn), ServerMessage::UserJoined(user.clone()));
        // Subscribed after the announcement, so the joiner never sees its own join.
        let rx = room.tx.subscribe();

        info!(room = %room_id, user = %user_id, members = room.members.len(), "user joined");
        JoinOutcome {
            user,
            elements: room.elements.clone(),
            chat_history: room.chat.to_vec(),
            others,
            rx,
        }
    }

    /// Append an element and relay it to the other members.
    pub fn create_element(&self, room_id: &str, conn: ConnectionId, element: DrawingElement) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            room.elements.push(element.clone());
            room.broadcast(Some(conn), ServerMessage::ElementCreated(element));
        }
    }

    /// Replace an element by id and relay the update.
    ///
    /// The update is relayed even when the id is unknown here. Returns whether
    /// the stored list changed.
    pub fn update_element(&self, room_id: &str, conn: ConnectionId, element: DrawingElement) -> bool {
        let Some(mut room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        let replaced = match room.elements.iter_mut().find(|e| e.id == element.id) {
            Some(slot) => {
                *slot = element.clone();
                true
            }
            None => {
                debug!(room = %room_id, element = %element.id, "update for unknown element");
                false
            }
        };
        room.broadcast(Some(conn), ServerMessage::ElementUpdated(element));
        replaced
    }

    /// Remove an element by id and relay the deletion.
    pub fn delete_element(&self, room_id: &str, conn: ConnectionId, element_id: &str) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            room.elements.retain(|e| e.id != element_id);
            room.broadcast(
                Some(conn),
                ServerMessage::ElementDeleted(element_id.to_string()),
            );
        }
    }

    /// Record a member's cursor and relay it to the others.
    pub fn cursor(&self, room_id: &str, conn: ConnectionId, user_id: &str, position: CursorPosition) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            if let Some(member) = room.members.get_mut(user_id) {
                member.user.cursor = Some(position.cursor);
            }
            room.broadcast(Some(conn), ServerMessage::UserCursor(position));
        }
    }

    /// Store a chat message and send it to every member, the sender included.
    pub fn chat_message(&self, room_id: &str, message: ChatMessage) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            room.chat.push(message.clone());
            room.broadcast(None, ServerMessage::ChatMessage(message));
        }
    }

    /// Remove a member. Returns true if the room was destroyed as a result.
    ///
    /// Only the connection that owns the member entry removes it; a stale
    /// connection of a user who has since reconnected leaves nothing behind.
    pub fn leave(&self, room_id: &str, user_id: &str, conn: ConnectionId) -> bool {
        let Some(mut room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        match room.members.get(user_id) {
            Some(member) if member.conn == conn => {}
            Some(_) => {
                debug!(room = %room_id, user = %user_id, "stale connection closed, member kept");
                return false;
            }
            None => return false,
        }
        room.members.remove(user_id);
        room.broadcast(Some(conn), ServerMessage::UserLeft(user_id.to_string()));
        info!(room = %room_id, user = %user_id, members = room.members.len(), "user left");

        let empty = room.members.is_empty();
        drop(room);
        if empty && self.rooms.remove_if(room_id, |_, r| r.members.is_empty()).is_some() {
            info!(room = %room_id, "room destroyed");
            return true;
        }
        false
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn snapshot(&self, room_id: &str) -> Option<RoomSnapshot> {
        self.rooms.get(room_id).map(|room| RoomSnapshot {
            users: room.members.values().map(|m| m.user.clone()).collect(),
            elements: room.elements.clone(),
            chat: room.chat.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkroom_core::{CHAT_HISTORY_LIMIT, ElementKind};
    use kurbo::Point;

    fn rect(id: &str) -> DrawingElement {
        let mut element = DrawingElement::new(
            ElementKind::Rectangle,
            vec![Point::new(0.0, 0.0), Point::new(10.0, 10.0)],
            "u1",
        );
        element.id = id.to_string();
        element
    }

    #[test]
    fn test_join_creates_room_and_assigns_identity() {
        let store = RoomStore::new();
        let outcome = store.join("r1", "abcdef123", Uuid::new_v4());

        assert_eq!(store.room_count(), 1);
        assert_eq!(outcome.user.name, "User abcdef");
        assert!(USER_COLORS.contains(&outcome.user.color.as_str()));
        assert!(outcome.elements.is_empty());
        assert!(outcome.others.is_empty());
    }

    #[test]
    fn test_second_joiner_sees_state_and_first_is_notified() {
        let store = RoomStore::new();
        let first_conn = Uuid::new_v4();
        let mut first = store.join("r1", "u1", first_conn);
        store.create_element("r1", first_conn, rect("e1"));

        let second_conn = Uuid::new_v4();
        let second = store.join("r1", "u2", second_conn);
        assert_eq!(second.elements.len(), 1);
        assert_eq!(second.others.len(), 1);
        assert_eq!(second.others[0].id, "u1");

        // The first member's receiver sees its own create (excluded) then the join.
        let created = first.rx.try_recv().unwrap();
        assert!(!created.is_for(first_conn));
        let joined = first.rx.try_recv().unwrap();
        assert!(joined.is_for(first_conn));
        assert!(matches!(joined.message, ServerMessage::UserJoined(ref u) if u.id == "u2"));
    }

    #[test]
    fn test_update_and_delete() {
        let store = RoomStore::new();
        let conn = Uuid::new_v4();
        store.join("r1", "u1", conn);
        store.create_element("r1", conn, rect("e1"));

        let mut moved = rect("e1");
        moved.points[0] = Point::new(5.0, 5.0);
        assert!(store.update_element("r1", conn, moved));
        assert!(!store.update_element("r1", conn, rect("ghost")));
        assert_eq!(
            store.snapshot("r1").unwrap().elements[0].points[0],
            Point::new(5.0, 5.0)
        );

        store.delete_element("r1", conn, "e1");
        assert!(store.snapshot("r1").unwrap().elements.is_empty());
    }

    #[test]
    fn test_cursor_is_stored_on_user() {
        let store = RoomStore::new();
        let conn = Uuid::new_v4();
        store.join("r1", "u1", conn);
        store.cursor(
            "r1",
            conn,
            "u1",
            CursorPosition {
                user_id: "u1".to_string(),
                cursor: Point::new(3.0, 4.0),
            },
        );
        let snapshot = store.snapshot("r1").unwrap();
        assert_eq!(snapshot.users[0].cursor, Some(Point::new(3.0, 4.0)));
    }

    #[test]
    fn test_chat_reaches_sender_and_is_capped() {
        let store = RoomStore::new();
        let conn = Uuid::new_v4();
        let mut outcome = store.join("r1", "u1", conn);

        for i in 0..=CHAT_HISTORY_LIMIT {
            store.chat_message("r1", ChatMessage::new(&outcome.user, &format!("m{i}")));
        }
        let first = outcome.rx.try_recv().unwrap();
        assert!(first.is_for(conn));

        let chat = store.snapshot("r1").unwrap().chat;
        assert_eq!(chat.len(), CHAT_HISTORY_LIMIT);
        assert_eq!(chat[0].message, "m1");
    }

    #[test]
    fn test_last_leave_destroys_room() {
        let store = RoomStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.join("r1", "u1", a);
        store.join("r1", "u2", b);

        assert!(!store.leave("r1", "u1", a));
        assert!(store.contains("r1"));
        assert!(store.leave("r1", "u2", b));
        assert_eq!(store.room_count(), 0);

        // Leaving again is harmless.
        assert!(!store.leave("r1", "u2", b));
    }

    #[test]
    fn test_stale_connection_leave_keeps_reconnected_member() {
        let store = RoomStore::new();
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();
        store.join("r1", "u1", old);
        let mut fresh = store.join("r1", "u1", new);

        assert!(!store.leave("r1", "u1", old));
        assert!(store.contains("r1"));
        assert_eq!(store.snapshot("r1").unwrap().users.len(), 1);
        assert!(fresh.rx.try_recv().is_err(), "no user-left for a stale socket");

        store.create_element("r1", new, rect("e1"));
        assert_eq!(store.snapshot("r1").unwrap().elements.len(), 1);

        assert!(store.leave("r1", "u1", new));
        assert_eq!(store.room_count(), 0);
    }

    #[test]
    fn test_rooms_are_isolated() {
        let store = RoomStore::new();
        let conn = Uuid::new_v4();
        store.join("r1", "u1", conn);
        store.join("r2", "u2", Uuid::new_v4());
        store.create_element("r1", conn, rect("e1"));

        assert_eq!(store.room_count(), 2);
        assert!(store.snapshot("r2").unwrap().elements.is_empty());
    }
}

//! Client-side collaboration: local edits are applied to the document first and
//! then broadcast; inbound room events are folded into the same document.

use crate::chat::{ChatLog, ChatMessage};
use crate::document::DocumentStore;
use crate::element::{DrawingElement, ElementError, ElementId, ElementKind};
use crate::geometry::eraser_tolerance;
use crate::presence::{Presence, USER_COLORS, User, display_name};
use crate::protocol::ServerMessage;
use crate::sync::{ConnectionState, NativeTransport, SyncChannel, SyncConfig, SyncError, Transport};
use crate::tools::{ToolKind, ToolManager};
use kurbo::Point;
use std::time::Instant;

/// Manages the local document and its synchronization with a room.
pub struct CollaborationManager<T: Transport = NativeTransport> {
    /// The local user.
    user: User,
    room_id: Option<String>,
    document: DocumentStore,
    tools: ToolManager,
    presence: Presence,
    chat: ChatLog,
    unread: usize,
    chat_open: bool,
    channel: SyncChannel<T>,
    /// Last pointer position, used to finish drags.
    last_pointer: Option<Point>,
}

impl CollaborationManager<NativeTransport> {
    /// Manager backed by the native websocket client.
    pub fn native(user_id: impl Into<String>, config: SyncConfig) -> Self {
        Self::new(user_id, NativeTransport::new(), config)
    }
}

impl<T: Transport> CollaborationManager<T> {
    pub fn new(user_id: impl Into<String>, transport: T, config: SyncConfig) -> Self {
        let user_id = user_id.into();
        let user = User::new(user_id.clone(), display_name(&user_id), USER_COLORS[0]);
        Self::with_user(user, transport, config)
    }

    pub fn with_user(user: User, transport: T, config: SyncConfig) -> Self {
        Self {
            user,
            room_id: None,
            document: DocumentStore::new(),
            tools: ToolManager::new(),
            presence: Presence::new(),
            chat: ChatLog::new(),
            unread: 0,
            chat_open: false,
            channel: SyncChannel::new(transport, config),
            last_pointer: None,
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn document(&self) -> &DocumentStore {
        &self.document
    }

    pub fn tools(&self) -> &ToolManager {
        &self.tools
    }

    /// Tool settings (style, grid) can be changed freely.
    pub fn tools_mut(&mut self) -> &mut ToolManager {
        &mut self.tools
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    /// Opening the chat marks everything read.
    pub fn set_chat_open(&mut self, open: bool) {
        self.chat_open = open;
        if open {
            self.unread = 0;
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn channel(&self) -> &SyncChannel<T> {
        &self.channel
    }

    // ------------------------------------------------------------------
    // Room lifecycle
    // ------------------------------------------------------------------

    /// Join `room_id`. The server answers with the element batch and chat history.
    pub fn connect(&mut self, room_id: &str) -> Result<(), SyncError> {
        self.channel.connect(room_id, &self.user.id)?;
        self.room_id = Some(room_id.to_string());
        self.presence.clear();
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.channel.disconnect();
        self.room_id = None;
        self.presence.clear();
    }

    /// Drive the connection, apply inbound events and expire laser strokes.
    ///
    /// Returns the applied messages so a UI can react to them.
    pub fn poll(&mut self, now: Instant) -> Vec<ServerMessage> {
        let messages = self.channel.poll(now);
        for message in &messages {
            self.apply(message);
        }
        self.document.expire_temporary(now);
        messages
    }

    fn apply(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::UserJoined(user) => self.presence.upsert(user.clone()),
            ServerMessage::UserLeft(user_id) => {
                self.presence.remove(user_id);
            }
            ServerMessage::UserCursor(position) => {
                self.presence.update_cursor(&position.user_id, position.cursor);
            }
            ServerMessage::ElementCreated(element) => {
                if self.document.get(&element.id).is_some() {
                    self.document.update_element(element.clone());
                } else {
                    self.document.add_element(element.clone());
                }
            }
            ServerMessage::ElementUpdated(element) => {
                self.document.update_element(element.clone());
            }
            ServerMessage::ElementDeleted(id) => {
                self.document.delete_element(id);
            }
            ServerMessage::ElementsBatch(elements) => {
                log::debug!("received {} element(s) from room", elements.len());
                self.document.set_elements(elements.clone());
            }
            ServerMessage::ChatMessage(message) => {
                if !self.chat_open && message.user_id != self.user.id {
                    self.unread += 1;
                }
                self.chat.push(message.clone());
            }
            ServerMessage::ChatHistory(history) => self.chat.replace(history.clone()),
        }
    }

    // ------------------------------------------------------------------
    // Local edits
    // ------------------------------------------------------------------

    /// Add an element locally and broadcast it.
    pub fn add_element(&mut self, element: DrawingElement) -> Result<(), ElementError> {
        element.validate()?;
        self.channel.emit_element_created(&element);
        self.document.add_element(element);
        Ok(())
    }

    /// Replace an element locally and broadcast it. Returns false for unknown ids.
    pub fn update_element(&mut self, element: DrawingElement) -> Result<bool, ElementError> {
        element.validate()?;
        if !self.document.update_element(element.clone()) {
            return Ok(false);
        }
        self.channel.emit_element_updated(&element);
        Ok(true)
    }

    pub fn delete_element(&mut self, id: &str) -> bool {
        if !self.document.delete_element(id) {
            return false;
        }
        self.channel.emit_element_deleted(id);
        true
    }

    /// Set the text of a text element. Not recorded in history.
    pub fn update_text(&mut self, id: &str, text: &str) -> bool {
        let Some(mut element) = self.document.get(id).cloned() else {
            return false;
        };
        let ElementKind::Text(style) = &mut element.kind else {
            return false;
        };
        style.text = text.to_string();
        element.touch();
        self.document.update_element(element.clone());
        self.channel.emit_element_updated(&element);
        true
    }

    /// Leave text editing, deleting blank text.
    ///
    /// The deletion is not only local: an `element-deleted` is emitted, so
    /// peers that received the text element on creation drop it as well.
    pub fn end_text_edit(&mut self) -> Option<ElementId> {
        let removed = self.document.end_text_edit()?;
        self.channel.emit_element_deleted(&removed);
        Some(removed)
    }

    /// Erase everything under `point`. Each deletion is broadcast.
    pub fn erase_at(&mut self, point: Point, pressure: Option<f64>) -> Vec<ElementId> {
        let tolerance = eraser_tolerance(self.tools.style.eraser_size, pressure);
        let erased = self.document.erase_at(point, tolerance);
        for id in &erased {
            self.channel.emit_element_deleted(id);
        }
        erased
    }

    /// Drop the current drag at `point`, broadcasting one update per moved element.
    pub fn commit_drag(&mut self, point: Point) -> usize {
        let moved = self.document.commit_drag(point);
        for element in &moved {
            self.channel.emit_element_updated(element);
        }
        moved.len()
    }

    pub fn move_cursor(&mut self, point: Point) -> bool {
        self.channel.emit_cursor(&self.user.id, point)
    }

    /// Send a chat message. The server echoes it back to every member, so it is
    /// not appended locally. Blank text or an offline channel sends nothing.
    pub fn send_chat(&mut self, text: &str) -> Option<ChatMessage> {
        if text.trim().is_empty() || !self.channel.is_connected() {
            return None;
        }
        let message = ChatMessage::new(&self.user, text);
        self.channel
            .emit_chat_message(&message)
            .then_some(message)
    }

    /// Local only; peers are not told.
    pub fn undo(&mut self) -> bool {
        self.document.undo()
    }

    /// Local only; peers are not told.
    pub fn redo(&mut self) -> bool {
        self.document.redo()
    }

    pub fn select(&mut self, ids: &[ElementId], multi: bool) {
        self.end_text_edit();
        self.document.select(ids, multi);
    }

    pub fn clear_selection(&mut self) {
        self.end_text_edit();
        self.document.clear_selection();
    }

    /// Switch tools. Ends text editing and clears the selection.
    pub fn set_tool(&mut self, tool: ToolKind) {
        self.end_text_edit();
        self.document.clear_selection();
        self.tools.set_tool(tool);
    }

    // ------------------------------------------------------------------
    // Pointer pipeline
    // ------------------------------------------------------------------

    pub fn pointer_down(&mut self, point: Point, multi: bool) {
        self.last_pointer = Some(point);
        match self.tools.current_tool {
            ToolKind::Select => {
                self.end_text_edit();
                // Pressing on an already selected element drags the whole selection.
                let on_selection = !multi
                    && self
                        .document
                        .element_at(point)
                        .is_some_and(|e| e.is_selected);
                if !on_selection {
                    self.document.select_at(point, multi);
                }
                if self.document.has_selection() {
                    self.document.start_drag(point);
                }
            }
            ToolKind::Text => self.text_click(point),
            ToolKind::Eraser => {
                let start = self.tools.begin(point);
                self.erase_at(start, None);
            }
            _ => {
                self.tools.begin(point);
            }
        }
    }

    pub fn pointer_move(&mut self, point: Point) {
        let snapped = self.tools.snap(point);
        self.last_pointer = Some(snapped);
        self.move_cursor(snapped);

        if self.document.is_dragging() {
            self.document.update_drag(snapped);
            return;
        }
        if self.tools.is_active() {
            if self.tools.current_tool == ToolKind::Eraser {
                self.erase_at(snapped, None);
            }
            self.tools.update(point);
        }
    }

    /// Finish the current gesture. Returns the id of a newly created element.
    pub fn pointer_up(&mut self) -> Option<ElementId> {
        if self.document.is_dragging() {
            match self.last_pointer {
                Some(point) => {
                    self.commit_drag(point);
                }
                None => self.document.cancel_drag(),
            }
            return None;
        }
        self.finish_stroke()
    }

    /// Commit the stroke being drawn, if it forms a valid element.
    pub fn finish_stroke(&mut self) -> Option<ElementId> {
        let element = self.tools.finish(&self.user.id)?;
        let id = element.id.clone();
        match self.add_element(element) {
            Ok(()) => Some(id),
            Err(e) => {
                log::warn!("discarding stroke: {e}");
                None
            }
        }
    }

    fn text_click(&mut self, point: Point) {
        let hit = self
            .document
            .element_at(point)
            .filter(|e| e.text().is_some())
            .map(|e| e.id.clone());
        if let Some(id) = hit {
            if self.document.editing_text() != Some(id.as_str()) {
                self.end_text_edit();
                self.document.begin_text_edit(&id);
            }
            return;
        }

        self.end_text_edit();
        let element = self.tools.text_element(point, &self.user.id);
        let id = element.id.clone();
        if self.add_element(element).is_ok() {
            self.document.begin_text_edit(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::PenType;
    use crate::protocol::{ClientMessage, CursorPosition};
    use crate::sync::TransportEvent;
    use crate::sync::testing::MockTransport;
    use std::time::Duration;

    fn manager() -> (CollaborationManager<MockTransport>, MockTransport) {
        let transport = MockTransport::default();
        let mut manager =
            CollaborationManager::new("local-user", transport.clone(), SyncConfig::default());
        manager.connect("room-1").unwrap();
        transport.push(TransportEvent::Opened);
        manager.poll(Instant::now());
        (manager, transport)
    }

    fn rect(x: f64, y: f64, user: &str) -> DrawingElement {
        DrawingElement::new(
            ElementKind::Rectangle,
            vec![Point::new(x, y), Point::new(x + 50.0, y + 50.0)],
            user,
        )
    }

    #[test]
    fn test_drag_emits_one_update_per_selected_element() {
        let (mut manager, transport) = manager();
        manager.add_element(rect(0.0, 0.0, "local-user")).unwrap();
        manager.add_element(rect(100.0, 0.0, "local-user")).unwrap();
        let ids: Vec<ElementId> = manager.document().elements().iter().map(|e| e.id.clone()).collect();
        manager.select(&ids, false);

        manager.pointer_down(Point::new(5.0, 5.0), false);
        assert_eq!(manager.document().selected_ids().len(), 2);
        assert!(manager.document().is_dragging());
        manager.pointer_move(Point::new(30.0, 30.0));
        manager.pointer_up();

        let updates: Vec<DrawingElement> = transport
            .sent_messages()
            .into_iter()
            .filter_map(|m| match m {
                ClientMessage::ElementUpdated(element) => Some(element),
                _ => None,
            })
            .collect();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].points[0], Point::new(25.0, 25.0));
        assert_eq!(updates[1].points[0], Point::new(125.0, 25.0));
    }

    #[test]
    fn test_offline_edits_stay_local() {
        let transport = MockTransport::default();
        let mut manager =
            CollaborationManager::new("local-user", transport.clone(), SyncConfig::default());
        manager.add_element(rect(0.0, 0.0, "local-user")).unwrap();
        assert_eq!(manager.document().len(), 1);
        assert!(transport.state.borrow().sent.is_empty());
        assert!(manager.send_chat("hello").is_none());
    }

    #[test]
    fn test_invalid_element_is_rejected() {
        let (mut manager, transport) = manager();
        let mut element = rect(0.0, 0.0, "local-user");
        element.points.truncate(1);
        assert!(manager.add_element(element).is_err());
        assert!(manager.document().is_empty());
        assert!(transport.state.borrow().sent.is_empty());
    }

    #[test]
    fn test_inbound_events_update_state() {
        let (mut manager, transport) = manager();
        let remote = rect(10.0, 10.0, "peer");
        transport.push_server(&ServerMessage::ElementsBatch(vec![remote.clone()]));
        transport.push_server(&ServerMessage::UserJoined(User::new("peer", "User peer", "#4ECDC4")));
        transport.push_server(&ServerMessage::UserCursor(CursorPosition {
            user_id: "peer".to_string(),
            cursor: Point::new(7.0, 8.0),
        }));
        transport.push_server(&ServerMessage::ElementCreated(rect(300.0, 300.0, "peer")));
        manager.poll(Instant::now());

        assert_eq!(manager.document().len(), 2);
        assert!(manager.document().can_undo());
        assert_eq!(
            manager.presence().get("peer").unwrap().cursor,
            Some(Point::new(7.0, 8.0))
        );

        transport.push_server(&ServerMessage::ElementDeleted(remote.id.clone()));
        transport.push_server(&ServerMessage::UserLeft("peer".to_string()));
        manager.poll(Instant::now());
        assert_eq!(manager.document().len(), 1);
        assert!(manager.presence().is_empty());
    }

    #[test]
    fn test_chat_unread_counter() {
        let (mut manager, transport) = manager();
        let peer = User::new("peer", "User peer", "#4ECDC4");
        transport.push_server(&ServerMessage::ChatMessage(ChatMessage::new(&peer, "hi")));
        transport.push_server(&ServerMessage::ChatMessage(ChatMessage::new(manager.user(), "mine")));
        manager.poll(Instant::now());
        assert_eq!(manager.chat().len(), 2);
        assert_eq!(manager.unread_count(), 1);

        manager.set_chat_open(true);
        assert_eq!(manager.unread_count(), 0);
    }

    #[test]
    fn test_send_chat_trims_and_emits() {
        let (mut manager, transport) = manager();
        assert!(manager.send_chat("   ").is_none());
        let sent = manager.send_chat("  hello  ").unwrap();
        assert_eq!(sent.message, "hello");
        assert_eq!(transport.sent_messages(), vec![ClientMessage::ChatMessage(sent)]);
        // Not appended until the server echoes it.
        assert!(manager.chat().is_empty());
    }

    #[test]
    fn test_laser_stroke_expires_without_history() {
        let (mut manager, transport) = manager();
        manager.set_tool(ToolKind::Pen);
        manager.tools_mut().style.pen_type = PenType::Laser;
        manager.pointer_down(Point::new(0.0, 0.0), false);
        manager.pointer_move(Point::new(20.0, 20.0));
        let id = manager.pointer_up().unwrap();
        assert!(manager.document().get(&id).unwrap().is_temporary);
        let depth = manager.document().history().past().len();

        manager.poll(Instant::now() + Duration::from_secs(3));
        assert!(manager.document().get(&id).is_none());
        assert_eq!(manager.document().history().past().len(), depth);
        assert!(
            !transport
                .sent_messages()
                .iter()
                .any(|m| matches!(m, ClientMessage::ElementDeleted(_)))
        );
    }

    #[test]
    fn test_eraser_emits_deletions() {
        let (mut manager, transport) = manager();
        manager.add_element(rect(0.0, 0.0, "local-user")).unwrap();
        manager.add_element(rect(400.0, 400.0, "local-user")).unwrap();
        manager.set_tool(ToolKind::Eraser);

        manager.pointer_down(Point::new(425.0, 425.0), false);
        manager.pointer_move(Point::new(25.0, 25.0));
        assert!(manager.pointer_up().is_none());

        assert!(manager.document().is_empty());
        let deletes = transport
            .sent_messages()
            .into_iter()
            .filter(|m| matches!(m, ClientMessage::ElementDeleted(_)))
            .count();
        assert_eq!(deletes, 2);
    }

    #[test]
    fn test_blank_text_is_removed_when_editing_ends() {
        let (mut manager, transport) = manager();
        manager.set_tool(ToolKind::Text);
        manager.pointer_down(Point::new(100.0, 100.0), false);
        let id = manager.document().editing_text().unwrap().to_string();

        manager.set_tool(ToolKind::Select);
        assert!(manager.document().get(&id).is_none());
        assert_eq!(
            transport.sent_messages().last(),
            Some(&ClientMessage::ElementDeleted(id))
        );
    }

    #[test]
    fn test_written_text_survives() {
        let (mut manager, _transport) = manager();
        manager.set_tool(ToolKind::Text);
        manager.pointer_down(Point::new(100.0, 100.0), false);
        let id = manager.document().editing_text().unwrap().to_string();
        let depth = manager.document().history().past().len();

        assert!(manager.update_text(&id, "hello"));
        assert_eq!(manager.document().history().past().len(), depth);
        assert!(manager.end_text_edit().is_none());
        assert_eq!(manager.document().get(&id).unwrap().text().unwrap().text, "hello");
    }

    #[test]
    fn test_undo_is_not_broadcast() {
        let (mut manager, transport) = manager();
        manager.add_element(rect(0.0, 0.0, "local-user")).unwrap();
        let sent = transport.state.borrow().sent.len();
        assert!(manager.undo());
        assert!(manager.redo());
        assert_eq!(transport.state.borrow().sent.len(), sent);
    }
}

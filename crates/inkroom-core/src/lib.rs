//! InkRoom Core Library
//!
//! Shared data model, hit testing, undo history and the room sync client for the
//! InkRoom collaborative whiteboard. The server crate reuses the model and the
//! wire protocol.

pub mod chat;
pub mod collaboration;
pub mod document;
pub mod element;
pub mod geometry;
pub mod presence;
pub mod protocol;
pub mod selection;
pub mod snap;
pub mod sync;
pub mod tools;

pub use chat::{CHAT_HISTORY_LIMIT, ChatKind, ChatLog, ChatMessage};
pub use collaboration::CollaborationManager;
pub use document::{DocumentStore, History, LASER_TIMEOUT};
pub use element::{
    BrushType, DrawingElement, ElementError, ElementId, ElementKind, EraserType, PenType,
    PencilType, TextAlign, TextStyle,
};
pub use geometry::{CanvasBounds, hit_test};
pub use presence::{Presence, USER_COLORS, User};
pub use protocol::{ClientMessage, CursorPosition, ServerMessage};
pub use selection::DragState;
pub use snap::{GRID_SIZE, SnapResult, snap_to_grid};
pub use sync::{
    ConnectionState, NativeTransport, ReconnectPolicy, SyncChannel, SyncConfig, SyncError,
    Transport, TransportEvent,
};
pub use tools::{ToolKind, ToolManager, ToolStyle};

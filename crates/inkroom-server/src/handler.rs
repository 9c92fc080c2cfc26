//! HTTP routes and the per-connection websocket loop.

use crate::error::ServerError;
use crate::rooms::{ConnectionId, JoinOutcome, RoomStore};
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::SplitSink,
};
use inkroom_core::{ClientMessage, ServerMessage};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Join parameters carried in the websocket URL query.
#[derive(Debug, Default, Deserialize)]
pub struct JoinParams {
    #[serde(rename = "roomId")]
    pub room_id: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

impl JoinParams {
    /// Room and user ids, if both are present and non-empty.
    fn into_ids(self) -> Option<(String, String)> {
        let room_id = self.room_id.filter(|s| !s.is_empty())?;
        let user_id = self.user_id.filter(|s| !s.is_empty())?;
        Some((room_id, user_id))
    }
}

/// Index page
pub async fn index() -> &'static str {
    "InkRoom Server - Connect via WebSocket at /ws?roomId=<room>&userId=<user>"
}

/// Health check
pub async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<JoinParams>,
    State(store): State<Arc<RoomStore>>,
) -> Response {
    match params.into_ids() {
        Some((room_id, user_id)) => {
            ws.on_upgrade(move |socket| handle_socket(socket, store, room_id, user_id))
        }
        None => {
            warn!("rejecting connection without roomId/userId");
            ws.on_upgrade(reject)
        }
    }
}

async fn reject(mut socket: WebSocket) {
    let _ = socket.send(Message::Close(None)).await;
}

type Sender = SplitSink<WebSocket, Message>;

async fn send_message(sender: &mut Sender, message: &ServerMessage) -> Result<(), ServerError> {
    let json = message.to_json()?;
    sender.send(Message::Text(json.into())).await?;
    Ok(())
}

/// Handle one member's connection for its whole lifetime.
async fn handle_socket(socket: WebSocket, store: Arc<RoomStore>, room_id: String, user_id: String) {
    let conn: ConnectionId = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    let JoinOutcome {
        elements,
        chat_history,
        others,
        mut rx,
        ..
    } = store.join(&room_id, &user_id, conn);

    let mut initial = vec![
        ServerMessage::ElementsBatch(elements),
        ServerMessage::ChatHistory(chat_history),
    ];
    initial.extend(others.into_iter().map(ServerMessage::UserJoined));

    let mut open = true;
    for message in &initial {
        if let Err(e) = send_message(&mut sender, message).await {
            warn!(room = %room_id, user = %user_id, "failed to send initial state: {e}");
            open = false;
            break;
        }
    }

    while open {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_text(&store, &room_id, &user_id, conn, text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ignore binary, ping, pong
                    Some(Err(e)) => {
                        warn!(room = %room_id, user = %user_id, "websocket error: {e}");
                        break;
                    }
                }
            }

            envelope = rx.recv() => {
                match envelope {
                    Ok(envelope) if envelope.is_for(conn) => {
                        if let Err(e) = send_message(&mut sender, &envelope.message).await {
                            debug!(room = %room_id, user = %user_id, "send failed: {e}");
                            break;
                        }
                    }
                    Ok(_) => {} // Our own message
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(room = %room_id, user = %user_id, skipped, "connection lagging, messages dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    store.leave(&room_id, &user_id, conn);
    info!(room = %room_id, user = %user_id, "connection closed");
}

/// Apply one inbound frame. Malformed frames are logged and dropped.
fn handle_client_text(store: &RoomStore, room_id: &str, user_id: &str, conn: ConnectionId, text: &str) {
    let message = match ClientMessage::from_json(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(room = %room_id, user = %user_id, "invalid message: {e}");
            return;
        }
    };
    if let Err(e) = message.validate() {
        warn!(room = %room_id, user = %user_id, "rejected message: {e}");
        return;
    }

    match message {
        ClientMessage::UserCursor(position) => store.cursor(room_id, conn, user_id, position),
        ClientMessage::ElementCreated(element) => store.create_element(room_id, conn, element),
        ClientMessage::ElementUpdated(element) => {
            store.update_element(room_id, conn, element);
        }
        ClientMessage::ElementDeleted(id) => store.delete_element(room_id, conn, &id),
        ClientMessage::ChatMessage(chat) => store.chat_message(room_id, chat),
    }
}

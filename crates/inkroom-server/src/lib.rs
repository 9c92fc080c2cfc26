//! InkRoom WebSocket Room Server
//!
//! Holds the authoritative element list and chat history of every live room and
//! relays edits between the members of a room.
//!
//! ## Protocol
//!
//! Clients connect to `/ws?roomId=<room>&userId=<user>` and exchange JSON text
//! frames of the form:
//! ```json
//! { "event": "element-created", "data": { "id": "...", "type": "pen", ... } }
//! { "event": "user-cursor", "data": { "userId": "...", "cursor": { "x": 100, "y": 200 } } }
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod rooms;

use axum::{Router, routing::get};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub use config::ServerConfig;
pub use error::ServerError;
pub use rooms::RoomStore;

/// Build the application router around a shared room store.
pub fn router(store: Arc<RoomStore>) -> Router {
    Router::new()
        .route("/", get(handler::index))
        .route("/ws", get(handler::ws_handler))
        .route("/health", get(handler::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(store)
}

/// Serve on an already bound listener until the process is stopped.
pub async fn serve(listener: TcpListener, store: Arc<RoomStore>) -> Result<(), ServerError> {
    axum::serve(listener, router(store)).await?;
    Ok(())
}

/// Bind the configured address and serve.
pub async fn run(config: &ServerConfig) -> Result<(), ServerError> {
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    info!("InkRoom server listening on {}", addr);
    info!("WebSocket endpoint: ws://localhost:{}/ws", config.port);

    serve(listener, Arc::new(RoomStore::new())).await
}

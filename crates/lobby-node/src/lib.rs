//! # Lobby Node
//!
//! Runs a [`lobby_realtime::Lobby`] behind a WebSocket endpoint.
//!
//! ## Modules
//!
//! - [`api`] - HTTP router and application state
//! - [`ws`] - WebSocket transport, presence and stats endpoints
//! - [`config`] - Node configuration (file, environment, defaults)
//! - [`observability`] - Structured logging
//!
//! ## Quick Start
//!
//! ```bash
//! cargo run --bin lobby-node -- --api-addr 127.0.0.1:8080
//! ```

pub mod api;
pub mod config;
pub mod observability;
pub mod ws;

use lobby_realtime::Lobby;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Serve the lobby on `listener` until `shutdown` is cancelled.
///
/// The heartbeat monitor runs for as long as the server does.
pub async fn serve(
    listener: TcpListener,
    lobby: Arc<Lobby>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let heartbeat = lobby.spawn_heartbeat(shutdown.clone());
    let app = api::create_router(api::AppState::new(lobby));

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await;

    shutdown.cancel();
    let _ = heartbeat.await;
    result
}

//! HTTP/WebSocket API for the room server.
//!
//! # Endpoints
//!
//! - `GET /health` - Store and hub health status
//! - `GET /ws/{room_id}` - Live room connection; the upstream gateway supplies
//!   the authenticated caller in the `x-user-id` header
//!
//! # Example
//!
//! ```rust,no_run
//! use ps_server::api::{AppState, create_router};
//! use poker_score::{hub::{HubConfig, RoomHub}, room::LifecycleConfig, MemoryLedgerStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hub = RoomHub::spawn(&HubConfig::default());
//! let state = AppState::new(
//!     Arc::new(MemoryLedgerStore::new()),
//!     hub,
//!     LifecycleConfig::default(),
//!     HubConfig::default().connection_buffer,
//! );
//!
//! let app = create_router(state);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod websocket;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use poker_score::{
    HubHandle, LedgerStore, RoomLedger, RoomManager, SettlementEngine, room::LifecycleConfig,
};
use serde_json::json;
use std::sync::Arc;

/// Application state shared across all HTTP handlers and WebSocket connections.
///
/// Cloned per request; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub hub: HubHandle,
    pub ledger: RoomLedger,
    pub settlement: SettlementEngine,
    pub rooms: Arc<RoomManager>,
    /// Outbound buffer for each attached socket
    pub connection_buffer: usize,
}

impl AppState {
    /// Wire the engines over one store and hub
    pub fn new(
        store: Arc<dyn LedgerStore>,
        hub: HubHandle,
        lifecycle: LifecycleConfig,
        connection_buffer: usize,
    ) -> Self {
        let ledger = RoomLedger::new(store.clone(), hub.clone());
        let settlement = SettlementEngine::new(store.clone(), hub.clone());
        let rooms = Arc::new(RoomManager::new(
            store.clone(),
            hub.clone(),
            settlement.clone(),
            lifecycle,
        ));

        Self {
            store,
            hub,
            ledger,
            settlement,
            rooms,
            connection_buffer,
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws/{room_id}", get(websocket::websocket_handler))
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the store answers and the hub mailbox is open,
/// `503 Service Unavailable` otherwise.
///
/// ```bash
/// curl http://localhost:6969/health
/// # {"status":"healthy","store":true,"hub":true,"timestamp":"2026-01-01T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_healthy = state.store.health_check().await.is_ok();
    // Room 0 never exists; the query only proves the actor answers
    let hub_healthy = state.hub.connection_count(0).await.is_ok();

    let overall_healthy = store_healthy && hub_healthy;

    let status_code = if overall_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if overall_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "store": store_healthy,
        "hub": hub_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}

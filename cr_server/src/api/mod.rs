//! HTTP/WebSocket API for the card room server.
//!
//! The API is built with:
//! - **Axum**: Async web framework for HTTP/WebSocket
//! - **Tower**: CORS middleware
//! - **Actor Model**: Session state owned by dedicated actor tasks
//!
//! # Endpoints Overview
//!
//! - `GET /health` - Server health and drain status
//! - `GET /api/v1/sessions` - List live sessions
//! - `GET /ws` - WebSocket carrying the session protocol; the gateway sets
//!   the `x-player-id` header
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use cardroom::{archive::MemoryArchive, session::{RegistryConfig, SessionRegistry}};
//! use cr_server::api::{create_router, AppState};
//! use std::sync::Arc;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!
//! let registry = SessionRegistry::new(RegistryConfig::default(), Arc::new(MemoryArchive::new()))?;
//! let (state, _closing) = AppState::new(Arc::new(registry), 256);
//! let app = create_router(state);
//!
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
use cardroom::session::SessionRegistry;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers and WebSocket connections.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    /// Messages queued per connection before it is dropped as too slow
    pub outbound_capacity: usize,
    /// Flips to `true` once sessions have drained; connections then close
    pub closing: watch::Receiver<bool>,
}

impl AppState {
    /// Builds the state and the sender that tells open connections to close.
    pub fn new(registry: Arc<SessionRegistry>, outbound_capacity: usize) -> (Self, watch::Sender<bool>) {
        let (closing_tx, closing) = watch::channel(false);
        let state = Self {
            registry,
            outbound_capacity,
            closing,
        };
        (state, closing_tx)
    }
}

/// Create the API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    let v1_routes = Router::new().route("/sessions", get(list_sessions));

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(websocket::websocket_handler))
        .nest("/api/v1", v1_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` while accepting new sessions and `503 Service
/// Unavailable` once the server is draining.
///
/// # Example
///
/// ```bash
/// curl http://localhost:6969/health
/// # {"status":"healthy","sessions":{"accepting":true,"active_count":3},...}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let accepting = state.registry.is_accepting();
    let active_count = state.registry.active_session_count().await;

    let status_code = if accepting {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if accepting { "healthy" } else { "draining" },
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": {
            "accepting": accepting,
            "active_count": active_count
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}

/// Summaries of every live session, oldest first.
async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.list_sessions().await)
}

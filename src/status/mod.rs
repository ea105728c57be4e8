//! Status server — Axum endpoints exposing the last completed cycle.
//!
//! Read-only. Handlers see `CycleState` only through `StatusHandle`, so
//! a slow cycle never stalls a status request. CORS is open to any origin.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::engine::scheduler::StatusHandle;
use routes::{AppState, StatusState};

/// Bind the status port and serve in a background task.
///
/// Binding happens before returning so a taken port fails startup.
pub async fn spawn_status_server(status: StatusHandle, db_type: String, port: u16) -> Result<()> {
    let app = build_router(Arc::new(StatusState::new(status, db_type)));
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind status port {port}"))?;
    info!(port, "Status server listening on http://localhost:{port}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Status server stopped");
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/history", get(routes::get_history))
        .route("/api/status", get(routes::get_status))
        .route("/api/deals", get(routes::get_deals))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

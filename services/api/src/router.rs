//! Axum Router Configuration
//!
//! The WebSocket bridge plus two small introspection routes.

use crate::{state::AppState, ws::ws_handler};

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Serialize, Debug)]
pub struct SessionList {
    pub sessions: Vec<String>,
}

/// Ids of the live sessions currently held by the registry.
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionList> {
    Json(SessionList {
        sessions: state.registry.ids(),
    })
}

pub async fn health() -> &'static str {
    "ok"
}

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/sessions", get(list_sessions))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

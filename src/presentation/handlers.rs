// HTTP request handlers
use crate::presentation::app_state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Connectivity to the upstream feed, as last observed by the pump.
pub async fn connection_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "connected": state.connected.load(Ordering::Relaxed) }))
}

/// Latest canonical payload; 204 until the first ingestion.
pub async fn latest_snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.monitor.latest().await {
        Some(payload) => Json(payload).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Six-sequence rolling history view for charting.
pub async fn history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.history().await)
}

/// On-demand pull, funneled through the same ingestion path as push
/// deliveries. Transport failure leaves published state untouched.
pub async fn refresh(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.monitor.refresh().await {
        Ok(Some(payload)) => Json(payload).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            eprintln!("Error refreshing snapshot: {}", e);
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

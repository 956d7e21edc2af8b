//! /status and /daemon handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::ApiState;

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub cameras: usize,
    pub pending_sessions: usize,
    pub active_sessions: usize,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let mut pending = 0;
    let mut active = 0;
    for entry in state.managers.iter() {
        let (p, a) = entry.value().session_counts();
        pending += p;
        active += a;
    }
    Json(StatusResponse {
        uptime_secs: state.started_at.elapsed().as_secs(),
        cameras: state.managers.len(),
        pending_sessions: pending,
        active_sessions: active,
    })
}

#[derive(Serialize)]
pub struct ShutdownResponse {
    pub shutting_down: bool,
}

pub async fn handle_shutdown(State(state): State<ApiState>) -> Json<ShutdownResponse> {
    tracing::info!("shutdown requested via API");
    let _ = state.shutdown.send(());
    Json(ShutdownResponse {
        shutting_down: true,
    })
}

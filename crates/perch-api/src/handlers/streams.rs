//! /cameras/:id/streams handlers — the four session operations.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use perch_core::media::{PrepareRequest, PrepareResponse, VideoParams};

use super::{stream_error, ApiState};

pub async fn handle_prepare(
    State(state): State<ApiState>,
    Path((camera_id, session_id)): Path<(String, String)>,
    Json(request): Json<PrepareRequest>,
) -> Result<Json<PrepareResponse>, (StatusCode, String)> {
    let manager = state.manager(&camera_id)?;
    let response = manager
        .prepare(&session_id, &request)
        .map_err(stream_error)?;
    Ok(Json(response))
}

#[derive(Serialize)]
pub struct StartResponse {
    pub session_id: String,
    pub streaming: bool,
}

pub async fn handle_start(
    State(state): State<ApiState>,
    Path((camera_id, session_id)): Path<(String, String)>,
    Json(video): Json<VideoParams>,
) -> Result<Json<StartResponse>, (StatusCode, String)> {
    let manager = state.manager(&camera_id)?;
    manager
        .start(&session_id, video)
        .await
        .map_err(stream_error)?;
    Ok(Json(StartResponse {
        session_id,
        streaming: true,
    }))
}

pub async fn handle_reconfigure(
    State(state): State<ApiState>,
    Path((camera_id, session_id)): Path<(String, String)>,
    Json(video): Json<VideoParams>,
) -> Result<StatusCode, (StatusCode, String)> {
    let manager = state.manager(&camera_id)?;
    manager
        .reconfigure(&session_id, &video)
        .map_err(stream_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct StopResponse {
    pub session_id: String,
    pub stopped: bool,
}

pub async fn handle_stop(
    State(state): State<ApiState>,
    Path((camera_id, session_id)): Path<(String, String)>,
) -> Result<Json<StopResponse>, (StatusCode, String)> {
    let manager = state.manager(&camera_id)?;
    manager.stop(&session_id).await.map_err(stream_error)?;
    Ok(Json(StopResponse {
        session_id,
        stopped: true,
    }))
}

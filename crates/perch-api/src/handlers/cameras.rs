//! /cameras handlers — listing, the streaming toggle, snapshots.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use perch_core::camera::{AUDIO_CODEC, AUDIO_SAMPLE_RATE_KHZ, SUPPORTED_RESOLUTIONS};

use super::ApiState;

// ── /cameras (GET) ────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct CameraSummary {
    pub uuid: String,
    pub name: String,
    pub model: String,
    pub structure: String,
    pub streaming_enabled: bool,
    pub motion_detection: bool,
    pub doorbell: bool,
    pub microphone: bool,
    /// Audio advertisement, e.g. `aac_eld@16khz`, for cameras with a
    /// microphone.
    pub audio: Option<String>,
    /// `(width, height, fps)` formats a start request may ask for.
    pub resolutions: &'static [(u32, u32, u32)],
    pub pending_sessions: usize,
    pub active_sessions: usize,
}

pub async fn handle_cameras(State(state): State<ApiState>) -> Json<Vec<CameraSummary>> {
    let mut cameras: Vec<CameraSummary> = state
        .managers
        .iter()
        .map(|entry| {
            let manager = entry.value();
            let info = manager.camera();
            let (pending, active) = manager.session_counts();
            CameraSummary {
                uuid: info.uuid.clone(),
                name: info.name.clone(),
                model: info.model_name().to_string(),
                structure: info.structure_name.clone(),
                streaming_enabled: info.streaming_enabled,
                motion_detection: info.has_motion_detection(),
                doorbell: info.has_chime(),
                microphone: info.has_microphone(),
                audio: info
                    .has_microphone()
                    .then(|| format!("{AUDIO_CODEC}@{AUDIO_SAMPLE_RATE_KHZ}khz")),
                resolutions: SUPPORTED_RESOLUTIONS,
                pending_sessions: pending,
                active_sessions: active,
            }
        })
        .collect();
    cameras.sort_by(|a, b| a.name.cmp(&b.name));
    Json(cameras)
}

// ── /cameras/:id/streaming (POST) ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct StreamingToggle {
    pub enabled: bool,
}

#[derive(Serialize)]
pub struct StreamingToggleResponse {
    pub uuid: String,
    pub streaming_enabled: bool,
}

pub async fn handle_streaming_set(
    State(state): State<ApiState>,
    Path(camera_id): Path<String>,
    Json(toggle): Json<StreamingToggle>,
) -> Result<Json<StreamingToggleResponse>, (StatusCode, String)> {
    let manager = state.manager(&camera_id)?;
    let camera = manager.camera();

    state
        .vendor
        .set_streaming(&state.token.get(), &camera, toggle.enabled)
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;
    manager.set_streaming_enabled(toggle.enabled);

    tracing::info!(camera = %camera.name, enabled = toggle.enabled, "streaming toggled");
    Ok(Json(StreamingToggleResponse {
        uuid: camera_id,
        streaming_enabled: toggle.enabled,
    }))
}

// ── /cameras/:id/snapshot (GET) ───────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SnapshotQuery {
    #[serde(default = "default_snapshot_width")]
    pub width: u32,
}

fn default_snapshot_width() -> u32 {
    1280
}

pub async fn handle_snapshot(
    State(state): State<ApiState>,
    Path(camera_id): Path<String>,
    Query(query): Query<SnapshotQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let manager = state.manager(&camera_id)?;
    let camera = manager.camera();
    let image = state
        .snapshots
        .fetch(&camera, query.width)
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], image))
}

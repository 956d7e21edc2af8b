//! Shared handler state and error mapping.

mod cameras;
mod status;
mod streams;

pub use cameras::{handle_cameras, handle_snapshot, handle_streaming_set};
pub use status::{handle_shutdown, handle_status};
pub use streams::{handle_prepare, handle_reconfigure, handle_start, handle_stop};

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use dashmap::DashMap;

use perch_stream::{SnapshotService, StreamError, StreamManager, TokenStore, VendorClient};

#[derive(Clone)]
pub struct ApiState {
    /// camera uuid → its streaming session manager.
    pub managers: Arc<DashMap<String, Arc<StreamManager>>>,
    pub snapshots: Arc<SnapshotService>,
    pub vendor: Arc<VendorClient>,
    pub token: Arc<TokenStore>,
    pub shutdown: tokio::sync::broadcast::Sender<()>,
    pub started_at: Instant,
}

impl ApiState {
    pub(crate) fn manager(
        &self,
        camera_id: &str,
    ) -> Result<Arc<StreamManager>, (StatusCode, String)> {
        self.managers
            .get(camera_id)
            .map(|entry| entry.value().clone())
            .ok_or((StatusCode::NOT_FOUND, format!("no camera {camera_id}")))
    }
}

pub(crate) fn stream_error(e: StreamError) -> (StatusCode, String) {
    let code = match &e {
        StreamError::Conflict(_) => StatusCode::CONFLICT,
        StreamError::UnknownSession(_) => StatusCode::NOT_FOUND,
        StreamError::Negotiation(_) => StatusCode::BAD_REQUEST,
        StreamError::Subprocess(_) | StreamError::Upstream(_) => StatusCode::BAD_GATEWAY,
        StreamError::Disabled(_) => StatusCode::FORBIDDEN,
    };
    (code, e.to_string())
}

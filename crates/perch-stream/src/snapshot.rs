//! Snapshot service — live still images with an offline fallback.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;

use perch_core::CameraInfo;

use crate::vendor::{TokenStore, VendorClient, VendorError};

pub struct SnapshotService {
    client: Arc<VendorClient>,
    token: Arc<TokenStore>,
    offline_image: PathBuf,
}

impl SnapshotService {
    pub fn new(client: Arc<VendorClient>, token: Arc<TokenStore>, offline_image: PathBuf) -> Self {
        Self {
            client,
            token,
            offline_image,
        }
    }

    /// Fetch a live snapshot; a 404 means the camera is offline, in
    /// which case the operator-configured placeholder is served
    /// instead. Other vendor errors propagate.
    pub async fn fetch(&self, camera: &CameraInfo, width: u32) -> Result<Bytes, VendorError> {
        match self.client.snapshot(&self.token.get(), camera, width).await {
            Ok(image) => Ok(image),
            Err(e) if e.is_not_found() => {
                tracing::debug!(camera = %camera.name, "camera offline, serving placeholder");
                let placeholder = tokio::fs::read(&self.offline_image)
                    .await
                    .map_err(VendorError::OfflineImage)?;
                Ok(Bytes::from(placeholder))
            }
            Err(e) => {
                tracing::error!(camera = %camera.name, error = %e, "snapshot fetch failed");
                Err(e)
            }
        }
    }
}

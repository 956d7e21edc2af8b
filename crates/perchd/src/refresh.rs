//! Vendor refresh loops — access tokens and the camera directory.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;

use perch_core::config::{PerchConfig, VendorConfig};
use perch_core::CameraInfo;
use perch_stream::{
    SessionEvent, StreamManager, StreamSource, TokenStore, TranscoderSettings, VendorClient,
};

pub type ManagerMap = Arc<DashMap<String, Arc<StreamManager>>>;

/// Everything needed to build a manager for a newly discovered camera.
#[derive(Clone)]
pub struct ManagerFactory {
    pub settings: TranscoderSettings,
    pub source: Arc<dyn StreamSource>,
    pub token: Arc<TokenStore>,
    pub events: mpsc::UnboundedSender<SessionEvent>,
}

impl ManagerFactory {
    pub fn build(&self, camera: CameraInfo) -> Arc<StreamManager> {
        Arc::new(StreamManager::new(
            camera,
            self.settings.clone(),
            self.source.clone(),
            self.token.clone(),
            self.events.clone(),
        ))
    }
}

/// Keep cameras from other structures out when a filter is configured.
fn structure_allowed(config: &PerchConfig, camera: &CameraInfo) -> bool {
    config.vendor.structures.is_empty()
        || config.vendor.structures.contains(&camera.structure_name)
}

/// Reconcile the manager map with one directory listing.
pub fn apply_directory(
    config: &PerchConfig,
    managers: &ManagerMap,
    factory: &ManagerFactory,
    cameras: Vec<CameraInfo>,
) {
    let mut seen = std::collections::HashSet::new();
    for camera in cameras {
        if !structure_allowed(config, &camera) {
            continue;
        }
        seen.insert(camera.uuid.clone());
        match managers.get(&camera.uuid) {
            Some(manager) => manager.update_camera(camera),
            None => {
                tracing::info!(
                    camera = %camera.name,
                    model = camera.model_name(),
                    streaming_enabled = camera.streaming_enabled,
                    "camera registered"
                );
                managers.insert(camera.uuid.clone(), factory.build(camera));
            }
        }
    }
    managers.retain(|uuid, manager| {
        let keep = seen.contains(uuid);
        if !keep {
            tracing::warn!(camera = %manager.camera().name, "camera removed from directory");
        }
        keep
    });
}

/// Re-authenticate on a timer; the vendor expires tokens after about an
/// hour. Sessions in flight keep the token they started with.
pub async fn token_refresh_loop(
    vendor: Arc<VendorClient>,
    vendor_config: VendorConfig,
    token: Arc<TokenStore>,
    interval_secs: u64,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(60)));
    interval.tick().await; // immediate first tick — we already have a token
    loop {
        interval.tick().await;
        match vendor.issue_token(&vendor_config).await {
            Ok(fresh) => {
                token.set(fresh);
                tracing::debug!("access token refreshed");
            }
            Err(e) => {
                tracing::error!(error = %e, "token refresh failed, keeping previous token");
            }
        }
    }
}

/// Poll the camera directory, updating capability and streaming flags
/// and registering newly appeared cameras.
pub async fn directory_refresh_loop(
    config: PerchConfig,
    vendor: Arc<VendorClient>,
    token: Arc<TokenStore>,
    managers: ManagerMap,
    factory: ManagerFactory,
) {
    let mut interval =
        tokio::time::interval(Duration::from_secs(config.directory.refresh_secs.max(5)));
    interval.tick().await; // the initial listing happened at startup
    loop {
        interval.tick().await;
        match vendor.list_cameras(&token.get()).await {
            Ok(cameras) => apply_directory(&config, &managers, &factory, cameras),
            Err(e) => {
                tracing::error!(error = %e, "camera directory refresh failed");
            }
        }
    }
}

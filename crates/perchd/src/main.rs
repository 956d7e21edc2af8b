//! perchd — camera streaming bridge daemon.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};

use perch_core::config::PerchConfig;
use perch_stream::{
    SessionEvent, SnapshotService, StreamSource, TcpStreamSource, TokenStore, TranscoderSettings,
    VendorClient,
};

mod refresh;
mod transcoder;

use refresh::{ManagerFactory, ManagerMap};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = PerchConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = PerchConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        PerchConfig::default()
    });

    // Transcoder binary, resolved once and injected everywhere.
    let binary = transcoder::resolve(&config.streaming);
    tracing::info!(transcoder = %binary.display(), codec = %config.streaming.codec, "transcoder resolved");
    let settings = TranscoderSettings {
        binary,
        codec: config.streaming.codec.clone(),
        verbose: config.streaming.verbose_transcoder,
    };

    // Vendor auth
    let vendor = Arc::new(VendorClient::new(config.vendor.field_test));
    let initial_token = vendor
        .issue_token(&config.vendor)
        .await
        .context("vendor authentication failed")?;
    let token = Arc::new(TokenStore::new(initial_token));
    tracing::info!(api = vendor.api_base(), "vendor authentication succeeded");

    // Shared state
    let source: Arc<dyn StreamSource> = Arc::new(TcpStreamSource::new());
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let managers: ManagerMap = Arc::new(DashMap::new());
    let factory = ManagerFactory {
        settings,
        source,
        token: token.clone(),
        events: events_tx,
    };

    // Initial camera directory
    let cameras = vendor
        .list_cameras(&token.get())
        .await
        .context("failed to fetch camera directory")?;
    refresh::apply_directory(&config, &managers, &factory, cameras);
    tracing::info!(cameras = managers.len(), "camera directory loaded");

    let snapshots = Arc::new(SnapshotService::new(
        vendor.clone(),
        token.clone(),
        config.snapshot.offline_image.clone(),
    ));

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let token_refresh_task = tokio::spawn(refresh::token_refresh_loop(
        vendor.clone(),
        config.vendor.clone(),
        token.clone(),
        config.directory.token_refresh_secs,
    ));

    let directory_task = tokio::spawn(refresh::directory_refresh_loop(
        config.clone(),
        vendor.clone(),
        token.clone(),
        managers.clone(),
        factory,
    ));

    // Forced-stop notifications: the session is already torn down; the
    // controller learns about it here and may renegotiate.
    let events_task = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                SessionEvent::ForcedStop {
                    camera_uuid,
                    session_id,
                } => {
                    tracing::warn!(
                        %camera_uuid,
                        %session_id,
                        "session force-stopped, viewer must renegotiate"
                    );
                }
            }
        }
    });

    // Control API
    let api_port = config.api.port;
    let api_task = {
        let state = perch_api::ApiState {
            managers: managers.clone(),
            snapshots,
            vendor: vendor.clone(),
            token: token.clone(),
            shutdown: shutdown_tx.clone(),
            started_at: Instant::now(),
        };
        tokio::spawn(async move {
            if let Err(e) = perch_api::serve(state, api_port).await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()  => tracing::info!("shutting down"),
        r = token_refresh_task  => tracing::error!("token refresh task exited: {:?}", r),
        r = directory_task      => tracing::error!("directory task exited: {:?}", r),
        r = events_task         => tracing::error!("events task exited: {:?}", r),
        r = api_task            => tracing::error!("API task exited: {:?}", r),
    }

    // Stop every session so no transcoder or source outlives the daemon.
    for entry in managers.iter() {
        let manager = entry.value().clone();
        let (pending, active) = manager.session_counts();
        if pending + active > 0 {
            tracing::info!(camera = %manager.camera().name, "tearing down sessions");
            manager.stop_all().await;
        }
    }

    Ok(())
}

//! Session request router — the public prepare/start/reconfigure/stop
//! surface for one camera.
//!
//! `start` is the single long-lived wait in the design: it resolves
//! exactly once, either when the transcoder produces its first output
//! or when the subprocess dies first. Everything else is synchronous
//! relative to the caller.

use std::sync::{Arc, RwLock};

use tokio::sync::{mpsc, watch};

use perch_core::media::{PrepareRequest, PrepareResponse, VideoParams};
use perch_core::CameraInfo;

use crate::error::StreamError;
use crate::negotiator;
use crate::registry::{RemovedSession, SessionRegistry};
use crate::source::StreamSource;
use crate::supervisor::{self, ExitOutcome, Transcoder, TranscoderSettings};
use crate::vendor::TokenStore;

/// Notifications toward the controller-facing layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The transcoder died after streaming had begun; the session has
    /// been torn down and the viewer must re-negotiate.
    ForcedStop {
        camera_uuid: String,
        session_id: String,
    },
}

/// Streaming session manager for one camera.
pub struct StreamManager {
    camera: RwLock<CameraInfo>,
    settings: TranscoderSettings,
    source: Arc<dyn StreamSource>,
    token: Arc<TokenStore>,
    registry: SessionRegistry,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl StreamManager {
    pub fn new(
        camera: CameraInfo,
        settings: TranscoderSettings,
        source: Arc<dyn StreamSource>,
        token: Arc<TokenStore>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            camera: RwLock::new(camera),
            settings,
            source,
            token,
            registry: SessionRegistry::new(),
            events,
        }
    }

    /// Current camera info snapshot.
    pub fn camera(&self) -> CameraInfo {
        match self.camera.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace camera info after a directory refresh.
    pub fn update_camera(&self, info: CameraInfo) {
        match self.camera.write() {
            Ok(mut guard) => *guard = info,
            Err(poisoned) => *poisoned.into_inner() = info,
        }
    }

    pub fn set_streaming_enabled(&self, enabled: bool) {
        match self.camera.write() {
            Ok(mut guard) => guard.streaming_enabled = enabled,
            Err(poisoned) => poisoned.into_inner().streaming_enabled = enabled,
        }
    }

    /// (pending, active) session counts.
    pub fn session_counts(&self) -> (usize, usize) {
        self.registry.counts()
    }

    /// Tear down every session this camera has, e.g. at daemon exit.
    pub async fn stop_all(&self) {
        for session_id in self.registry.session_ids() {
            let _ = self.stop(&session_id).await;
        }
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    // ── prepare ──────────────────────────────────────────────────────────────

    /// Negotiate transport parameters and store the session as
    /// Prepared. Never spawns anything.
    pub fn prepare(
        &self,
        session_id: &str,
        request: &PrepareRequest,
    ) -> Result<PrepareResponse, StreamError> {
        let camera = self.camera();
        if !camera.streaming_enabled {
            return Err(StreamError::Disabled(camera.uuid));
        }
        let response = negotiator::prepare_session(&self.registry, session_id, request)?;
        tracing::debug!(session_id, camera = %camera.name, "session prepared");
        Ok(response)
    }

    // ── start ────────────────────────────────────────────────────────────────

    /// Spawn the transcoder, engage the stream source, and resolve once
    /// the transcoder produces its first output (or fails).
    pub async fn start(
        &self,
        session_id: &str,
        video: VideoParams,
    ) -> Result<(), StreamError> {
        let camera = self.camera();
        if !camera.streaming_enabled {
            return Err(StreamError::Disabled(camera.uuid));
        }
        if !perch_core::camera::SUPPORTED_RESOLUTIONS
            .contains(&(video.width, video.height, video.fps))
        {
            // The session stays Prepared; the controller may retry with
            // an advertised format or stop the session.
            return Err(StreamError::Negotiation(format!(
                "unadvertised stream format {}x{}@{}",
                video.width, video.height, video.fps
            )));
        }
        let (prepared, epoch) = self.registry.begin_start(session_id)?;

        tracing::debug!(
            session_id,
            width = video.width,
            height = video.height,
            fps = video.fps,
            bitrate_kbps = video.max_bitrate,
            mtu = video.mtu,
            profile = video.profile.as_str(),
            level = video.level.as_str(),
            "starting video stream"
        );

        let transcoder =
            match supervisor::spawn(session_id, &prepared, &video, &self.settings) {
                Ok(transcoder) => transcoder,
                Err(e) => {
                    self.registry.remove_if_epoch(session_id, epoch);
                    return Err(e);
                }
            };
        let Transcoder {
            feed,
            mut ready,
            mut exit,
            kill,
        } = transcoder;

        if let Err(kill) = self.registry.arm_kill(session_id, epoch, kill) {
            // Stopped while the subprocess was spawning.
            let _ = kill.send(());
            return Err(StreamError::Subprocess(
                "session stopped during startup".to_string(),
            ));
        }

        let token = self.token.get();
        if let Err(e) = self
            .source
            .start(&camera, &token, session_id, feed.clone())
            .await
        {
            if let Some(removed) = self.registry.remove_if_epoch(session_id, epoch) {
                kill_removed(removed);
            }
            return Err(e);
        }
        // The source now holds the only feed sender; when the writer
        // task ends, its sends fail and delivery ceases.
        drop(feed);

        let became_ready = tokio::select! {
            first_output = &mut ready => first_output.is_ok(),
            _ = exit.changed() => false,
        };

        if !became_ready {
            if exit.borrow().is_none() {
                let _ = exit.changed().await;
            }
            let detail = exit
                .borrow()
                .clone()
                .map(|outcome| outcome.to_string())
                .unwrap_or_else(|| "no exit status".to_string());
            if let Some(removed) = self.registry.remove_if_epoch(session_id, epoch) {
                kill_removed(removed);
            }
            self.source.stop(session_id).await;
            return Err(StreamError::Subprocess(format!(
                "transcoder exited before producing output ({detail})"
            )));
        }

        if !self.registry.activate(session_id, epoch) {
            // Stopped between first output and activation; stop()
            // already performed teardown.
            return Err(StreamError::Subprocess(
                "session stopped during startup".to_string(),
            ));
        }

        tracing::info!(session_id, camera = %camera.name, "streaming session active");
        self.spawn_exit_monitor(session_id.to_string(), epoch, camera.uuid, exit);
        Ok(())
    }

    /// Watch a now-active session's transcoder. A spontaneous exit of
    /// any kind ends the session via the forced-stop path exactly once:
    /// a caller-requested stop removes the registry entry before it
    /// kills the process, so whoever wins the removal performs teardown.
    fn spawn_exit_monitor(
        &self,
        session_id: String,
        epoch: u64,
        camera_uuid: String,
        mut exit: watch::Receiver<Option<ExitOutcome>>,
    ) {
        let registry = self.registry.clone();
        let source = self.source.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let pending = exit.borrow().is_none();
            if pending && exit.changed().await.is_err() {
                return;
            }
            let Some(outcome) = exit.borrow().clone() else {
                return;
            };
            if registry.remove_if_epoch(&session_id, epoch).is_none() {
                // A stop already tore this incarnation down.
                return;
            }
            source.stop(&session_id).await;
            match &outcome {
                ExitOutcome::Expected(detail) => {
                    tracing::debug!(%session_id, %detail, "transcoder finished, session ended");
                }
                ExitOutcome::Abnormal(detail) => {
                    tracing::error!(
                        %session_id,
                        %detail,
                        "transcoder died mid-stream, forcing session teardown"
                    );
                }
            }
            let _ = events.send(SessionEvent::ForcedStop {
                camera_uuid,
                session_id,
            });
        });
    }

    // ── reconfigure ──────────────────────────────────────────────────────────

    /// Accepted but inert: the running transcoder is never retuned.
    pub fn reconfigure(
        &self,
        session_id: &str,
        video: &VideoParams,
    ) -> Result<(), StreamError> {
        tracing::debug!(
            session_id,
            width = video.width,
            height = video.height,
            fps = video.fps,
            "ignoring reconfigure request (unsupported)"
        );
        Ok(())
    }

    // ── stop ─────────────────────────────────────────────────────────────────

    /// Tear a session down in any phase. Unknown IDs are a no-op: the
    /// controller may stop a session this process already cleaned up
    /// after an abnormal exit.
    pub async fn stop(&self, session_id: &str) -> Result<(), StreamError> {
        match self.registry.remove(session_id) {
            None => {
                tracing::debug!(session_id, "stop for unknown session");
            }
            Some(RemovedSession::Prepared) => {
                tracing::debug!(session_id, "discarded prepared session");
            }
            Some(RemovedSession::Starting(kill)) => {
                if let Some(kill) = kill {
                    if kill.send(()).is_err() {
                        tracing::debug!(session_id, "transcoder already exited");
                    }
                }
                self.source.stop(session_id).await;
                tracing::debug!(session_id, "stopped session during startup");
            }
            Some(RemovedSession::Active(kill)) => {
                if kill.send(()).is_err() {
                    tracing::debug!(session_id, "transcoder already exited");
                }
                self.source.stop(session_id).await;
                tracing::info!(session_id, "stopped streaming session");
            }
        }
        Ok(())
    }
}

fn kill_removed(removed: RemovedSession) {
    match removed {
        RemovedSession::Starting(Some(kill)) | RemovedSession::Active(kill) => {
            let _ = kill.send(());
        }
        RemovedSession::Prepared | RemovedSession::Starting(None) => {}
    }
}

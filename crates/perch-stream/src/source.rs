//! Stream source bridge — start/stop control over the external
//! component that delivers a camera's raw elementary stream.
//!
//! The sink handed to a source is the supervisor's stdin feed. The
//! contract is deliberately small:
//!
//!   - delivery must cease when the sink closes (sends start failing);
//!   - `stop` must be idempotent, and stopping an unknown session is a
//!     no-op — teardown paths may race.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

use perch_core::CameraInfo;

use crate::error::StreamError;

/// Where a source delivers the elementary stream: the transcoder's
/// stdin feed.
pub type StreamSink = mpsc::Sender<Bytes>;

#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Begin delivering `camera`'s live elementary stream into `sink`,
    /// authenticated with `token`, on behalf of session `session_id`.
    async fn start(
        &self,
        camera: &CameraInfo,
        token: &str,
        session_id: &str,
        sink: StreamSink,
    ) -> Result<(), StreamError>;

    /// Stop delivery for `session_id`.
    async fn stop(&self, session_id: &str);
}

// ── TCP adapter ───────────────────────────────────────────────────────────────

/// Port the vendor's stream hosts listen on.
const STREAM_PORT: u16 = 1443;

/// Minimal production adapter: connects to the camera's stream host,
/// sends a start line carrying the camera UUID and access token, and
/// forwards received bytes into the sink until stopped. The vendor's
/// full wire protocol plugs in behind the same trait.
pub struct TcpStreamSource {
    sessions: Arc<DashMap<String, oneshot::Sender<()>>>,
}

impl TcpStreamSource {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }
}

impl Default for TcpStreamSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamSource for TcpStreamSource {
    async fn start(
        &self,
        camera: &CameraInfo,
        token: &str,
        session_id: &str,
        sink: StreamSink,
    ) -> Result<(), StreamError> {
        let addr = (camera.stream_host.as_str(), STREAM_PORT);
        let mut stream = TcpStream::connect(addr).await.map_err(|e| {
            StreamError::Upstream(format!("connect to {}: {e}", camera.stream_host))
        })?;
        stream
            .write_all(format!("START {} {}\n", camera.uuid, token).as_bytes())
            .await
            .map_err(|e| StreamError::Upstream(format!("start request failed: {e}")))?;

        let (stop_tx, mut stop_rx) = oneshot::channel();
        self.sessions.insert(session_id.to_string(), stop_tx);

        let sessions = self.sessions.clone();
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            let mut buf = [0u8; 8192];
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    read = stream.read(&mut buf) => match read {
                        Ok(0) => {
                            tracing::debug!(%session_id, "stream source closed the connection");
                            break;
                        }
                        Ok(n) => {
                            if sink.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                                // Sink closed — the transcoder is gone.
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(%session_id, error = %e, "stream source read failed");
                            break;
                        }
                    },
                }
            }
            sessions.remove(&session_id);
        });
        Ok(())
    }

    async fn stop(&self, session_id: &str) {
        if let Some((_, stop_tx)) = self.sessions.remove(session_id) {
            let _ = stop_tx.send(());
            tracing::debug!(session_id, "stream source stopped");
        }
    }
}
